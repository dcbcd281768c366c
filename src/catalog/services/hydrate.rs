//! Batched loading of child collections for pages of versions.

use crate::catalog::{
    domain::{EntryId, ServerVersion, ServerVersionDetail, SkillVersion, SkillVersionDetail},
    ports::{CatalogStoreResult, CatalogTransaction},
};
use std::collections::HashMap;

/// Attaches packages, remotes and icons to server versions with one query
/// per child table.
pub(super) fn hydrate_servers(
    tx: &mut dyn CatalogTransaction,
    versions: Vec<ServerVersion>,
) -> CatalogStoreResult<Vec<ServerVersionDetail>> {
    if versions.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<EntryId> = versions.iter().map(|version| version.entry.id()).collect();
    let mut packages = group_by_entry(tx.list_server_packages(&ids)?);
    let mut remotes = group_by_entry(tx.list_server_remotes(&ids)?);
    let mut icons = group_by_entry(tx.list_server_icons(&ids)?);

    Ok(versions
        .into_iter()
        .map(|version| {
            let id = version.entry.id();
            ServerVersionDetail {
                packages: packages.remove(&id).unwrap_or_default(),
                remotes: remotes.remove(&id).unwrap_or_default(),
                icons: icons.remove(&id).unwrap_or_default(),
                version,
            }
        })
        .collect())
}

/// Attaches git and OCI packages to skill versions with one query per
/// child table.
pub(super) fn hydrate_skills(
    tx: &mut dyn CatalogTransaction,
    versions: Vec<SkillVersion>,
) -> CatalogStoreResult<Vec<SkillVersionDetail>> {
    if versions.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<EntryId> = versions.iter().map(|version| version.entry.id()).collect();
    let mut git_packages = group_by_entry(tx.list_skill_git_packages(&ids)?);
    let mut oci_packages = group_by_entry(tx.list_skill_oci_packages(&ids)?);

    Ok(versions
        .into_iter()
        .map(|version| {
            let id = version.entry.id();
            SkillVersionDetail {
                git_packages: git_packages.remove(&id).unwrap_or_default(),
                oci_packages: oci_packages.remove(&id).unwrap_or_default(),
                version,
            }
        })
        .collect())
}

/// Groups child rows by owner, keeping their relative order.
fn group_by_entry<T>(rows: Vec<(EntryId, T)>) -> HashMap<EntryId, Vec<T>> {
    let mut grouped: HashMap<EntryId, Vec<T>> = HashMap::new();
    for (owner, row) in rows {
        grouped.entry(owner).or_default().push(row);
    }
    grouped
}
