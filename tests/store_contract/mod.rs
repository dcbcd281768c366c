//! Behaviour every `CatalogStore` adapter must share.
//!
//! Each check runs against a fresh, empty store supplied by the caller so the
//! in-memory and `PostgreSQL` suites assert identical semantics.

use chrono::TimeDelta;
use eyre::{Result, ensure, eyre};
use mcp_catalog::catalog::{
    domain::{
        CreationType, EntryId, EntryName, EntryType, EntryVersion, IconTheme,
        LatestVersionPointer, NewEntryParams, PackageTransport, Registry, RegistryEntry,
        RegistryId, RegistryName, RegistrySync, RegistryType, RegistryUpsert, ServerDetails, ServerIcon,
        ServerPackage, ServerRemote, SkillDetails, SkillStatus, SyncCompletion, SyncStatus,
        VersionRef,
    },
    ports::{CatalogStore, CatalogStoreError},
};
use mockable::{Clock, DefaultClock};

fn registry(name: &str, creation_type: CreationType) -> Result<Registry> {
    Ok(Registry::new(
        RegistryName::new(name)?,
        RegistryType::File,
        creation_type,
        &DefaultClock,
    ))
}

fn entry(
    reg: &Registry,
    name: &str,
    version: &str,
    creation_type: CreationType,
) -> Result<RegistryEntry> {
    Ok(RegistryEntry::new(
        NewEntryParams {
            reg_id: reg.id(),
            entry_type: EntryType::Mcp,
            name: EntryName::new(name)?,
            version: EntryVersion::new(version)?,
            title: None,
            description: None,
            creation_type,
        },
        &DefaultClock,
    ))
}

fn package(identifier: &str) -> ServerPackage {
    ServerPackage {
        registry_type: "npm".to_owned(),
        registry_base_url: None,
        identifier: identifier.to_owned(),
        version: None,
        runtime_hint: Some("npx".to_owned()),
        runtime_arguments: vec!["--yes".to_owned()],
        transport: PackageTransport {
            transport_type: "stdio".to_owned(),
            url: None,
        },
        environment_variables: Vec::new(),
    }
}

fn remote(url: &str) -> ServerRemote {
    ServerRemote {
        transport_type: "sse".to_owned(),
        url: url.to_owned(),
        headers: Vec::new(),
    }
}

fn icon(src: &str) -> ServerIcon {
    ServerIcon {
        src: src.to_owned(),
        mime_type: Some("image/png".to_owned()),
        theme: IconTheme::Dark,
        sizes: vec!["48x48".to_owned()],
    }
}

/// Seeds one CONFIG registry with one server entry and its version row.
async fn seed_server<S: CatalogStore>(store: &S) -> Result<(Registry, RegistryEntry)> {
    let reg = registry("seeded", CreationType::Config)?;
    let row = entry(&reg, "io.acme/weather", "1.0.0", CreationType::Config)?;
    let (written_reg, written_row) = (reg.clone(), row.clone());
    store
        .write(move |tx| {
            tx.insert_registry(&written_reg)?;
            tx.insert_registry_entry(&written_row)?;
            tx.insert_server_version(written_row.id(), &ServerDetails::default())
        })
        .await?;
    Ok((reg, row))
}

fn expect_conflict<T: std::fmt::Debug>(result: Result<T, CatalogStoreError>) -> Result<()> {
    match result {
        Err(err) if err.is_conflict() => Ok(()),
        other => Err(eyre!("expected a conflict, got {other:?}")),
    }
}

fn expect_not_found<T: std::fmt::Debug>(result: Result<T, CatalogStoreError>) -> Result<()> {
    match result {
        Err(err) if err.is_not_found() => Ok(()),
        other => Err(eyre!("expected not found, got {other:?}")),
    }
}

/// A second registry with the same name conflicts.
pub async fn registry_names_are_unique<S: CatalogStore>(store: &S) -> Result<()> {
    let first = registry("dup", CreationType::Config)?;
    let second = registry("dup", CreationType::Api)?;
    store
        .write(move |tx| tx.insert_registry(&first))
        .await?;
    expect_conflict(store.write(move |tx| tx.insert_registry(&second)).await)
}

/// A second entry with the same `(reg_id, name, version)` conflicts and the
/// original stays resolvable.
pub async fn entry_versions_are_unique<S: CatalogStore>(store: &S) -> Result<()> {
    let (reg, row) = seed_server(store).await?;
    let clash = entry(&reg, "io.acme/weather", "1.0.0", CreationType::Config)?;
    expect_conflict(store.write(move |tx| tx.insert_registry_entry(&clash)).await)?;

    let reg_id = reg.id();
    let (name, version) = (row.name().clone(), row.version().clone());
    let found = store
        .read(move |tx| tx.find_registry_entry(reg_id, &name, &version))
        .await?;
    ensure!(found.map(|stored| stored.id()) == Some(row.id()), "original entry should be found");
    Ok(())
}

/// Bulk upserts skip `API` registries and registry deletion spares them.
pub async fn api_registries_survive_bulk_operations<S: CatalogStore>(store: &S) -> Result<()> {
    let protected = registry("owned", CreationType::Api)?;
    let protected_id = protected.id();
    store
        .write(move |tx| tx.insert_registry(&protected))
        .await?;

    let now = DefaultClock.utc();
    let rows = ["owned", "config"]
        .into_iter()
        .map(|name| -> Result<RegistryUpsert> {
            Ok(RegistryUpsert {
                id: RegistryId::new(),
                name: RegistryName::new(name)?,
                reg_type: RegistryType::Remote,
                creation_type: CreationType::Config,
                syncable: true,
                timestamp: now,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let (written, api_names, deleted) = store
        .write(move |tx| -> Result<_, CatalogStoreError> {
            let written = tx.bulk_upsert_registries(&rows)?;
            let api_names = tx.get_api_registries_by_names(
                &rows.iter().map(|row| row.name.clone()).collect::<Vec<_>>(),
            )?;
            let deleted = tx.delete_registries_not_in_list(&[])?;
            Ok((written, api_names, deleted))
        })
        .await?;

    let written_names: Vec<&str> = written.iter().map(|row| row.name().as_str()).collect();
    ensure!(written_names == vec!["config"], "only the CONFIG row is written: {written_names:?}");
    ensure!(
        api_names.iter().map(RegistryName::as_str).eq(["owned"]),
        "API names are reported: {api_names:?}"
    );
    ensure!(deleted == 1, "only the CONFIG registry is deleted, got {deleted}");

    let survivor = store.read(move |tx| tx.get_registry(protected_id)).await?;
    ensure!(survivor.reg_type() == RegistryType::File, "API registry is untouched");
    Ok(())
}

/// A CONFIG upsert naming an existing `API` registry leaves that row as it was.
pub async fn config_upserts_leave_api_registries_untouched<S: CatalogStore>(
    store: &S,
) -> Result<()> {
    let owned = registry("curated", CreationType::Api)?.with_syncable(false);
    store.write(move |tx| tx.insert_registry(&owned)).await?;
    let name = RegistryName::new("curated")?;
    let lookup = name.clone();
    let before = store.read(move |tx| tx.get_registry_by_name(&lookup)).await?;

    let later = DefaultClock
        .utc()
        .checked_add_signed(TimeDelta::hours(1))
        .ok_or_else(|| eyre!("timestamp overflow"))?;
    let upsert = RegistryUpsert {
        id: RegistryId::new(),
        name: name.clone(),
        reg_type: RegistryType::Remote,
        creation_type: CreationType::Config,
        syncable: true,
        timestamp: later,
    };
    let written = store
        .write(move |tx| tx.bulk_upsert_registries(std::slice::from_ref(&upsert)))
        .await?;
    ensure!(written.is_empty(), "no row is reported for the API registry: {written:?}");

    let after = store.read(move |tx| tx.get_registry_by_name(&name)).await?;
    ensure!(after.id() == before.id(), "the API row keeps its id");
    ensure!(after.creation_type() == CreationType::Api, "provenance is unchanged");
    ensure!(after.reg_type() == RegistryType::File, "type is unchanged");
    ensure!(!after.is_syncable(), "sync eligibility is unchanged");
    ensure!(after.updated_at() == before.updated_at(), "updated_at is unchanged");
    Ok(())
}

/// Child rows need an owning version row.
pub async fn children_require_a_version_row<S: CatalogStore>(store: &S) -> Result<()> {
    let reg = registry("bare", CreationType::Config)?;
    let row = entry(&reg, "io.acme/bare", "1.0.0", CreationType::Config)?;
    let entry_id = row.id();
    store
        .write(move |tx| {
            tx.insert_registry(&reg)?;
            tx.insert_registry_entry(&row)
        })
        .await?;

    expect_not_found(
        store
            .write(move |tx| tx.insert_server_package(entry_id, &package("@acme/bare")))
            .await,
    )
}

/// Remotes are unique per transport and URL; icons upsert per theme.
pub async fn remotes_are_unique_and_icons_upsert<S: CatalogStore>(store: &S) -> Result<()> {
    let (_, row) = seed_server(store).await?;
    let entry_id = row.id();
    store
        .write(move |tx| {
            tx.insert_server_remote(entry_id, &remote("https://acme.test/sse"))?;
            tx.insert_server_icon(entry_id, &icon("https://acme.test/old.png"))?;
            tx.insert_server_icon(entry_id, &icon("https://acme.test/new.png"))
        })
        .await?;

    expect_conflict(
        store
            .write(move |tx| tx.insert_server_remote(entry_id, &remote("https://acme.test/sse")))
            .await,
    )?;
    let icons = store.read(move |tx| tx.list_server_icons(&[entry_id])).await?;
    ensure!(icons.len() == 1, "one icon per theme, got {}", icons.len());
    ensure!(
        icons.first().map(|(_, stored)| stored.src.as_str()) == Some("https://acme.test/new.png"),
        "the later icon wins"
    );
    Ok(())
}

/// Latest pointers reference existing entries and upsert idempotently.
pub async fn latest_pointers_are_referential_and_idempotent<S: CatalogStore>(
    store: &S,
) -> Result<()> {
    let (reg, row) = seed_server(store).await?;
    let dangling = LatestVersionPointer::new(
        reg.id(),
        row.name().clone(),
        row.version().clone(),
        EntryId::new(),
    );
    expect_not_found(
        store
            .write(move |tx| tx.upsert_latest_server_version(&dangling))
            .await,
    )?;

    let pointer = LatestVersionPointer::new(
        reg.id(),
        row.name().clone(),
        row.version().clone(),
        row.id(),
    );
    store
        .write(move |tx| {
            tx.upsert_latest_server_version(&pointer)?;
            tx.upsert_latest_server_version(&pointer)
        })
        .await?;

    let name = row.name().clone();
    let latest = store
        .read(move |tx| tx.get_server_version(&name, &VersionRef::Latest, None))
        .await?;
    ensure!(latest.entry.id() == row.id(), "latest resolves to the pointed entry");
    ensure!(latest.is_latest, "resolved version is flagged latest");
    Ok(())
}

/// A failed write leaves no trace.
pub async fn failed_writes_roll_back<S: CatalogStore>(store: &S) -> Result<()> {
    let doomed = registry("doomed", CreationType::Config)?;
    let result: Result<(), CatalogStoreError> = store
        .write(move |tx| {
            tx.insert_registry(&doomed)?;
            Err(CatalogStoreError::invalid("abort"))
        })
        .await;
    ensure!(result.is_err(), "the write should fail");

    let name = RegistryName::new("doomed")?;
    expect_not_found(store.read(move |tx| tx.get_registry_by_name(&name)).await)
}

/// A failed write that cascaded through several tables restores every one.
pub async fn failed_cascades_roll_back<S: CatalogStore>(store: &S) -> Result<()> {
    let (reg, row) = seed_server(store).await?;
    let entry_id = row.id();
    store
        .write(move |tx| tx.insert_server_package(entry_id, &package("@acme/weather")))
        .await?;

    let result: Result<(), CatalogStoreError> = store
        .write(|tx| {
            tx.delete_registries_not_in_list(&[])?;
            Err(CatalogStoreError::invalid("abort"))
        })
        .await;
    ensure!(result.is_err(), "the write should fail");

    let reg_id = reg.id();
    let (name, version) = (row.name().clone(), row.version().clone());
    let (registry_row, found, packages) = store
        .read(move |tx| -> Result<_, CatalogStoreError> {
            Ok((
                tx.get_registry(reg_id)?,
                tx.find_registry_entry(reg_id, &name, &version)?,
                tx.list_server_packages(&[entry_id])?,
            ))
        })
        .await?;
    ensure!(registry_row.id() == reg_id, "registry is restored");
    ensure!(found.is_some(), "entry is restored");
    ensure!(packages.len() == 1, "package is restored: {packages:?}");
    Ok(())
}

/// Writes attempted inside a read are refused and leave no trace.
pub async fn reads_cannot_write<S: CatalogStore>(store: &S) -> Result<()> {
    let sneaky = registry("sneaky", CreationType::Config)?;
    let result: Result<(), CatalogStoreError> =
        store.read(move |tx| tx.insert_registry(&sneaky)).await;
    ensure!(result.is_err(), "a read must not write: {result:?}");

    let name = RegistryName::new("sneaky")?;
    expect_not_found(store.read(move |tx| tx.get_registry_by_name(&name)).await)
}

/// Sync runs close exactly once and stale runs are swept.
pub async fn sync_runs_close_once_and_stale_runs_sweep<S: CatalogStore>(store: &S) -> Result<()> {
    let (reg, _) = seed_server(store).await?;
    let finished = RegistrySync::start(reg.id(), &DefaultClock);
    let abandoned = RegistrySync::start(reg.id(), &DefaultClock);
    let (finished_id, abandoned_id) = (finished.id(), abandoned.id());
    store
        .write(move |tx| {
            tx.insert_registry_sync(&finished)?;
            tx.insert_registry_sync(&abandoned)?;
            tx.finish_registry_sync(finished_id, &SyncCompletion::Completed, DefaultClock.utc())
        })
        .await?;

    expect_conflict(
        store
            .write(move |tx| {
                tx.finish_registry_sync(
                    finished_id,
                    &SyncCompletion::Failed("late".to_owned()),
                    DefaultClock.utc(),
                )
            })
            .await,
    )?;

    let cutoff = DefaultClock
        .utc()
        .checked_add_signed(TimeDelta::seconds(1))
        .ok_or_else(|| eyre!("cutoff overflow"))?;
    let swept = store
        .write(move |tx| tx.fail_stale_registry_syncs(cutoff, "sync abandoned", DefaultClock.utc()))
        .await?;
    ensure!(
        swept.iter().map(RegistrySync::id).eq([abandoned_id]),
        "only the open run is swept"
    );
    ensure!(
        swept.iter().all(|run| run.status() == SyncStatus::Failed
            && run.error_msg() == Some("sync abandoned")),
        "swept runs are failed with the sweep message"
    );
    Ok(())
}

/// Sync-side skill version writes are idempotent.
pub async fn skill_sync_writes_are_idempotent<S: CatalogStore>(store: &S) -> Result<()> {
    let reg = registry("skills", CreationType::Config)?;
    let row = RegistryEntry::new(
        NewEntryParams {
            reg_id: reg.id(),
            entry_type: EntryType::Skill,
            name: EntryName::new("acme/review")?,
            version: EntryVersion::new("0.1.0")?,
            title: None,
            description: None,
            creation_type: CreationType::Config,
        },
        &DefaultClock,
    );
    let entry_id = row.id();
    let details = SkillDetails {
        namespace: "acme".to_owned(),
        status: SkillStatus::Active,
        license: None,
        compatibility: None,
        allowed_tools: vec!["read".to_owned()],
        repository: None,
        icons: None,
        metadata: None,
    };
    let mut deprecated = details.clone();
    deprecated.status = SkillStatus::Deprecated;

    store
        .write(move |tx| {
            tx.insert_registry(&reg)?;
            tx.insert_registry_entry(&row)?;
            tx.insert_skill_version_for_sync(entry_id, &details)?;
            tx.upsert_skill_version_for_sync(entry_id, &details)?;
            tx.upsert_skill_version_for_sync(entry_id, &deprecated)
        })
        .await?;

    let name = EntryName::new("acme/review")?;
    let version = VersionRef::Exact(EntryVersion::new("0.1.0")?);
    let stored = store
        .read(move |tx| tx.get_skill_version(&name, &version, None))
        .await?;
    ensure!(stored.details.status == SkillStatus::Deprecated, "last upsert wins");
    ensure!(stored.details.allowed_tools == vec!["read"], "string lists round-trip");
    Ok(())
}

/// Packages round-trip with their typed sub-structures.
pub async fn packages_round_trip<S: CatalogStore>(store: &S) -> Result<()> {
    let (_, row) = seed_server(store).await?;
    let entry_id = row.id();
    let first = package("@acme/one");
    let second = package("@acme/two");
    let expected = vec![(entry_id, first.clone()), (entry_id, second.clone())];
    store
        .write(move |tx| {
            tx.insert_server_package(entry_id, &first)?;
            tx.insert_server_package(entry_id, &second)
        })
        .await?;

    let stored = store.read(move |tx| tx.list_server_packages(&[entry_id])).await?;
    ensure!(stored == expected, "packages keep insertion order and fields");
    Ok(())
}
