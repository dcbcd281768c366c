//! Diesel row models for catalog persistence and their domain mappings.

use super::schema::{
    latest_server_versions, latest_skill_versions, registries, registry_entries, registry_syncs,
    server_icons, server_packages, server_remotes, server_versions, skill_git_packages,
    skill_oci_packages, skill_versions,
};
use crate::catalog::{
    domain::{
        CreationType, EntryId, EntryName, EntryType, EntryVersion, IconTheme, LatestVersionPointer,
        MetadataBlob, PersistedEntryData, PersistedRegistryData, PersistedRegistrySyncData,
        Registry, RegistryEntry, RegistryId, RegistryName, RegistrySync, RegistryType,
        ServerDetails, ServerIcon, ServerPackage, ServerRemote, SkillDetails, SkillGitPackage,
        SkillOciPackage, SkillStatus, SyncId, SyncStatus,
    },
    ports::{CatalogStoreError, CatalogStoreResult},
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

/// Registry row.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = registries)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RegistryRow {
    /// Registry identifier.
    pub id: Uuid,
    /// Unique registry name.
    pub name: String,
    /// Source kind.
    pub reg_type: String,
    /// Provenance.
    pub creation_type: String,
    /// Sync eligibility.
    pub syncable: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Registry entry row.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = registry_entries)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct EntryRow {
    /// Entry identifier.
    pub id: Uuid,
    /// Owning registry.
    pub reg_id: Uuid,
    /// Entry kind.
    pub entry_type: String,
    /// Entry name.
    pub name: String,
    /// Version string.
    pub version: String,
    /// Display title.
    pub title: Option<String>,
    /// Description.
    pub description: Option<String>,
    /// Provenance.
    pub creation_type: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Server version row; also the changeset for sync overwrites.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = server_versions)]
#[diesel(primary_key(entry_id))]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ServerVersionRow {
    /// Owning entry.
    pub entry_id: Uuid,
    /// Project website.
    pub website_url: Option<String>,
    /// Source repository document.
    pub repository: Option<Value>,
    /// Upstream metadata blob.
    pub upstream_meta: Option<String>,
    /// Publisher metadata blob.
    pub server_meta: Option<String>,
}

/// Stored server package.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = server_packages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ServerPackageRow {
    /// Insertion order.
    pub seq: i64,
    /// Owning server version.
    pub entry_id: Uuid,
    /// Package ecosystem.
    pub registry_type: String,
    /// Package registry base URL.
    pub registry_base_url: Option<String>,
    /// Package identifier.
    pub identifier: String,
    /// Package version.
    pub version: Option<String>,
    /// Runtime launcher.
    pub runtime_hint: Option<String>,
    /// Runtime arguments.
    pub runtime_arguments: Vec<String>,
    /// Transport document.
    pub transport: Value,
    /// Environment variable documents.
    pub environment_variables: Value,
}

/// Insert model for server packages.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = server_packages)]
pub struct NewServerPackageRow {
    /// Owning server version.
    pub entry_id: Uuid,
    /// Package ecosystem.
    pub registry_type: String,
    /// Package registry base URL.
    pub registry_base_url: Option<String>,
    /// Package identifier.
    pub identifier: String,
    /// Package version.
    pub version: Option<String>,
    /// Runtime launcher.
    pub runtime_hint: Option<String>,
    /// Runtime arguments.
    pub runtime_arguments: Vec<String>,
    /// Transport document.
    pub transport: Value,
    /// Environment variable documents.
    pub environment_variables: Value,
}

/// Stored server remote.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = server_remotes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ServerRemoteRow {
    /// Insertion order.
    pub seq: i64,
    /// Owning server version.
    pub entry_id: Uuid,
    /// Transport kind.
    pub transport_type: String,
    /// Endpoint URL.
    pub url: String,
    /// Header documents.
    pub headers: Value,
}

/// Insert model for server remotes.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = server_remotes)]
pub struct NewServerRemoteRow {
    /// Owning server version.
    pub entry_id: Uuid,
    /// Transport kind.
    pub transport_type: String,
    /// Endpoint URL.
    pub url: String,
    /// Header documents.
    pub headers: Value,
}

/// Server icon row; also the changeset for per-theme replacement.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = server_icons)]
#[diesel(primary_key(entry_id, theme))]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ServerIconRow {
    /// Owning server version.
    pub entry_id: Uuid,
    /// Target theme.
    pub theme: String,
    /// Icon source.
    pub src: String,
    /// MIME type.
    pub mime_type: Option<String>,
    /// Declared sizes.
    pub sizes: Vec<String>,
}

/// Skill version row; also the changeset for sync overwrites.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = skill_versions)]
#[diesel(primary_key(entry_id))]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SkillVersionRow {
    /// Owning entry.
    pub entry_id: Uuid,
    /// Publisher namespace.
    pub namespace: String,
    /// Publication status.
    pub status: String,
    /// License expression.
    pub license: Option<String>,
    /// Compatibility statement.
    pub compatibility: Option<String>,
    /// Allowed tools.
    pub allowed_tools: Vec<String>,
    /// Repository blob.
    pub repository: Option<String>,
    /// Icons blob.
    pub icons: Option<String>,
    /// Metadata blob.
    pub metadata: Option<String>,
}

/// Stored skill git package.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = skill_git_packages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SkillGitPackageRow {
    /// Insertion order.
    pub seq: i64,
    /// Owning skill version.
    pub entry_id: Uuid,
    /// Clone URL.
    pub url: String,
    /// Branch or tag.
    pub git_ref: Option<String>,
    /// Pinned commit.
    pub commit_sha: Option<String>,
    /// Path within the repository.
    pub subfolder: Option<String>,
}

/// Insert model for skill git packages.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = skill_git_packages)]
pub struct NewSkillGitPackageRow {
    /// Owning skill version.
    pub entry_id: Uuid,
    /// Clone URL.
    pub url: String,
    /// Branch or tag.
    pub git_ref: Option<String>,
    /// Pinned commit.
    pub commit_sha: Option<String>,
    /// Path within the repository.
    pub subfolder: Option<String>,
}

/// Stored skill OCI package.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = skill_oci_packages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SkillOciPackageRow {
    /// Insertion order.
    pub seq: i64,
    /// Owning skill version.
    pub entry_id: Uuid,
    /// Image reference.
    pub identifier: String,
    /// Content digest.
    pub digest: Option<String>,
    /// Artifact media type.
    pub media_type: Option<String>,
}

/// Insert model for skill OCI packages.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = skill_oci_packages)]
pub struct NewSkillOciPackageRow {
    /// Owning skill version.
    pub entry_id: Uuid,
    /// Image reference.
    pub identifier: String,
    /// Content digest.
    pub digest: Option<String>,
    /// Artifact media type.
    pub media_type: Option<String>,
}

/// Latest server pointer row.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = latest_server_versions)]
pub struct LatestServerRow {
    /// Owning registry.
    pub reg_id: Uuid,
    /// Entry name.
    pub name: String,
    /// Selected version.
    pub version: String,
    /// Referenced server version.
    pub entry_id: Uuid,
}

/// Latest skill pointer row.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = latest_skill_versions)]
pub struct LatestSkillRow {
    /// Owning registry.
    pub reg_id: Uuid,
    /// Entry name.
    pub name: String,
    /// Selected version.
    pub version: String,
    /// Referenced skill version.
    pub entry_id: Uuid,
}

/// Sync run row.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = registry_syncs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RegistrySyncRow {
    /// Run identifier.
    pub id: Uuid,
    /// Synced registry.
    pub reg_id: Uuid,
    /// Run status.
    pub status: String,
    /// Sanitized failure summary.
    pub error_msg: Option<String>,
    /// Start timestamp.
    pub started_at: DateTime<Utc>,
    /// End timestamp.
    pub ended_at: Option<DateTime<Utc>>,
}

pub(super) fn to_registry_row(registry: &Registry) -> RegistryRow {
    RegistryRow {
        id: registry.id().into_inner(),
        name: registry.name().as_str().to_owned(),
        reg_type: registry.reg_type().as_str().to_owned(),
        creation_type: registry.creation_type().as_str().to_owned(),
        syncable: registry.is_syncable(),
        created_at: registry.created_at(),
        updated_at: registry.updated_at(),
    }
}

pub(super) fn row_to_registry(row: RegistryRow) -> CatalogStoreResult<Registry> {
    Ok(Registry::from_persisted(PersistedRegistryData {
        id: RegistryId::from_uuid(row.id),
        name: RegistryName::new(row.name).map_err(CatalogStoreError::invalid_persisted_data)?,
        reg_type: RegistryType::try_from(row.reg_type.as_str())
            .map_err(CatalogStoreError::invalid_persisted_data)?,
        creation_type: CreationType::try_from(row.creation_type.as_str())
            .map_err(CatalogStoreError::invalid_persisted_data)?,
        syncable: row.syncable,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }))
}

pub(super) fn to_entry_row(entry: &RegistryEntry) -> EntryRow {
    EntryRow {
        id: entry.id().into_inner(),
        reg_id: entry.reg_id().into_inner(),
        entry_type: entry.entry_type().as_str().to_owned(),
        name: entry.name().as_str().to_owned(),
        version: entry.version().as_str().to_owned(),
        title: entry.title().map(str::to_owned),
        description: entry.description().map(str::to_owned),
        creation_type: entry.creation_type().as_str().to_owned(),
        created_at: entry.created_at(),
        updated_at: entry.updated_at(),
    }
}

pub(super) fn row_to_entry(row: EntryRow) -> CatalogStoreResult<RegistryEntry> {
    Ok(RegistryEntry::from_persisted(PersistedEntryData {
        id: EntryId::from_uuid(row.id),
        reg_id: RegistryId::from_uuid(row.reg_id),
        entry_type: EntryType::try_from(row.entry_type.as_str())
            .map_err(CatalogStoreError::invalid_persisted_data)?,
        name: EntryName::new(row.name).map_err(CatalogStoreError::invalid_persisted_data)?,
        version: EntryVersion::new(row.version)
            .map_err(CatalogStoreError::invalid_persisted_data)?,
        title: row.title,
        description: row.description,
        creation_type: CreationType::try_from(row.creation_type.as_str())
            .map_err(CatalogStoreError::invalid_persisted_data)?,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }))
}

pub(super) fn to_server_version_row(
    entry_id: EntryId,
    details: &ServerDetails,
) -> CatalogStoreResult<ServerVersionRow> {
    let repository = details
        .repository
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(CatalogStoreError::persistence)?;
    Ok(ServerVersionRow {
        entry_id: entry_id.into_inner(),
        website_url: details.website_url.clone(),
        repository,
        upstream_meta: blob_text(details.upstream_meta.as_ref()),
        server_meta: blob_text(details.server_meta.as_ref()),
    })
}

pub(super) fn row_to_server_details(row: ServerVersionRow) -> CatalogStoreResult<ServerDetails> {
    let repository = row
        .repository
        .map(serde_json::from_value)
        .transpose()
        .map_err(CatalogStoreError::invalid_persisted_data)?;
    Ok(ServerDetails {
        website_url: row.website_url,
        repository,
        upstream_meta: row.upstream_meta.map(MetadataBlob::from_persisted),
        server_meta: row.server_meta.map(MetadataBlob::from_persisted),
    })
}

pub(super) fn to_server_package_row(
    entry_id: EntryId,
    package: &ServerPackage,
) -> CatalogStoreResult<NewServerPackageRow> {
    Ok(NewServerPackageRow {
        entry_id: entry_id.into_inner(),
        registry_type: package.registry_type.clone(),
        registry_base_url: package.registry_base_url.clone(),
        identifier: package.identifier.clone(),
        version: package.version.clone(),
        runtime_hint: package.runtime_hint.clone(),
        runtime_arguments: package.runtime_arguments.clone(),
        transport: serde_json::to_value(&package.transport)
            .map_err(CatalogStoreError::persistence)?,
        environment_variables: serde_json::to_value(&package.environment_variables)
            .map_err(CatalogStoreError::persistence)?,
    })
}

pub(super) fn row_to_server_package(
    row: ServerPackageRow,
) -> CatalogStoreResult<(EntryId, ServerPackage)> {
    let package = ServerPackage {
        registry_type: row.registry_type,
        registry_base_url: row.registry_base_url,
        identifier: row.identifier,
        version: row.version,
        runtime_hint: row.runtime_hint,
        runtime_arguments: row.runtime_arguments,
        transport: serde_json::from_value(row.transport)
            .map_err(CatalogStoreError::invalid_persisted_data)?,
        environment_variables: serde_json::from_value(row.environment_variables)
            .map_err(CatalogStoreError::invalid_persisted_data)?,
    };
    Ok((EntryId::from_uuid(row.entry_id), package))
}

pub(super) fn to_server_remote_row(
    entry_id: EntryId,
    remote: &ServerRemote,
) -> CatalogStoreResult<NewServerRemoteRow> {
    Ok(NewServerRemoteRow {
        entry_id: entry_id.into_inner(),
        transport_type: remote.transport_type.clone(),
        url: remote.url.clone(),
        headers: serde_json::to_value(&remote.headers).map_err(CatalogStoreError::persistence)?,
    })
}

pub(super) fn row_to_server_remote(
    row: ServerRemoteRow,
) -> CatalogStoreResult<(EntryId, ServerRemote)> {
    let remote = ServerRemote {
        transport_type: row.transport_type,
        url: row.url,
        headers: serde_json::from_value(row.headers)
            .map_err(CatalogStoreError::invalid_persisted_data)?,
    };
    Ok((EntryId::from_uuid(row.entry_id), remote))
}

pub(super) fn to_server_icon_row(entry_id: EntryId, icon: &ServerIcon) -> ServerIconRow {
    ServerIconRow {
        entry_id: entry_id.into_inner(),
        theme: icon.theme.as_str().to_owned(),
        src: icon.src.clone(),
        mime_type: icon.mime_type.clone(),
        sizes: icon.sizes.clone(),
    }
}

pub(super) fn row_to_server_icon(row: ServerIconRow) -> CatalogStoreResult<(EntryId, ServerIcon)> {
    let icon = ServerIcon {
        src: row.src,
        mime_type: row.mime_type,
        theme: IconTheme::try_from(row.theme.as_str())
            .map_err(CatalogStoreError::invalid_persisted_data)?,
        sizes: row.sizes,
    };
    Ok((EntryId::from_uuid(row.entry_id), icon))
}

pub(super) fn to_skill_version_row(entry_id: EntryId, details: &SkillDetails) -> SkillVersionRow {
    SkillVersionRow {
        entry_id: entry_id.into_inner(),
        namespace: details.namespace.clone(),
        status: details.status.as_str().to_owned(),
        license: details.license.clone(),
        compatibility: details.compatibility.clone(),
        allowed_tools: details.allowed_tools.clone(),
        repository: blob_text(details.repository.as_ref()),
        icons: blob_text(details.icons.as_ref()),
        metadata: blob_text(details.metadata.as_ref()),
    }
}

pub(super) fn row_to_skill_details(row: SkillVersionRow) -> CatalogStoreResult<SkillDetails> {
    Ok(SkillDetails {
        namespace: row.namespace,
        status: SkillStatus::try_from(row.status.as_str())
            .map_err(CatalogStoreError::invalid_persisted_data)?,
        license: row.license,
        compatibility: row.compatibility,
        allowed_tools: row.allowed_tools,
        repository: row.repository.map(MetadataBlob::from_persisted),
        icons: row.icons.map(MetadataBlob::from_persisted),
        metadata: row.metadata.map(MetadataBlob::from_persisted),
    })
}

pub(super) fn to_skill_git_row(entry_id: EntryId, package: &SkillGitPackage) -> NewSkillGitPackageRow {
    NewSkillGitPackageRow {
        entry_id: entry_id.into_inner(),
        url: package.url.clone(),
        git_ref: package.git_ref.clone(),
        commit_sha: package.commit.clone(),
        subfolder: package.subfolder.clone(),
    }
}

pub(super) fn row_to_skill_git(row: SkillGitPackageRow) -> (EntryId, SkillGitPackage) {
    let package = SkillGitPackage {
        url: row.url,
        git_ref: row.git_ref,
        commit: row.commit_sha,
        subfolder: row.subfolder,
    };
    (EntryId::from_uuid(row.entry_id), package)
}

pub(super) fn to_skill_oci_row(entry_id: EntryId, package: &SkillOciPackage) -> NewSkillOciPackageRow {
    NewSkillOciPackageRow {
        entry_id: entry_id.into_inner(),
        identifier: package.identifier.clone(),
        digest: package.digest.clone(),
        media_type: package.media_type.clone(),
    }
}

pub(super) fn row_to_skill_oci(row: SkillOciPackageRow) -> (EntryId, SkillOciPackage) {
    let package = SkillOciPackage {
        identifier: row.identifier,
        digest: row.digest,
        media_type: row.media_type,
    };
    (EntryId::from_uuid(row.entry_id), package)
}

pub(super) fn to_latest_server_row(pointer: &LatestVersionPointer) -> LatestServerRow {
    LatestServerRow {
        reg_id: pointer.reg_id.into_inner(),
        name: pointer.name.as_str().to_owned(),
        version: pointer.version.as_str().to_owned(),
        entry_id: pointer.entry_id.into_inner(),
    }
}

pub(super) fn to_latest_skill_row(pointer: &LatestVersionPointer) -> LatestSkillRow {
    LatestSkillRow {
        reg_id: pointer.reg_id.into_inner(),
        name: pointer.name.as_str().to_owned(),
        version: pointer.version.as_str().to_owned(),
        entry_id: pointer.entry_id.into_inner(),
    }
}

pub(super) fn to_sync_row(sync: &RegistrySync) -> RegistrySyncRow {
    RegistrySyncRow {
        id: sync.id().into_inner(),
        reg_id: sync.reg_id().into_inner(),
        status: sync.status().as_str().to_owned(),
        error_msg: sync.error_msg().map(str::to_owned),
        started_at: sync.started_at(),
        ended_at: sync.ended_at(),
    }
}

pub(super) fn row_to_sync(row: RegistrySyncRow) -> CatalogStoreResult<RegistrySync> {
    Ok(RegistrySync::from_persisted(PersistedRegistrySyncData {
        id: SyncId::from_uuid(row.id),
        reg_id: RegistryId::from_uuid(row.reg_id),
        status: SyncStatus::try_from(row.status.as_str())
            .map_err(CatalogStoreError::invalid_persisted_data)?,
        error_msg: row.error_msg,
        started_at: row.started_at,
        ended_at: row.ended_at,
    }))
}

fn blob_text(blob: Option<&MetadataBlob>) -> Option<String> {
    blob.map(|value| value.as_str().to_owned())
}
