//! Catalog store port: transactional access to registries, entries, version
//! payloads, latest pointers and sync records.

use crate::catalog::domain::{
    EntryId, EntryKey, EntryListFilter, EntryName, EntryVersion, LatestVersionPointer, PageRequest,
    Registry, RegistryEntry, RegistryId, RegistryKey, RegistryName, RegistrySync, RegistryUpsert,
    ServerDetails, ServerIcon, ServerPackage, ServerRemote, ServerVersion, SkillDetails,
    SkillGitPackage, SkillOciPackage, SkillVersion, SyncCompletion, SyncId, VersionRef,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Result type for catalog store operations.
pub type CatalogStoreResult<T> = Result<T, CatalogStoreError>;

/// Storage operations available inside one transaction.
///
/// Every method is atomic on its own. Callers compose several inside
/// [`CatalogStore::write`] when they need all-or-nothing behaviour; uniqueness
/// and referential rules are enforced by the store and surface as
/// [`CatalogStoreError::Conflict`] and [`CatalogStoreError::NotFound`].
pub trait CatalogTransaction {
    /// Inserts a registry.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogStoreError::Conflict`] when the name is taken.
    fn insert_registry(&mut self, registry: &Registry) -> CatalogStoreResult<()>;

    /// Inserts or updates registries by name.
    ///
    /// Absent names are inserted. Present `CONFIG` rows have their type,
    /// sync eligibility and `updated_at` rewritten. Present `API` rows are
    /// left untouched and omitted from the result.
    ///
    /// # Errors
    ///
    /// Returns storage failures.
    fn bulk_upsert_registries(&mut self, rows: &[RegistryUpsert])
    -> CatalogStoreResult<Vec<Registry>>;

    /// Deletes every `CONFIG` registry whose id is not in `keep`, cascading
    /// to everything it owns. `API` registries are never deleted.
    ///
    /// # Errors
    ///
    /// Returns storage failures.
    fn delete_registries_not_in_list(&mut self, keep: &[RegistryId]) -> CatalogStoreResult<u64>;

    /// Returns the subset of `names` whose stored registry is `API`-owned.
    ///
    /// # Errors
    ///
    /// Returns storage failures.
    fn get_api_registries_by_names(
        &mut self,
        names: &[RegistryName],
    ) -> CatalogStoreResult<Vec<RegistryName>>;

    /// Loads a registry by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogStoreError::NotFound`] when absent.
    fn get_registry(&mut self, id: RegistryId) -> CatalogStoreResult<Registry>;

    /// Loads a registry by name.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogStoreError::NotFound`] when absent.
    fn get_registry_by_name(&mut self, name: &RegistryName) -> CatalogStoreResult<Registry>;

    /// Lists one page of registries in `(created_at, name)` order.
    ///
    /// # Errors
    ///
    /// Returns storage failures.
    fn list_registries(
        &mut self,
        page: &PageRequest<RegistryKey>,
    ) -> CatalogStoreResult<Vec<Registry>>;

    /// Lists every syncable `CONFIG` registry in `(created_at, name)` order.
    ///
    /// # Errors
    ///
    /// Returns storage failures.
    fn list_syncable_registries(&mut self) -> CatalogStoreResult<Vec<Registry>>;

    /// Inserts an entry.
    ///
    /// A conflicting insert leaves the enclosing transaction usable.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogStoreError::Conflict`] on a duplicate
    /// `(reg_id, name, version)` and [`CatalogStoreError::NotFound`] when the
    /// registry does not exist.
    fn insert_registry_entry(&mut self, entry: &RegistryEntry) -> CatalogStoreResult<()>;

    /// Finds the entry for `(reg_id, name, version)`.
    ///
    /// # Errors
    ///
    /// Returns storage failures.
    fn find_registry_entry(
        &mut self,
        reg_id: RegistryId,
        name: &EntryName,
        version: &EntryVersion,
    ) -> CatalogStoreResult<Option<RegistryEntry>>;

    /// Inserts the server version row for an `MCP` entry.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogStoreError::Conflict`] when the row exists,
    /// [`CatalogStoreError::NotFound`] when the entry does not, and
    /// [`CatalogStoreError::Invalid`] when the entry is not `MCP`.
    fn insert_server_version(
        &mut self,
        entry_id: EntryId,
        details: &ServerDetails,
    ) -> CatalogStoreResult<()>;

    /// Writes the server version row for a sync-owned entry, inserting or
    /// replacing it.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogStoreError::Protected`] when the entry is
    /// `API`-owned, plus the failures of [`Self::insert_server_version`]
    /// other than `Conflict`.
    fn upsert_server_version_for_sync(
        &mut self,
        entry_id: EntryId,
        details: &ServerDetails,
    ) -> CatalogStoreResult<()>;

    /// Inserts the skill version row for a `SKILL` entry.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogStoreError::Conflict`] when the row exists,
    /// [`CatalogStoreError::NotFound`] when the entry does not, and
    /// [`CatalogStoreError::Invalid`] when the entry is not `SKILL`.
    fn insert_skill_version(
        &mut self,
        entry_id: EntryId,
        details: &SkillDetails,
    ) -> CatalogStoreResult<()>;

    /// Inserts the skill version row for a sync-owned entry.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogStoreError::Protected`] when the entry is
    /// `API`-owned, plus the failures of [`Self::insert_skill_version`].
    fn insert_skill_version_for_sync(
        &mut self,
        entry_id: EntryId,
        details: &SkillDetails,
    ) -> CatalogStoreResult<()>;

    /// Writes the skill version row for a sync-owned entry, inserting or
    /// replacing it.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogStoreError::Protected`] when the entry is
    /// `API`-owned, plus the failures of [`Self::insert_skill_version`]
    /// other than `Conflict`.
    fn upsert_skill_version_for_sync(
        &mut self,
        entry_id: EntryId,
        details: &SkillDetails,
    ) -> CatalogStoreResult<()>;

    /// Appends a package to a server version.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogStoreError::NotFound`] when the version row is absent.
    fn insert_server_package(
        &mut self,
        entry_id: EntryId,
        package: &ServerPackage,
    ) -> CatalogStoreResult<()>;

    /// Appends a remote to a server version.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogStoreError::Conflict`] on a duplicate
    /// `(entry_id, transport, url)` and [`CatalogStoreError::NotFound`] when
    /// the version row is absent.
    fn insert_server_remote(
        &mut self,
        entry_id: EntryId,
        remote: &ServerRemote,
    ) -> CatalogStoreResult<()>;

    /// Inserts or replaces the icon for `(entry_id, theme)`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogStoreError::NotFound`] when the version row is absent.
    fn insert_server_icon(&mut self, entry_id: EntryId, icon: &ServerIcon)
    -> CatalogStoreResult<()>;

    /// Appends a git package to a skill version.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogStoreError::NotFound`] when the version row is absent.
    fn insert_skill_git_package(
        &mut self,
        entry_id: EntryId,
        package: &SkillGitPackage,
    ) -> CatalogStoreResult<()>;

    /// Appends an OCI package to a skill version.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogStoreError::NotFound`] when the version row is absent.
    fn insert_skill_oci_package(
        &mut self,
        entry_id: EntryId,
        package: &SkillOciPackage,
    ) -> CatalogStoreResult<()>;

    /// Removes every package, remote and icon of a server version.
    ///
    /// # Errors
    ///
    /// Returns storage failures.
    fn delete_server_children(&mut self, entry_id: EntryId) -> CatalogStoreResult<()>;

    /// Removes every package of a skill version.
    ///
    /// # Errors
    ///
    /// Returns storage failures.
    fn delete_skill_packages(&mut self, entry_id: EntryId) -> CatalogStoreResult<()>;

    /// Deletes `CONFIG` server entries of `reg_id` whose id is not in `keep`.
    ///
    /// # Errors
    ///
    /// Returns storage failures.
    fn delete_orphaned_servers(
        &mut self,
        reg_id: RegistryId,
        keep: &[EntryId],
    ) -> CatalogStoreResult<u64>;

    /// Deletes `CONFIG` skill entries of `reg_id` whose id is not in `keep`.
    ///
    /// # Errors
    ///
    /// Returns storage failures.
    fn delete_orphaned_skills(
        &mut self,
        reg_id: RegistryId,
        keep: &[EntryId],
    ) -> CatalogStoreResult<u64>;

    /// Points `(reg_id, name)` at the given server entry.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogStoreError::NotFound`] when the registry or entry
    /// does not exist.
    fn upsert_latest_server_version(
        &mut self,
        pointer: &LatestVersionPointer,
    ) -> CatalogStoreResult<()>;

    /// Points `(reg_id, name)` at the given skill entry.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogStoreError::NotFound`] when the registry or entry
    /// does not exist.
    fn upsert_latest_skill_version(
        &mut self,
        pointer: &LatestVersionPointer,
    ) -> CatalogStoreResult<()>;

    /// Loads one server version.
    ///
    /// Without a registry name, registries are searched in
    /// `(created_at, name)` order and the first match wins.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogStoreError::NotFound`] when nothing matches.
    fn get_server_version(
        &mut self,
        name: &EntryName,
        version: &VersionRef,
        registry: Option<&RegistryName>,
    ) -> CatalogStoreResult<ServerVersion>;

    /// Loads one skill version.
    ///
    /// Without a registry name, registries are searched in
    /// `(created_at, name)` order and the first match wins.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogStoreError::NotFound`] when nothing matches.
    fn get_skill_version(
        &mut self,
        name: &EntryName,
        version: &VersionRef,
        registry: Option<&RegistryName>,
    ) -> CatalogStoreResult<SkillVersion>;

    /// Lists one page of server versions in `(name, version, id)` order.
    ///
    /// # Errors
    ///
    /// Returns storage failures.
    fn list_servers(
        &mut self,
        filter: &EntryListFilter,
        page: &PageRequest<EntryKey>,
    ) -> CatalogStoreResult<Vec<ServerVersion>>;

    /// Lists one page of skill versions in `(name, version, id)` order.
    ///
    /// # Errors
    ///
    /// Returns storage failures.
    fn list_skills(
        &mut self,
        filter: &EntryListFilter,
        page: &PageRequest<EntryKey>,
    ) -> CatalogStoreResult<Vec<SkillVersion>>;

    /// Loads packages for several server versions in one round-trip.
    ///
    /// # Errors
    ///
    /// Returns storage failures.
    fn list_server_packages(
        &mut self,
        entry_ids: &[EntryId],
    ) -> CatalogStoreResult<Vec<(EntryId, ServerPackage)>>;

    /// Loads remotes for several server versions in one round-trip.
    ///
    /// # Errors
    ///
    /// Returns storage failures.
    fn list_server_remotes(
        &mut self,
        entry_ids: &[EntryId],
    ) -> CatalogStoreResult<Vec<(EntryId, ServerRemote)>>;

    /// Loads icons for several server versions in one round-trip.
    ///
    /// # Errors
    ///
    /// Returns storage failures.
    fn list_server_icons(
        &mut self,
        entry_ids: &[EntryId],
    ) -> CatalogStoreResult<Vec<(EntryId, ServerIcon)>>;

    /// Loads git packages for several skill versions in one round-trip.
    ///
    /// # Errors
    ///
    /// Returns storage failures.
    fn list_skill_git_packages(
        &mut self,
        entry_ids: &[EntryId],
    ) -> CatalogStoreResult<Vec<(EntryId, SkillGitPackage)>>;

    /// Loads OCI packages for several skill versions in one round-trip.
    ///
    /// # Errors
    ///
    /// Returns storage failures.
    fn list_skill_oci_packages(
        &mut self,
        entry_ids: &[EntryId],
    ) -> CatalogStoreResult<Vec<(EntryId, SkillOciPackage)>>;

    /// Records a newly opened sync run.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogStoreError::NotFound`] when the registry does not
    /// exist.
    fn insert_registry_sync(&mut self, sync: &RegistrySync) -> CatalogStoreResult<()>;

    /// Moves an `IN_PROGRESS` run to its terminal status.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogStoreError::NotFound`] for an unknown run and
    /// [`CatalogStoreError::Conflict`] when the run is already terminal.
    fn finish_registry_sync(
        &mut self,
        sync_id: SyncId,
        completion: &SyncCompletion,
        ended_at: DateTime<Utc>,
    ) -> CatalogStoreResult<RegistrySync>;

    /// Returns the most recently started run for a registry.
    ///
    /// # Errors
    ///
    /// Returns storage failures.
    fn get_latest_registry_sync(
        &mut self,
        reg_id: RegistryId,
    ) -> CatalogStoreResult<Option<RegistrySync>>;

    /// Returns up to `limit` runs for a registry, newest first.
    ///
    /// # Errors
    ///
    /// Returns storage failures.
    fn list_registry_syncs(
        &mut self,
        reg_id: RegistryId,
        limit: usize,
    ) -> CatalogStoreResult<Vec<RegistrySync>>;

    /// Fails every `IN_PROGRESS` run started at or before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns storage failures.
    fn fail_stale_registry_syncs(
        &mut self,
        cutoff: DateTime<Utc>,
        error_msg: &str,
        ended_at: DateTime<Utc>,
    ) -> CatalogStoreResult<Vec<RegistrySync>>;
}

/// Transactional entry point to a catalog store.
///
/// Work runs as a synchronous closure so that adapters can execute it on a
/// blocking thread inside a database transaction. The closure's error type
/// only needs to absorb [`CatalogStoreError`], letting callers abort with
/// their own errors.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Runs `work` in a read-write transaction, committing when it returns
    /// `Ok` and rolling back otherwise.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or a converted [`CatalogStoreError`]
    /// when the transaction itself cannot be opened or committed.
    async fn write<T, E, F>(&self, work: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<CatalogStoreError> + Send + 'static,
        F: FnOnce(&mut dyn CatalogTransaction) -> Result<T, E> + Send + 'static;

    /// Runs `work` in a read-only transaction.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or a converted [`CatalogStoreError`]
    /// when the transaction itself fails.
    async fn read<T, E, F>(&self, work: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<CatalogStoreError> + Send + 'static,
        F: FnOnce(&mut dyn CatalogTransaction) -> Result<T, E> + Send + 'static;
}

/// Errors returned by catalog store implementations.
#[derive(Debug, Clone, Error)]
pub enum CatalogStoreError {
    /// A uniqueness rule rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A looked-up record or a referenced parent does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A write crossed the ownership boundary between `API` and `CONFIG`
    /// records.
    #[error("protected: {0}")]
    Protected(String),

    /// The write was rejected as malformed or out of range.
    #[error("invalid: {0}")]
    Invalid(String),

    /// A retryable storage failure such as a deadlock or dropped connection.
    #[error("transient storage error: {0}")]
    Transient(Arc<dyn std::error::Error + Send + Sync>),

    /// Persisted data could not be reconstructed into domain types.
    #[error("invalid persisted catalog data: {0}")]
    InvalidPersistedData(Arc<dyn std::error::Error + Send + Sync>),

    /// Non-retryable persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl CatalogStoreError {
    /// Builds a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Builds a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Builds a protection error.
    pub fn protected(message: impl Into<String>) -> Self {
        Self::Protected(message.into())
    }

    /// Builds an invalid-input error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }

    /// Wraps a retryable storage failure.
    pub fn transient(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transient(Arc::new(err))
    }

    /// Wraps persisted-data decoding or validation failures.
    pub fn invalid_persisted_data(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::InvalidPersistedData(Arc::new(err))
    }

    /// Wraps a persistence-layer failure.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }

    /// Returns whether retrying the failed work may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Returns whether the error is a uniqueness conflict.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns whether the error is a missing record.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
