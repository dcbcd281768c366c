//! Reconciliation engine re-deriving catalog state from source snapshots.
//!
//! A sync walks `STARTED -> FETCHING -> APPLYING -> COMPLETED`, or ends in
//! `FAILED`. The fetch happens outside any transaction; the apply step
//! writes the registry row, every entry with its payload and children, the
//! latest pointers and the orphan deletions in one transaction, so a crash
//! leaves either the previous or the new catalog state for the registry.

use super::retry::RetryPolicy;
use super::sync_tracker::SyncRunTracker;
use crate::catalog::{
    config::CatalogConfig,
    domain::{
        CatalogDomainError, CreationType, DeclaredRegistry, EntryId, EntryType,
        LatestVersionPointer, NewEntryParams, Registry, RegistryEntry, RegistryId, RegistryName,
        RegistryType, RegistryUpsert, SnapshotEntry, SnapshotPayload, SourceSnapshot, SyncAttempt,
        SyncId, SyncPhase,
    },
    ports::{
        CatalogStore, CatalogStoreError, CatalogStoreResult, CatalogTransaction, SourceFetchError,
        SourceFetcher,
    },
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Errors that end a sync or a registry-set reconciliation.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// The snapshot or a phase transition failed validation.
    #[error(transparent)]
    Domain(#[from] CatalogDomainError),

    /// Storage rejected the work.
    #[error(transparent)]
    Store(#[from] CatalogStoreError),

    /// The source could not be fetched.
    #[error(transparent)]
    Fetch(#[from] SourceFetchError),

    /// The registry is `CONFIG`-owned but excluded from background sync.
    #[error("registry {0} is not syncable")]
    NotSyncable(RegistryName),

    /// The snapshot describes a different registry than the one synced.
    #[error("snapshot declares registry {found}, expected {expected}")]
    RegistryMismatch {
        /// Registry being synced.
        expected: RegistryName,
        /// Registry named by the snapshot.
        found: RegistryName,
    },

    /// A registry name appears more than once in a declared set.
    #[error("registry {0} is declared more than once")]
    DuplicateRegistry(RegistryName),

    /// The caller cancelled the sync.
    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Returns whether retrying the failed work may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_transient())
    }

    /// Returns the non-sensitive text persisted on a failed run.
    ///
    /// Storage and fetch failures are reduced to their class; the raw
    /// error goes to the log only.
    #[must_use]
    pub fn sanitized_summary(&self) -> String {
        match self {
            Self::Domain(err) => format!("validation failed: {err}"),
            Self::Store(err) => store_summary(err).to_owned(),
            Self::Fetch(SourceFetchError::NotConfigured(_)) => "no source configured".to_owned(),
            Self::Fetch(SourceFetchError::Unavailable { .. }) => "source unavailable".to_owned(),
            Self::Fetch(SourceFetchError::Fetch(_)) => "source fetch failed".to_owned(),
            Self::NotSyncable(_)
            | Self::RegistryMismatch { .. }
            | Self::DuplicateRegistry(_)
            | Self::Cancelled => self.to_string(),
        }
    }
}

const fn store_summary(err: &CatalogStoreError) -> &'static str {
    match err {
        CatalogStoreError::Conflict(_) => "storage conflict",
        CatalogStoreError::NotFound(_) => "referenced record not found",
        CatalogStoreError::Protected(_) => "record is API-owned",
        CatalogStoreError::Invalid(_) => "storage rejected the snapshot",
        CatalogStoreError::Transient(_) => "storage temporarily unavailable",
        CatalogStoreError::InvalidPersistedData(_) | CatalogStoreError::Persistence(_) => {
            "storage error"
        }
    }
}

/// Result type for reconciliation operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Outcome of one registry sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Registry synced.
    pub registry: RegistryName,
    /// Run record; absent when the registry was skipped before opening one.
    pub sync_id: Option<SyncId>,
    /// Whether the registry turned out to be `API`-owned and was left alone.
    pub skipped_protected: bool,
    /// Entries whose payload was written from the snapshot.
    pub entries_written: usize,
    /// Snapshot versions colliding with `API`-owned entries.
    pub protected_entries: usize,
    /// Latest pointers written.
    pub latest_pointers: usize,
    /// Entries deleted because they vanished from the source.
    pub orphans_deleted: u64,
}

impl SyncReport {
    fn skipped(registry: RegistryName) -> Self {
        Self {
            registry,
            sync_id: None,
            skipped_protected: true,
            entries_written: 0,
            protected_entries: 0,
            latest_pointers: 0,
            orphans_deleted: 0,
        }
    }

    fn from_outcome(registry: RegistryName, sync_id: SyncId, outcome: ApplyOutcome) -> Self {
        Self {
            registry,
            sync_id: Some(sync_id),
            skipped_protected: outcome.skipped_protected,
            entries_written: outcome.entries_written,
            protected_entries: outcome.protected_entries,
            latest_pointers: outcome.latest_pointers,
            orphans_deleted: outcome.orphans_deleted,
        }
    }
}

/// Outcome of reconciling the declared registry set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryReconcileReport {
    /// `CONFIG` registries inserted or updated.
    pub written: Vec<Registry>,
    /// Declared names left alone because an `API` registry owns them.
    pub skipped_protected: Vec<RegistryName>,
    /// `CONFIG` registries deleted because they are no longer declared.
    pub deleted: u64,
}

#[derive(Debug, Default)]
struct ApplyOutcome {
    skipped_protected: bool,
    entries_written: usize,
    protected_entries: usize,
    latest_pointers: usize,
    orphans_deleted: u64,
}

impl ApplyOutcome {
    fn protected_registry() -> Self {
        Self {
            skipped_protected: true,
            ..Self::default()
        }
    }
}

struct SyncPlan {
    reg_id: RegistryId,
    registry_name: RegistryName,
    reg_type: RegistryType,
    syncable: bool,
    entries: Vec<SnapshotEntry>,
}

/// Reconciles registries against their sources.
pub struct ReconciliationEngine<S, F, C>
where
    S: CatalogStore + 'static,
    F: SourceFetcher,
    C: Clock + Send + Sync + 'static,
{
    store: Arc<S>,
    fetcher: Arc<F>,
    clock: Arc<C>,
    tracker: SyncRunTracker<S, C>,
    retry: RetryPolicy,
    max_metadata_bytes: usize,
}

impl<S, F, C> ReconciliationEngine<S, F, C>
where
    S: CatalogStore + 'static,
    F: SourceFetcher,
    C: Clock + Send + Sync + 'static,
{
    /// Creates an engine over the given store, fetcher and clock.
    #[must_use]
    pub fn new(store: Arc<S>, fetcher: Arc<F>, clock: Arc<C>, config: &CatalogConfig) -> Self {
        let tracker = SyncRunTracker::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            config.sync.stale_after(),
        );
        Self {
            store,
            fetcher,
            clock,
            tracker,
            retry: RetryPolicy::from_config(&config.sync),
            max_metadata_bytes: config.max_metadata_bytes,
        }
    }

    /// Returns the run tracker shared with the engine.
    #[must_use]
    pub const fn tracker(&self) -> &SyncRunTracker<S, C> {
        &self.tracker
    }

    /// Lists the registries background sync should visit.
    ///
    /// # Errors
    ///
    /// Returns storage failures.
    pub async fn syncable_registries(&self) -> SyncResult<Vec<Registry>> {
        self.store
            .read(|tx| tx.list_syncable_registries().map_err(SyncError::from))
            .await
    }

    /// Syncs one registry against its source.
    ///
    /// `API`-owned registries are skipped without opening a run. Every
    /// other outcome is recorded on a [`crate::catalog::domain::RegistrySync`]
    /// row, except cancellation, which leaves the row `IN_PROGRESS` for the
    /// stale sweep. A run the sweep closed while the apply was in flight
    /// keeps its `FAILED` status, and the committed apply is still reported
    /// as a success.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotSyncable`] for registries excluded from sync,
    /// [`SyncError::Cancelled`] when `cancel` fires, and the fetch,
    /// validation or storage error that failed the run.
    pub async fn sync_registry(
        &self,
        name: &RegistryName,
        cancel: &CancellationToken,
    ) -> SyncResult<SyncReport> {
        let lookup = name.clone();
        let registry = self
            .store
            .read(move |tx| tx.get_registry_by_name(&lookup).map_err(SyncError::from))
            .await?;

        if registry.is_protected() {
            warn!(registry = %name, "skipping sync of API-owned registry");
            return Ok(SyncReport::skipped(name.clone()));
        }
        if !registry.is_syncable() {
            return Err(SyncError::NotSyncable(name.clone()));
        }

        let run = self.tracker.open(registry.id()).await?;
        let mut attempt = SyncAttempt::new(run.id());
        info!(registry = %name, sync_id = %run.id(), "sync started");

        match self.run_attempt(&registry, &mut attempt, cancel).await {
            Ok(outcome) => {
                attempt.advance(SyncPhase::Completed)?;
                match self.tracker.complete(run.id()).await {
                    Ok(_) => {}
                    // The apply has committed; the sweep only closed the audit row.
                    Err(err) if err.is_conflict() => warn!(
                        registry = %name,
                        sync_id = %run.id(),
                        "sync applied after its run was closed by the stale sweep"
                    ),
                    Err(err) => return Err(err.into()),
                }
                let report = SyncReport::from_outcome(name.clone(), run.id(), outcome);
                info!(
                    registry = %name,
                    sync_id = %run.id(),
                    entries_written = report.entries_written,
                    protected_entries = report.protected_entries,
                    latest_pointers = report.latest_pointers,
                    orphans_deleted = report.orphans_deleted,
                    "sync completed"
                );
                Ok(report)
            }
            Err(SyncError::Cancelled) => {
                warn!(
                    registry = %name,
                    sync_id = %run.id(),
                    phase = %attempt.phase(),
                    "sync cancelled, run left in progress"
                );
                Err(SyncError::Cancelled)
            }
            Err(err) => {
                error!(
                    registry = %name,
                    sync_id = %run.id(),
                    phase = %attempt.phase(),
                    error = %err,
                    "sync failed"
                );
                attempt.advance(SyncPhase::Failed)?;
                if let Err(record_err) = self.tracker.fail(run.id(), err.sanitized_summary()).await
                {
                    error!(
                        sync_id = %run.id(),
                        error = %record_err,
                        "failed to record sync failure"
                    );
                }
                Err(err)
            }
        }
    }

    async fn run_attempt(
        &self,
        registry: &Registry,
        attempt: &mut SyncAttempt,
        cancel: &CancellationToken,
    ) -> SyncResult<ApplyOutcome> {
        ensure_active(cancel)?;
        attempt.advance(SyncPhase::Fetching)?;
        let document = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(SyncError::Cancelled),
            fetched = self.fetcher.fetch(registry) => fetched?,
        };
        ensure_active(cancel)?;

        let snapshot = SourceSnapshot::parse(document, self.max_metadata_bytes)?;
        let (declared, entries) = snapshot.into_parts();
        if declared.name != *registry.name() {
            return Err(SyncError::RegistryMismatch {
                expected: registry.name().clone(),
                found: declared.name,
            });
        }

        attempt.advance(SyncPhase::Applying)?;
        let plan = Arc::new(SyncPlan {
            reg_id: registry.id(),
            registry_name: registry.name().clone(),
            reg_type: declared.reg_type,
            syncable: registry.is_syncable(),
            entries,
        });
        self.retry
            .run(
                || {
                    let attempt_plan = Arc::clone(&plan);
                    let attempt_clock = Arc::clone(&self.clock);
                    let attempt_cancel = cancel.clone();
                    self.store.write(move |tx| {
                        apply_snapshot(tx, &attempt_plan, attempt_clock.as_ref(), &attempt_cancel)
                    })
                },
                SyncError::is_transient,
            )
            .await
    }

    /// Reconciles the set of `CONFIG` registries against a declaration.
    ///
    /// Declared names owned by an `API` registry are skipped, the rest are
    /// upserted, and `CONFIG` registries missing from the declaration are
    /// deleted with everything they own. All of it commits atomically.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::DuplicateRegistry`] when a name is declared
    /// twice, or storage failures once retries are exhausted.
    pub async fn reconcile_registries(
        &self,
        declared: &[DeclaredRegistry],
    ) -> SyncResult<RegistryReconcileReport> {
        let mut seen = HashSet::new();
        if let Some(duplicate) = declared.iter().find(|registry| !seen.insert(&registry.name)) {
            return Err(SyncError::DuplicateRegistry(duplicate.name.clone()));
        }

        let rows = Arc::new(declared.to_vec());
        let now = self.clock.utc();
        let report = self
            .retry
            .run(
                || {
                    let batch = Arc::clone(&rows);
                    self.store
                        .write(move |tx| reconcile_registry_set(tx, &batch, now))
                },
                SyncError::is_transient,
            )
            .await?;

        for name in &report.skipped_protected {
            warn!(registry = %name, "declared registry is API-owned, skipping");
        }
        info!(
            written = report.written.len(),
            skipped = report.skipped_protected.len(),
            deleted = report.deleted,
            "registry set reconciled"
        );
        Ok(report)
    }
}

fn ensure_active(cancel: &CancellationToken) -> SyncResult<()> {
    if cancel.is_cancelled() {
        Err(SyncError::Cancelled)
    } else {
        Ok(())
    }
}

fn reconcile_registry_set(
    tx: &mut dyn CatalogTransaction,
    declared: &[DeclaredRegistry],
    now: DateTime<Utc>,
) -> SyncResult<RegistryReconcileReport> {
    let names: Vec<RegistryName> = declared
        .iter()
        .map(|registry| registry.name.clone())
        .collect();
    let skipped_protected = tx.get_api_registries_by_names(&names)?;
    let upserts: Vec<RegistryUpsert> = declared
        .iter()
        .filter(|registry| !skipped_protected.contains(&registry.name))
        .map(|registry| registry.to_upsert(now))
        .collect();
    let written = tx.bulk_upsert_registries(&upserts)?;
    let keep: Vec<RegistryId> = written.iter().map(Registry::id).collect();
    let deleted = tx.delete_registries_not_in_list(&keep)?;
    Ok(RegistryReconcileReport {
        written,
        skipped_protected,
        deleted,
    })
}

fn apply_snapshot(
    tx: &mut dyn CatalogTransaction,
    plan: &SyncPlan,
    clock: &impl Clock,
    cancel: &CancellationToken,
) -> SyncResult<ApplyOutcome> {
    ensure_active(cancel)?;
    let protected = tx.get_api_registries_by_names(std::slice::from_ref(&plan.registry_name))?;
    if !protected.is_empty() {
        return Ok(ApplyOutcome::protected_registry());
    }

    let upsert = RegistryUpsert {
        id: plan.reg_id,
        name: plan.registry_name.clone(),
        reg_type: plan.reg_type,
        creation_type: CreationType::Config,
        syncable: plan.syncable,
        timestamp: clock.utc(),
    };
    let Some(registry) = tx
        .bulk_upsert_registries(std::slice::from_ref(&upsert))?
        .into_iter()
        .next()
    else {
        return Ok(ApplyOutcome::protected_registry());
    };
    let reg_id = registry.id();

    let mut outcome = ApplyOutcome::default();
    let mut keep_servers: Vec<EntryId> = Vec::new();
    let mut keep_skills: Vec<EntryId> = Vec::new();
    let mut latest: Vec<(EntryType, LatestVersionPointer)> = Vec::new();

    for entry in &plan.entries {
        ensure_active(cancel)?;
        let Some(stored) = claim_entry(tx, reg_id, entry, clock)? else {
            outcome.protected_entries += 1;
            continue;
        };
        write_payload(tx, stored.id(), &entry.payload)?;
        outcome.entries_written += 1;

        match entry.entry_type() {
            EntryType::Mcp => keep_servers.push(stored.id()),
            EntryType::Skill => keep_skills.push(stored.id()),
        }
        if entry.is_latest {
            latest.push((
                entry.entry_type(),
                LatestVersionPointer::new(
                    reg_id,
                    entry.name.clone(),
                    entry.version.clone(),
                    stored.id(),
                ),
            ));
        }
    }

    for (entry_type, pointer) in &latest {
        ensure_active(cancel)?;
        match entry_type {
            EntryType::Mcp => tx.upsert_latest_server_version(pointer)?,
            EntryType::Skill => tx.upsert_latest_skill_version(pointer)?,
        }
    }
    outcome.latest_pointers = latest.len();

    ensure_active(cancel)?;
    let servers_deleted = tx.delete_orphaned_servers(reg_id, &keep_servers)?;
    let skills_deleted = tx.delete_orphaned_skills(reg_id, &keep_skills)?;
    outcome.orphans_deleted = servers_deleted.saturating_add(skills_deleted);
    Ok(outcome)
}

/// Inserts the entry row for a snapshot version, or adopts the existing
/// one. Returns `None` when the existing row is `API`-owned.
fn claim_entry(
    tx: &mut dyn CatalogTransaction,
    reg_id: RegistryId,
    entry: &SnapshotEntry,
    clock: &impl Clock,
) -> SyncResult<Option<RegistryEntry>> {
    let candidate = RegistryEntry::new(
        NewEntryParams {
            reg_id,
            entry_type: entry.entry_type(),
            name: entry.name.clone(),
            version: entry.version.clone(),
            title: entry.title.clone(),
            description: entry.description.clone(),
            creation_type: CreationType::Config,
        },
        clock,
    );
    match tx.insert_registry_entry(&candidate) {
        Ok(()) => Ok(Some(candidate)),
        Err(err) if err.is_conflict() => {
            let existing = tx
                .find_registry_entry(reg_id, &entry.name, &entry.version)?
                .ok_or_else(|| {
                    CatalogStoreError::not_found(format!(
                        "entry {}@{} missing after conflict",
                        entry.name, entry.version
                    ))
                })?;
            if existing.is_protected() {
                warn!(
                    name = %entry.name,
                    version = %entry.version,
                    "snapshot version collides with API-owned entry, skipping"
                );
                return Ok(None);
            }
            if existing.entry_type() != entry.entry_type() {
                return Err(CatalogStoreError::invalid(format!(
                    "entry {}@{} is stored as {}, snapshot declares {}",
                    entry.name,
                    entry.version,
                    existing.entry_type(),
                    entry.entry_type()
                ))
                .into());
            }
            debug!(name = %entry.name, version = %entry.version, "entry version already present");
            Ok(Some(existing))
        }
        Err(err) => Err(err.into()),
    }
}

/// Writes the version row and replaces its children.
fn write_payload(
    tx: &mut dyn CatalogTransaction,
    entry_id: EntryId,
    payload: &SnapshotPayload,
) -> CatalogStoreResult<()> {
    match payload {
        SnapshotPayload::Server(server) => {
            tx.upsert_server_version_for_sync(entry_id, &server.details)?;
            tx.delete_server_children(entry_id)?;
            for package in &server.packages {
                tx.insert_server_package(entry_id, package)?;
            }
            for remote in &server.remotes {
                tx.insert_server_remote(entry_id, remote)?;
            }
            for icon in &server.icons {
                tx.insert_server_icon(entry_id, icon)?;
            }
        }
        SnapshotPayload::Skill(skill) => {
            tx.upsert_skill_version_for_sync(entry_id, &skill.details)?;
            tx.delete_skill_packages(entry_id)?;
            for package in &skill.git_packages {
                tx.insert_skill_git_package(entry_id, package)?;
            }
            for package in &skill.oci_packages {
                tx.insert_skill_oci_package(entry_id, package)?;
            }
        }
    }
    Ok(())
}
