//! Durable bookkeeping of sync runs.

use crate::catalog::{
    domain::{RegistryId, RegistrySync, SyncCompletion, SyncId},
    ports::{CatalogStore, CatalogStoreResult},
};
use chrono::TimeDelta;
use mockable::Clock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Message recorded on runs closed by the stale sweep.
pub const ABANDONED_SYNC_MESSAGE: &str = "sync abandoned";

/// Opens, closes and sweeps [`RegistrySync`] records.
///
/// Each operation runs in its own short transaction so that the audit trail
/// survives a rolled-back apply step.
#[derive(Clone)]
pub struct SyncRunTracker<S, C>
where
    S: CatalogStore,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    clock: Arc<C>,
    stale_after: Duration,
}

impl<S, C> SyncRunTracker<S, C>
where
    S: CatalogStore,
    C: Clock + Send + Sync,
{
    /// Creates a tracker that treats runs older than `stale_after` as
    /// abandoned.
    #[must_use]
    pub const fn new(store: Arc<S>, clock: Arc<C>, stale_after: Duration) -> Self {
        Self {
            store,
            clock,
            stale_after,
        }
    }

    /// Records a new `IN_PROGRESS` run for `reg_id`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::catalog::ports::CatalogStoreError::NotFound`] when
    /// the registry does not exist, or other storage failures.
    pub async fn open(&self, reg_id: RegistryId) -> CatalogStoreResult<RegistrySync> {
        let sync = RegistrySync::start(reg_id, &*self.clock);
        let record = sync.clone();
        self.store
            .write(move |tx| tx.insert_registry_sync(&record))
            .await?;
        Ok(sync)
    }

    /// Marks a run `COMPLETED`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::catalog::ports::CatalogStoreError::Conflict`] when
    /// the run is already terminal, or other storage failures.
    pub async fn complete(&self, sync_id: SyncId) -> CatalogStoreResult<RegistrySync> {
        self.finish(sync_id, SyncCompletion::Completed).await
    }

    /// Marks a run `FAILED` with a sanitized summary.
    ///
    /// # Errors
    ///
    /// Returns [`crate::catalog::ports::CatalogStoreError::Conflict`] when
    /// the run is already terminal, or other storage failures.
    pub async fn fail(
        &self,
        sync_id: SyncId,
        summary: impl Into<String>,
    ) -> CatalogStoreResult<RegistrySync> {
        self.finish(sync_id, SyncCompletion::Failed(summary.into()))
            .await
    }

    async fn finish(
        &self,
        sync_id: SyncId,
        completion: SyncCompletion,
    ) -> CatalogStoreResult<RegistrySync> {
        let ended_at = self.clock.utc();
        self.store
            .write(move |tx| tx.finish_registry_sync(sync_id, &completion, ended_at))
            .await
    }

    /// Returns the most recently started run for a registry.
    ///
    /// # Errors
    ///
    /// Returns storage failures.
    pub async fn latest(&self, reg_id: RegistryId) -> CatalogStoreResult<Option<RegistrySync>> {
        self.store
            .read(move |tx| tx.get_latest_registry_sync(reg_id))
            .await
    }

    /// Returns up to `limit` runs for a registry, newest first.
    ///
    /// # Errors
    ///
    /// Returns storage failures.
    pub async fn history(
        &self,
        reg_id: RegistryId,
        limit: usize,
    ) -> CatalogStoreResult<Vec<RegistrySync>> {
        self.store
            .read(move |tx| tx.list_registry_syncs(reg_id, limit))
            .await
    }

    /// Fails every `IN_PROGRESS` run that started at or before
    /// `now - stale_after`.
    ///
    /// A threshold reaching past the earliest representable instant makes
    /// nothing stale.
    ///
    /// # Errors
    ///
    /// Returns storage failures.
    pub async fn sweep_stale(&self) -> CatalogStoreResult<Vec<RegistrySync>> {
        let now = self.clock.utc();
        let Some(cutoff) = TimeDelta::from_std(self.stale_after)
            .ok()
            .and_then(|age| now.checked_sub_signed(age))
        else {
            debug!(stale_after = ?self.stale_after, "stale threshold out of range, nothing to sweep");
            return Ok(Vec::new());
        };
        let swept = self
            .store
            .write(move |tx| tx.fail_stale_registry_syncs(cutoff, ABANDONED_SYNC_MESSAGE, now))
            .await?;
        for sync in &swept {
            warn!(
                sync_id = %sync.id(),
                reg_id = %sync.reg_id(),
                started_at = %sync.started_at(),
                "closed abandoned sync run"
            );
        }
        Ok(swept)
    }
}
