//! Periodic, bounded-parallel sync of every syncable registry.

use super::reconcile::{ReconciliationEngine, SyncError, SyncReport, SyncResult};
use crate::catalog::{
    config::SyncConfig,
    domain::RegistryName,
    ports::{CatalogStore, SourceFetcher},
};
use mockable::Clock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Outcome of one coordinator pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPassReport {
    /// Abandoned runs closed before the pass started.
    pub swept_stale: usize,
    /// Registries synced successfully, including protected skips.
    pub completed: Vec<SyncReport>,
    /// Registries whose sync failed, with the sanitized summary.
    pub failed: Vec<(RegistryName, String)>,
}

/// Drives [`ReconciliationEngine::sync_registry`] across registries.
///
/// Each registry syncs on its own task; at most `max_concurrent` run at
/// once. Registries never share a transaction, so one failure does not
/// affect the others.
pub struct SyncCoordinator<S, F, C>
where
    S: CatalogStore + 'static,
    F: SourceFetcher + 'static,
    C: Clock + Send + Sync + 'static,
{
    engine: Arc<ReconciliationEngine<S, F, C>>,
    max_concurrent: usize,
    interval: Duration,
}

impl<S, F, C> SyncCoordinator<S, F, C>
where
    S: CatalogStore + 'static,
    F: SourceFetcher + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a coordinator around a shared engine.
    #[must_use]
    pub fn new(engine: Arc<ReconciliationEngine<S, F, C>>, config: &SyncConfig) -> Self {
        Self {
            engine,
            max_concurrent: config.max_concurrent_syncs.max(1),
            interval: config.interval(),
        }
    }

    /// Sweeps stale runs, then syncs every syncable registry once.
    ///
    /// Per-registry failures are collected in the report rather than
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns storage failures from the sweep or the registry listing, and
    /// [`SyncError::Cancelled`] when `cancel` fires before the pass starts.
    pub async fn run_once(&self, cancel: &CancellationToken) -> SyncResult<SyncPassReport> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        let swept = self.engine.tracker().sweep_stale().await?;
        let registries = self.engine.syncable_registries().await?;

        let permits = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();
        for registry in registries {
            let engine = Arc::clone(&self.engine);
            let task_permits = Arc::clone(&permits);
            let task_cancel = cancel.clone();
            tasks.spawn(async move {
                let name = registry.name().clone();
                let result = match task_permits.acquire_owned().await {
                    Ok(_permit) => engine.sync_registry(&name, &task_cancel).await,
                    Err(_) => Err(SyncError::Cancelled),
                };
                (name, result)
            });
        }

        let mut report = SyncPassReport {
            swept_stale: swept.len(),
            ..SyncPassReport::default()
        };
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(sync))) => report.completed.push(sync),
                Ok((name, Err(err))) => {
                    report.failed.push((name, err.sanitized_summary()));
                }
                Err(join_err) => error!(error = %join_err, "sync task aborted"),
            }
        }

        info!(
            swept_stale = report.swept_stale,
            completed = report.completed.len(),
            failed = report.failed.len(),
            "sync pass finished"
        );
        Ok(report)
    }

    /// Runs [`Self::run_once`] every configured interval until `cancel`
    /// fires. The first pass starts immediately.
    pub async fn run_periodic(&self, cancel: &CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("sync coordinator stopping");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.run_once(cancel).await {
                        error!(error = %err, "sync pass failed");
                    }
                }
            }
        }
    }
}
