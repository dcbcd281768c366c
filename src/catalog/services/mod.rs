//! Catalog orchestration services.

mod admin;
mod coordinator;
mod hydrate;
mod query;
mod reconcile;
mod retry;
mod sync_tracker;

pub use admin::{
    CatalogAdminError, CatalogAdminResult, CatalogAdminService, CreateRegistryRequest,
    PublishTarget,
};
pub use coordinator::{SyncCoordinator, SyncPassReport};
pub use query::{CatalogQueryError, CatalogQueryResult, CatalogQueryService, EntryQuery};
pub use reconcile::{
    ReconciliationEngine, RegistryReconcileReport, SyncError, SyncReport, SyncResult,
};
pub use retry::RetryPolicy;
pub use sync_tracker::{ABANDONED_SYNC_MESSAGE, SyncRunTracker};
