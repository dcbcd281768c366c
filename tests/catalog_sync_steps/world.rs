//! Shared world state for catalog sync BDD scenarios.

use std::collections::BTreeMap;
use std::sync::Arc;

use mcp_catalog::catalog::{
    adapters::memory::{InMemoryCatalogStore, InMemorySourceFetcher},
    config::CatalogConfig,
    domain::{RegistryName, RegistrySync},
    services::{
        CatalogAdminService, CatalogQueryService, ReconciliationEngine, SyncError, SyncReport,
    },
};
use mockable::DefaultClock;
use rstest::fixture;
use serde_json::{Value, json};

/// Engine type used by the BDD world.
pub type TestEngine = ReconciliationEngine<InMemoryCatalogStore, InMemorySourceFetcher, DefaultClock>;

/// Versions served per entry name, in listing order.
pub type SourceListing = BTreeMap<String, Vec<String>>;

/// Scenario world for catalog sync behaviour tests.
pub struct CatalogSyncWorld {
    pub fetcher: Arc<InMemorySourceFetcher>,
    pub engine: TestEngine,
    pub query: CatalogQueryService<InMemoryCatalogStore>,
    pub admin: CatalogAdminService<InMemoryCatalogStore, DefaultClock>,
    pub sources: BTreeMap<String, SourceListing>,
    pub last_sync: Option<Result<SyncReport, SyncError>>,
}

impl CatalogSyncWorld {
    /// Creates a world over an empty in-memory catalog.
    #[must_use]
    pub fn new() -> Self {
        install_tracing();
        let config = CatalogConfig::default();
        let store = Arc::new(InMemoryCatalogStore::new());
        let fetcher = Arc::new(InMemorySourceFetcher::new());
        let clock = Arc::new(DefaultClock);

        Self {
            engine: ReconciliationEngine::new(
                Arc::clone(&store),
                Arc::clone(&fetcher),
                Arc::clone(&clock),
                &config,
            ),
            query: CatalogQueryService::new(Arc::clone(&store), &config),
            admin: CatalogAdminService::new(store, clock, &config),
            fetcher,
            sources: BTreeMap::new(),
            last_sync: None,
        }
    }

    /// Pushes the current listing of `registry` to the source fetcher.
    ///
    /// The last version listed for a name is its latest.
    pub fn publish_source(&self, registry: &str) -> Result<(), eyre::Report> {
        let entries: serde_json::Map<String, Value> = self
            .sources
            .get(registry)
            .into_iter()
            .flatten()
            .map(|(name, versions)| {
                let listed = versions
                    .iter()
                    .map(|version| json!({"version": version, "type": "MCP", "server": {}}))
                    .collect();
                (name.clone(), Value::Array(listed))
            })
            .collect();
        self.fetcher.set_document(
            RegistryName::new(registry)?,
            json!({
                "registry": {"name": registry, "type": "FILE"},
                "entries": entries,
            }),
        )?;
        Ok(())
    }

    /// Returns the newest sync run of `registry`.
    pub fn last_run(&self, registry: &str) -> Result<RegistrySync, eyre::Report> {
        run_async(self.query.list_registry_syncs(registry, 1))?
            .into_iter()
            .next()
            .ok_or_else(|| eyre::eyre!("registry {registry} has no sync runs"))
    }
}

impl Default for CatalogSyncWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> CatalogSyncWorld {
    CatalogSyncWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}

fn install_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
    if installed.is_ok() {
        tracing::debug!("test subscriber installed");
    }
}
