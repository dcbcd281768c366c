//! Shared fixtures for catalog service tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::catalog::{
    adapters::memory::{InMemoryCatalogStore, InMemorySourceFetcher},
    config::CatalogConfig,
    domain::{
        CreationType, DeclaredRegistry, EntryName, EntryType, EntryVersion, NewEntryParams,
        RegistryEntry, RegistryName, RegistryType, ServerDetails,
    },
    ports::{CatalogStore, CatalogStoreError, CatalogTransaction},
    services::{
        CatalogAdminService, CatalogQueryService, ReconciliationEngine, SyncReport, SyncResult,
    },
};
use async_trait::async_trait;
use mockable::DefaultClock;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

pub(super) type Engine<S> = ReconciliationEngine<S, InMemorySourceFetcher, DefaultClock>;

/// Services wired over one store and one in-memory source.
pub(super) struct Catalog<S: CatalogStore + 'static = InMemoryCatalogStore> {
    pub(super) store: Arc<S>,
    pub(super) fetcher: Arc<InMemorySourceFetcher>,
    pub(super) engine: Arc<Engine<S>>,
    pub(super) query: CatalogQueryService<S>,
    pub(super) admin: CatalogAdminService<S, DefaultClock>,
}

impl Catalog {
    pub(super) fn in_memory() -> Self {
        Self::over(InMemoryCatalogStore::new(), &CatalogConfig::default())
    }
}

impl<S: CatalogStore + 'static> Catalog<S> {
    pub(super) fn over(backing: S, config: &CatalogConfig) -> Self {
        let store = Arc::new(backing);
        let fetcher = Arc::new(InMemorySourceFetcher::new());
        let clock = Arc::new(DefaultClock);
        Self {
            engine: Arc::new(ReconciliationEngine::new(
                Arc::clone(&store),
                Arc::clone(&fetcher),
                Arc::clone(&clock),
                config,
            )),
            query: CatalogQueryService::new(Arc::clone(&store), config),
            admin: CatalogAdminService::new(Arc::clone(&store), clock, config),
            fetcher,
            store,
        }
    }

    /// Declares the full set of `FILE` registries.
    pub(super) async fn declare(&self, registries: &[&str]) {
        let declared: Vec<DeclaredRegistry> = registries
            .iter()
            .map(|registry| DeclaredRegistry::new(registry_name(registry), RegistryType::File))
            .collect();
        self.engine
            .reconcile_registries(&declared)
            .await
            .expect("registry set should reconcile");
    }

    /// Serves `entries` as the snapshot of `registry`.
    pub(super) fn serve(&self, registry: &str, entries: Value) {
        self.fetcher
            .set_document(registry_name(registry), document(registry, entries))
            .expect("document should be stored");
    }

    pub(super) async fn sync(&self, registry: &str) -> SyncResult<SyncReport> {
        self.engine
            .sync_registry(&registry_name(registry), &CancellationToken::new())
            .await
    }

    /// Serves `entries` and syncs, expecting success.
    pub(super) async fn sync_entries(&self, registry: &str, entries: Value) -> SyncReport {
        self.serve(registry, entries);
        self.sync(registry).await.expect("sync should complete")
    }
}

impl<S: CatalogStore + 'static> Catalog<S> {
    /// Writes an `API`-owned server version straight into `registry`.
    pub(super) async fn insert_api_server(
        &self,
        registry: &str,
        name: &str,
        version: &str,
    ) -> RegistryEntry {
        let registry = registry_name(registry);
        let name = EntryName::new(name).expect("valid entry name");
        let version = EntryVersion::new(version).expect("valid version");
        self.store
            .write(move |tx| -> Result<RegistryEntry, CatalogStoreError> {
                let reg = tx.get_registry_by_name(&registry)?;
                let entry = RegistryEntry::new(
                    NewEntryParams {
                        reg_id: reg.id(),
                        entry_type: EntryType::Mcp,
                        name,
                        version,
                        title: Some("Published".to_owned()),
                        description: None,
                        creation_type: CreationType::Api,
                    },
                    &DefaultClock,
                );
                tx.insert_registry_entry(&entry)?;
                tx.insert_server_version(entry.id(), &ServerDetails::default())?;
                Ok(entry)
            })
            .await
            .expect("API entry should be written")
    }
}

pub(super) fn registry_name(value: &str) -> RegistryName {
    RegistryName::new(value).expect("valid registry name")
}

pub(super) fn document(registry: &str, entries: Value) -> Value {
    json!({
        "registry": {"name": registry, "type": "FILE"},
        "entries": entries,
    })
}

/// One server version with a single npm package.
pub(super) fn server(version: &str) -> Value {
    json!({
        "version": version,
        "type": "MCP",
        "title": format!("Server {version}"),
        "server": {
            "packages": [{
                "registry_type": "npm",
                "identifier": "@acme/server",
                "version": version,
                "transport": {"type": "stdio"}
            }],
            "remotes": [{"type": "streamable-http", "url": format!("https://acme.test/{version}")}]
        }
    })
}

/// One server version explicitly flagged latest.
pub(super) fn latest_server(version: &str) -> Value {
    let mut value = server(version);
    if let Some(fields) = value.as_object_mut() {
        fields.insert("latest".to_owned(), Value::Bool(true));
    }
    value
}

/// Store whose writes fail transiently for a window of write calls.
pub(super) struct FlakyStore {
    inner: InMemoryCatalogStore,
    writes: AtomicU32,
    fail_from: u32,
    fail_count: u32,
}

impl FlakyStore {
    /// Fails write calls numbered `fail_from..fail_from + fail_count`,
    /// counting from zero.
    pub(super) fn failing_writes(fail_from: u32, fail_count: u32) -> Self {
        Self {
            inner: InMemoryCatalogStore::new(),
            writes: AtomicU32::new(0),
            fail_from,
            fail_count,
        }
    }
}

#[async_trait]
impl CatalogStore for FlakyStore {
    async fn write<T, E, F>(&self, work: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<CatalogStoreError> + Send + 'static,
        F: FnOnce(&mut dyn CatalogTransaction) -> Result<T, E> + Send + 'static,
    {
        let call = self.writes.fetch_add(1, Ordering::SeqCst);
        if (self.fail_from..self.fail_from + self.fail_count).contains(&call) {
            return Err(E::from(CatalogStoreError::transient(std::io::Error::other(
                "deadlock detected",
            ))));
        }
        self.inner.write(work).await
    }

    async fn read<T, E, F>(&self, work: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<CatalogStoreError> + Send + 'static,
        F: FnOnce(&mut dyn CatalogTransaction) -> Result<T, E> + Send + 'static,
    {
        self.inner.read(work).await
    }
}
