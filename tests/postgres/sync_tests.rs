//! Reconciliation and queries over `PostgreSQL`.

use std::sync::Arc;

use super::helpers::{PgCatalog, pg_catalog};
use eyre::{Result, ensure, eyre};
use mcp_catalog::catalog::{
    adapters::{memory::InMemorySourceFetcher, postgres::PostgresCatalogStore},
    config::CatalogConfig,
    domain::{DeclaredRegistry, PageParams, RegistryName, RegistryType, ServerPayload, SyncStatus},
    services::{
        CatalogAdminService, CatalogQueryService, CreateRegistryRequest, EntryQuery, PublishTarget,
        ReconciliationEngine,
    },
};
use mockable::DefaultClock;
use rstest::rstest;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

const REGISTRY: &str = "toolhive";

struct PgServices {
    fetcher: Arc<InMemorySourceFetcher>,
    engine: ReconciliationEngine<PostgresCatalogStore, InMemorySourceFetcher, DefaultClock>,
    query: CatalogQueryService<PostgresCatalogStore>,
    admin: CatalogAdminService<PostgresCatalogStore, DefaultClock>,
    _catalog: PgCatalog,
}

impl PgServices {
    async fn declared(catalog: PgCatalog) -> Result<Self> {
        let config = CatalogConfig::default();
        let store = Arc::new(catalog.store.clone());
        let fetcher = Arc::new(InMemorySourceFetcher::new());
        let clock = Arc::new(DefaultClock);
        let services = Self {
            engine: ReconciliationEngine::new(
                Arc::clone(&store),
                Arc::clone(&fetcher),
                Arc::clone(&clock),
                &config,
            ),
            query: CatalogQueryService::new(Arc::clone(&store), &config),
            admin: CatalogAdminService::new(store, clock, &config),
            fetcher,
            _catalog: catalog,
        };
        services
            .engine
            .reconcile_registries(&[DeclaredRegistry::new(
                RegistryName::new(REGISTRY)?,
                RegistryType::File,
            )])
            .await?;
        Ok(services)
    }

    async fn sync(&self, entries: Value) -> Result<()> {
        let name = RegistryName::new(REGISTRY)?;
        self.fetcher.set_document(
            name.clone(),
            json!({"registry": {"name": REGISTRY, "type": "FILE"}, "entries": entries}),
        )?;
        self.engine
            .sync_registry(&name, &CancellationToken::new())
            .await?;
        Ok(())
    }
}

fn server(version: &str) -> Value {
    json!({
        "version": version,
        "type": "MCP",
        "title": "Weather",
        "server": {
            "server_meta": {"tier": "gold"},
            "packages": [{
                "registry_type": "npm",
                "identifier": "@acme/weather",
                "version": version,
                "transport": {"type": "stdio"},
                "environment_variables": [{"name": "API_KEY", "is_secret": true}]
            }],
            "remotes": [{"type": "sse", "url": format!("https://acme.test/{version}")}],
            "icons": [{"src": "https://acme.test/dark.png", "theme": "dark"}]
        }
    })
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn sync_round_trips_hydrated_servers(pg_catalog: Result<PgCatalog>) -> Result<()> {
    let services = PgServices::declared(pg_catalog?).await?;
    services
        .sync(json!({"io.acme/weather": [server("1.0.0"), server("1.1.0")]}))
        .await?;

    let latest = services
        .query
        .get_server_version("io.acme/weather", "latest", Some(REGISTRY))
        .await?;
    ensure!(latest.version.entry.version().as_str() == "1.1.0");
    ensure!(latest.version.is_latest);
    let package = latest
        .packages
        .first()
        .ok_or_else(|| eyre!("package should be hydrated"))?;
    ensure!(package.environment_variables.len() == 1);
    ensure!(latest.remotes.len() == 1 && latest.icons.len() == 1);
    let meta = latest
        .version
        .details
        .server_meta
        .as_ref()
        .ok_or_else(|| eyre!("server meta should be stored"))?
        .to_json()?;
    ensure!(meta == json!({"tier": "gold"}), "unexpected meta {meta}");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn resync_deletes_orphans_and_keeps_published_entries(
    pg_catalog: Result<PgCatalog>,
) -> Result<()> {
    let services = PgServices::declared(pg_catalog?).await?;
    services
        .sync(json!({
            "io.acme/weather": server("1.0.0"),
            "io.acme/maps": server("2.0.0"),
        }))
        .await?;
    services
        .admin
        .create_registry(CreateRegistryRequest::new("curated"))
        .await?;
    services
        .admin
        .publish_server(
            PublishTarget::new("curated", "io.acme/curated", "1.0.0").as_latest(),
            ServerPayload::default(),
        )
        .await?;

    services
        .sync(json!({"io.acme/weather": server("1.0.0")}))
        .await?;

    let names: Vec<String> = services
        .query
        .list_servers(EntryQuery::default(), &PageParams::first_page())
        .await?
        .items
        .into_iter()
        .map(|detail| detail.version.entry.name().as_str().to_owned())
        .collect();
    ensure!(
        names == ["io.acme/curated", "io.acme/weather"],
        "unexpected catalog {names:?}"
    );
    let runs = services.query.list_registry_syncs(REGISTRY, 10).await?;
    ensure!(runs.len() == 2);
    ensure!(runs.iter().all(|run| run.status() == SyncStatus::Completed));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn pages_walk_the_whole_listing(pg_catalog: Result<PgCatalog>) -> Result<()> {
    let services = PgServices::declared(pg_catalog?).await?;
    services
        .sync(json!({
            "io.acme/a": [server("1.0.0"), server("2.0.0")],
            "io.acme/b": server("1.0.0"),
        }))
        .await?;

    let first = services
        .query
        .list_servers(EntryQuery::default(), &PageParams::first_page().with_size(2))
        .await?;
    let cursor = first.next.clone().ok_or_else(|| eyre!("first page needs a cursor"))?;
    let second = services
        .query
        .list_servers(
            EntryQuery::default(),
            &PageParams::first_page().with_size(2).with_next(cursor),
        )
        .await?;

    ensure!(first.items.len() == 2 && second.items.len() == 1);
    let last = second
        .items
        .first()
        .ok_or_else(|| eyre!("second page should hold one item"))?;
    ensure!(last.version.entry.name().as_str() == "io.acme/b");
    Ok(())
}
