//! Store contract checks against the in-memory adapter.

use crate::store_contract;
use mcp_catalog::catalog::adapters::memory::InMemoryCatalogStore;
use rstest::{fixture, rstest};

#[fixture]
fn store() -> InMemoryCatalogStore {
    InMemoryCatalogStore::new()
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn registry_names_are_unique(store: InMemoryCatalogStore) -> eyre::Result<()> {
    store_contract::registry_names_are_unique(&store).await
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn entry_versions_are_unique(store: InMemoryCatalogStore) -> eyre::Result<()> {
    store_contract::entry_versions_are_unique(&store).await
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn api_registries_survive_bulk_operations(store: InMemoryCatalogStore) -> eyre::Result<()> {
    store_contract::api_registries_survive_bulk_operations(&store).await
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn children_require_a_version_row(store: InMemoryCatalogStore) -> eyre::Result<()> {
    store_contract::children_require_a_version_row(&store).await
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn remotes_are_unique_and_icons_upsert(store: InMemoryCatalogStore) -> eyre::Result<()> {
    store_contract::remotes_are_unique_and_icons_upsert(&store).await
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn latest_pointers_are_referential_and_idempotent(
    store: InMemoryCatalogStore,
) -> eyre::Result<()> {
    store_contract::latest_pointers_are_referential_and_idempotent(&store).await
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_writes_roll_back(store: InMemoryCatalogStore) -> eyre::Result<()> {
    store_contract::failed_writes_roll_back(&store).await
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn sync_runs_close_once_and_stale_runs_sweep(
    store: InMemoryCatalogStore,
) -> eyre::Result<()> {
    store_contract::sync_runs_close_once_and_stale_runs_sweep(&store).await
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn skill_sync_writes_are_idempotent(store: InMemoryCatalogStore) -> eyre::Result<()> {
    store_contract::skill_sync_writes_are_idempotent(&store).await
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn packages_round_trip(store: InMemoryCatalogStore) -> eyre::Result<()> {
    store_contract::packages_round_trip(&store).await
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn config_upserts_leave_api_registries_untouched(
    store: InMemoryCatalogStore,
) -> eyre::Result<()> {
    store_contract::config_upserts_leave_api_registries_untouched(&store).await
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_cascades_roll_back(store: InMemoryCatalogStore) -> eyre::Result<()> {
    store_contract::failed_cascades_roll_back(&store).await
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn reads_cannot_write(store: InMemoryCatalogStore) -> eyre::Result<()> {
    store_contract::reads_cannot_write(&store).await
}
