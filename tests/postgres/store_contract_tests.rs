//! Store contract run against `PostgreSQL`.

use super::helpers::{PgCatalog, pg_catalog};
use crate::store_contract;
use eyre::Result;
use rstest::rstest;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn registry_names_are_unique(pg_catalog: Result<PgCatalog>) -> Result<()> {
    store_contract::registry_names_are_unique(&pg_catalog?.store).await
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn entry_versions_are_unique(pg_catalog: Result<PgCatalog>) -> Result<()> {
    store_contract::entry_versions_are_unique(&pg_catalog?.store).await
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn api_registries_survive_bulk_operations(pg_catalog: Result<PgCatalog>) -> Result<()> {
    store_contract::api_registries_survive_bulk_operations(&pg_catalog?.store).await
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn children_require_a_version_row(pg_catalog: Result<PgCatalog>) -> Result<()> {
    store_contract::children_require_a_version_row(&pg_catalog?.store).await
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn remotes_are_unique_and_icons_upsert(pg_catalog: Result<PgCatalog>) -> Result<()> {
    store_contract::remotes_are_unique_and_icons_upsert(&pg_catalog?.store).await
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn latest_pointers_are_referential_and_idempotent(
    pg_catalog: Result<PgCatalog>,
) -> Result<()> {
    store_contract::latest_pointers_are_referential_and_idempotent(&pg_catalog?.store).await
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_writes_roll_back(pg_catalog: Result<PgCatalog>) -> Result<()> {
    store_contract::failed_writes_roll_back(&pg_catalog?.store).await
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn sync_runs_close_once_and_stale_runs_sweep(pg_catalog: Result<PgCatalog>) -> Result<()> {
    store_contract::sync_runs_close_once_and_stale_runs_sweep(&pg_catalog?.store).await
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn skill_sync_writes_are_idempotent(pg_catalog: Result<PgCatalog>) -> Result<()> {
    store_contract::skill_sync_writes_are_idempotent(&pg_catalog?.store).await
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn packages_round_trip(pg_catalog: Result<PgCatalog>) -> Result<()> {
    store_contract::packages_round_trip(&pg_catalog?.store).await
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn config_upserts_leave_api_registries_untouched(
    pg_catalog: Result<PgCatalog>,
) -> Result<()> {
    store_contract::config_upserts_leave_api_registries_untouched(&pg_catalog?.store).await
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_cascades_roll_back(pg_catalog: Result<PgCatalog>) -> Result<()> {
    store_contract::failed_cascades_roll_back(&pg_catalog?.store).await
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn reads_cannot_write(pg_catalog: Result<PgCatalog>) -> Result<()> {
    store_contract::reads_cannot_write(&pg_catalog?.store).await
}
