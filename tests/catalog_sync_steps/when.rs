//! When steps for catalog sync BDD scenarios.

use super::world::{CatalogSyncWorld, run_async};
use mcp_catalog::catalog::domain::RegistryName;
use rstest_bdd_macros::when;
use tokio_util::sync::CancellationToken;

#[when(r#"registry "{registry}" is synced"#)]
fn registry_is_synced(world: &mut CatalogSyncWorld, registry: String) -> Result<(), eyre::Report> {
    let name = RegistryName::new(registry)?;
    world.last_sync = Some(run_async(
        world.engine.sync_registry(&name, &CancellationToken::new()),
    ));
    Ok(())
}
