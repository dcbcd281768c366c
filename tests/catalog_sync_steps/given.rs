//! Given steps for catalog sync BDD scenarios.

use super::world::{CatalogSyncWorld, run_async};
use eyre::WrapErr;
use mcp_catalog::catalog::{
    domain::{DeclaredRegistry, RegistryName, RegistryType, ServerPayload},
    services::{CreateRegistryRequest, PublishTarget},
};
use rstest_bdd_macros::given;
use tokio_util::sync::CancellationToken;

#[given(r#"a declared registry "{registry}""#)]
fn declared_registry(world: &mut CatalogSyncWorld, registry: String) -> Result<(), eyre::Report> {
    let declared = DeclaredRegistry::new(RegistryName::new(registry.as_str())?, RegistryType::File);
    run_async(world.engine.reconcile_registries(&[declared]))
        .wrap_err("declare registry for sync scenario")?;
    world.sources.entry(registry).or_default();
    Ok(())
}

#[given(r#"the source of "{registry}" lists server "{name}" versions "{versions}""#)]
fn source_lists_server(
    world: &mut CatalogSyncWorld,
    registry: String,
    name: String,
    versions: String,
) -> Result<(), eyre::Report> {
    let listed = versions.split(',').map(|version| version.trim().to_owned()).collect();
    world
        .sources
        .entry(registry.clone())
        .or_default()
        .insert(name, listed);
    world.publish_source(&registry)
}

#[given(r#"the source of "{registry}" drops server "{name}""#)]
fn source_drops_server(
    world: &mut CatalogSyncWorld,
    registry: String,
    name: String,
) -> Result<(), eyre::Report> {
    let listing = world
        .sources
        .get_mut(&registry)
        .ok_or_else(|| eyre::eyre!("registry {registry} has no source listing"))?;
    if listing.remove(&name).is_none() {
        return Err(eyre::eyre!("source of {registry} does not list {name}"));
    }
    world.publish_source(&registry)
}

#[given(r#"the source of "{registry}" is unreachable with "{detail}""#)]
fn source_is_unreachable(
    world: &mut CatalogSyncWorld,
    registry: String,
    detail: String,
) -> Result<(), eyre::Report> {
    world
        .fetcher
        .set_failure(RegistryName::new(registry)?, detail)?;
    Ok(())
}

#[given(r#"registry "{registry}" has been synced"#)]
fn registry_has_been_synced(
    world: &mut CatalogSyncWorld,
    registry: String,
) -> Result<(), eyre::Report> {
    let name = RegistryName::new(registry)?;
    run_async(world.engine.sync_registry(&name, &CancellationToken::new()))
        .wrap_err("initial sync in scenario setup")?;
    Ok(())
}

#[given(r#"an API registry "{registry}""#)]
fn api_registry(world: &mut CatalogSyncWorld, registry: String) -> Result<(), eyre::Report> {
    run_async(world.admin.create_registry(CreateRegistryRequest::new(registry)))
        .wrap_err("create API registry in scenario setup")?;
    Ok(())
}

#[given(r#"server "{name}" version "{version}" was published to "{registry}""#)]
fn server_was_published(
    world: &mut CatalogSyncWorld,
    name: String,
    version: String,
    registry: String,
) -> Result<(), eyre::Report> {
    run_async(world.admin.publish_server(
        PublishTarget::new(registry, name, version).as_latest(),
        ServerPayload::default(),
    ))
    .wrap_err("publish server in scenario setup")?;
    Ok(())
}
