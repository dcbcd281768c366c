//! Then steps for catalog sync BDD scenarios.

use super::world::{CatalogSyncWorld, run_async};
use mcp_catalog::catalog::domain::SyncStatus;
use rstest_bdd_macros::then;

#[then(r#"the last sync run of "{registry}" is "{status}""#)]
fn last_run_has_status(
    world: &CatalogSyncWorld,
    registry: String,
    status: String,
) -> Result<(), eyre::Report> {
    let expected = SyncStatus::try_from(status.as_str())
        .map_err(|err| eyre::eyre!("invalid expected status in scenario: {err}"))?;
    let run = world.last_run(&registry)?;
    if run.status() != expected {
        return Err(eyre::eyre!("expected {expected}, found {}", run.status()));
    }
    Ok(())
}

#[then(r#"the latest version of "{name}" is "{version}""#)]
fn latest_version_is(
    world: &CatalogSyncWorld,
    name: String,
    version: String,
) -> Result<(), eyre::Report> {
    let latest = run_async(world.query.get_server_version(&name, "latest", None))?;
    let found = latest.version.entry.version().as_str();
    if found != version {
        return Err(eyre::eyre!("expected latest {name}@{version}, found {found}"));
    }
    Ok(())
}

#[then(r#"server "{name}" is not in the catalog"#)]
fn server_is_absent(world: &CatalogSyncWorld, name: String) -> Result<(), eyre::Report> {
    match run_async(world.query.get_server_version(&name, "latest", None)) {
        Err(err) if err.is_not_found() => Ok(()),
        other => Err(eyre::eyre!("expected {name} to be gone, got {other:?}")),
    }
}

#[then("the sync deleted {count:u64} orphaned entries")]
fn sync_deleted_orphans(world: &CatalogSyncWorld, count: u64) -> Result<(), eyre::Report> {
    let report = world
        .last_sync
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing sync result"))?
        .as_ref()
        .map_err(|err| eyre::eyre!("sync failed: {err}"))?;
    if report.orphans_deleted != count {
        return Err(eyre::eyre!(
            "expected {count} orphans deleted, found {}",
            report.orphans_deleted
        ));
    }
    Ok(())
}

#[then(r#"the sync fails with "{summary}""#)]
fn sync_fails_with(world: &CatalogSyncWorld, summary: String) -> Result<(), eyre::Report> {
    match world.last_sync.as_ref() {
        Some(Err(err)) if err.sanitized_summary() == summary => Ok(()),
        other => Err(eyre::eyre!("expected failure '{summary}', got {other:?}")),
    }
}

#[then(r#"no sync run of "{registry}" mentions "{secret}""#)]
fn no_run_mentions(
    world: &CatalogSyncWorld,
    registry: String,
    secret: String,
) -> Result<(), eyre::Report> {
    let runs = run_async(world.query.list_registry_syncs(&registry, 50))?;
    if let Some(leaky) = runs
        .iter()
        .find(|run| run.error_msg().is_some_and(|msg| msg.contains(&secret)))
    {
        return Err(eyre::eyre!("sync run {} leaks '{secret}'", leaky.id()));
    }
    Ok(())
}
