//! End-to-end catalog flows over the in-memory adapters.

use super::helpers::{CatalogHarness, harness, server_version, skill_version};
use mcp_catalog::catalog::{
    domain::{CreationType, IconTheme, PageParams, ServerPayload, SkillStatus, SyncStatus},
    services::{CreateRegistryRequest, EntryQuery, PublishTarget},
};
use rstest::rstest;
use serde_json::json;
use tokio_util::sync::CancellationToken;

const REGISTRY: &str = "toolhive";
const CURATED: &str = "curated";

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn synced_servers_keep_every_declared_field(harness: CatalogHarness) {
    harness.declare(&[REGISTRY]).await;
    harness
        .sync(REGISTRY, json!({"io.acme/weather": server_version("1.2.0", true)}))
        .await;

    let detail = harness
        .query
        .get_server_version("io.acme/weather", "latest", Some(REGISTRY))
        .await
        .expect("latest should resolve");

    assert_eq!(detail.version.entry.title(), Some("Weather 1.2.0"));
    assert_eq!(detail.version.entry.creation_type(), CreationType::Config);
    assert_eq!(
        detail.version.details.website_url.as_deref(),
        Some("https://weather.acme.test")
    );
    let repository = detail
        .version
        .details
        .repository
        .as_ref()
        .expect("repository should be stored");
    assert_eq!(repository.source.as_deref(), Some("github"));
    let meta = detail
        .version
        .details
        .server_meta
        .as_ref()
        .expect("server meta should be stored")
        .to_json()
        .expect("meta should be JSON");
    assert_eq!(meta, json!({"publisher": {"verified": true}}));

    let package = detail.packages.first().expect("one package");
    assert_eq!(package.runtime_arguments, vec!["--port", "8080"]);
    assert_eq!(package.transport.url.as_deref(), Some("http://localhost:8080/mcp"));
    let variable = package
        .environment_variables
        .first()
        .expect("one environment variable");
    assert!(variable.is_secret);
    let remote = detail.remotes.first().expect("one remote");
    assert_eq!(remote.url, "https://weather.acme.test/1.2.0/sse");
    assert_eq!(remote.headers.len(), 1);
    let icon = detail.icons.first().expect("one icon");
    assert_eq!(icon.theme, IconTheme::Light);
    assert_eq!(icon.sizes, vec!["64x64"]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn skills_sync_alongside_servers(harness: CatalogHarness) {
    harness.declare(&[REGISTRY]).await;
    let report = harness
        .sync(
            REGISTRY,
            json!({
                "io.acme/weather": server_version("1.0.0", true),
                "acme/review": [skill_version("0.1.0"), skill_version("0.2.0")],
            }),
        )
        .await;

    assert_eq!(report.entries_written, 3);
    assert_eq!(report.latest_pointers, 2);
    let skills = harness
        .query
        .list_skills(EntryQuery::default(), &PageParams::first_page())
        .await
        .expect("skills should list");
    assert_eq!(skills.items.len(), 2);
    let latest = harness
        .query
        .get_skill_version("acme/review", "latest", None)
        .await
        .expect("latest skill should resolve");
    assert_eq!(latest.version.entry.version().as_str(), "0.2.0");
    assert_eq!(latest.version.details.status, SkillStatus::Active);
    assert_eq!(
        latest
            .git_packages
            .first()
            .and_then(|package| package.git_ref.as_deref()),
        Some("0.2.0")
    );
    let servers = harness
        .query
        .list_servers(EntryQuery::default(), &PageParams::first_page())
        .await
        .expect("servers should list");
    assert_eq!(servers.items.len(), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn sync_converges_while_protecting_published_entries(harness: CatalogHarness) {
    harness.declare(&[REGISTRY]).await;
    harness
        .admin
        .create_registry(CreateRegistryRequest::new(CURATED))
        .await
        .expect("API registry should be created");
    harness
        .sync(
            REGISTRY,
            json!({
                "io.acme/a": server_version("1.0.0", true),
                "io.acme/b": server_version("1.0.0", true),
            }),
        )
        .await;
    let published = harness
        .admin
        .publish_server(
            PublishTarget::new(CURATED, "io.acme/c", "1.0.0").as_latest(),
            ServerPayload::default(),
        )
        .await
        .expect("publish should succeed");

    let report = harness
        .sync(
            REGISTRY,
            json!({"io.acme/a": [server_version("1.0.0", false), server_version("2.0.0", true)]}),
        )
        .await;

    assert_eq!(report.orphans_deleted, 1);
    let names: Vec<String> = harness
        .query
        .list_servers(EntryQuery::default(), &PageParams::first_page())
        .await
        .expect("servers should list")
        .items
        .iter()
        .map(|detail| {
            format!(
                "{}@{}",
                detail.version.entry.name(),
                detail.version.entry.version()
            )
        })
        .collect();
    assert_eq!(names, vec!["io.acme/a@1.0.0", "io.acme/a@2.0.0", "io.acme/c@1.0.0"]);

    let latest_a = harness
        .query
        .get_server_version("io.acme/a", "latest", None)
        .await
        .expect("latest should resolve");
    assert_eq!(latest_a.version.entry.version().as_str(), "2.0.0");

    harness.declare(&[]).await;

    let still_published = harness
        .query
        .get_server_version("io.acme/c", "latest", None)
        .await
        .expect("published latest should remain");
    assert_eq!(still_published, published);
    let dropped = harness
        .query
        .get_server_version("io.acme/a", "latest", None)
        .await;
    assert!(matches!(dropped, Err(ref err) if err.is_not_found()));
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(3)]
#[case(7)]
#[tokio::test(flavor = "multi_thread")]
async fn pages_concatenate_to_the_full_listing(harness: CatalogHarness, #[case] size: usize) {
    harness.declare(&[REGISTRY, "mirror"]).await;
    harness
        .sync(
            REGISTRY,
            json!({
                "io.acme/a": [server_version("1.0.0", false), server_version("1.1.0", true)],
                "io.acme/c": server_version("0.1.0", true),
            }),
        )
        .await;
    harness
        .sync(
            "mirror",
            json!({"io.acme/b": [server_version("3.0.0", true), server_version("3.0.1", false)]}),
        )
        .await;

    let full = harness
        .query
        .list_servers(EntryQuery::default(), &PageParams::first_page())
        .await
        .expect("full listing should load")
        .items;
    let mut collected = Vec::new();
    let mut params = PageParams::first_page().with_size(size);
    loop {
        let page = harness
            .query
            .list_servers(EntryQuery::default(), &params)
            .await
            .expect("page should load");
        if page.items.is_empty() {
            break;
        }
        assert!(page.items.len() <= size);
        let cursor = page.next.clone().expect("non-empty page has a cursor");
        collected.extend(page.items);
        params = PageParams::first_page().with_size(size).with_next(cursor);
    }

    assert_eq!(full.len(), 5);
    assert_eq!(collected, full);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn coordinator_pass_syncs_every_registry(harness: CatalogHarness) {
    harness.declare(&[REGISTRY, "mirror"]).await;
    harness.serve(REGISTRY, json!({"io.acme/a": server_version("1.0.0", true)}));
    harness.serve("mirror", json!({"acme/review": skill_version("0.1.0")}));

    let report = harness
        .coordinator()
        .run_once(&CancellationToken::new())
        .await
        .expect("pass should finish");

    assert_eq!(report.completed.len(), 2);
    assert!(report.failed.is_empty());
    for registry in [REGISTRY, "mirror"] {
        let runs = harness
            .query
            .list_registry_syncs(registry, 5)
            .await
            .expect("runs should load");
        assert_eq!(
            runs.iter().map(|run| run.status()).collect::<Vec<_>>(),
            vec![SyncStatus::Completed]
        );
    }
}
