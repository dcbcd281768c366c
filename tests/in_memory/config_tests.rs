//! Loading catalog configuration from disk.

use camino::Utf8PathBuf;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use mcp_catalog::catalog::config::{CatalogConfig, CatalogConfigError};
use rstest::{fixture, rstest};
use uuid::Uuid;

/// Scratch directory under the system temp dir, removed on drop.
struct ScratchDir {
    root: Dir,
    name: String,
    path: Utf8PathBuf,
}

impl ScratchDir {
    fn write(&self, file: &str, contents: &str) -> Utf8PathBuf {
        self.root
            .open_dir(&self.name)
            .expect("scratch dir should open")
            .write(file, contents)
            .expect("config should be written");
        self.path.join(file)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.root.remove_dir_all(&self.name).is_err() {
            tracing::warn!(dir = %self.path, "failed to remove scratch config dir");
        }
    }
}

#[fixture]
fn scratch() -> ScratchDir {
    let temp = Utf8PathBuf::try_from(std::env::temp_dir()).expect("temp dir should be UTF-8");
    let root = Dir::open_ambient_dir(&temp, ambient_authority()).expect("temp dir should open");
    let name = format!("mcp-catalog-config-{}", Uuid::new_v4());
    root.create_dir(&name).expect("scratch dir should be created");
    ScratchDir {
        path: temp.join(&name),
        root,
        name,
    }
}

#[rstest]
fn file_values_override_defaults(scratch: ScratchDir) {
    let path = scratch.write(
        "catalog.toml",
        r"
max_page_size = 100

[sync]
retry_backoff_ms = 250
max_concurrent_syncs = 8
",
    );

    let config = CatalogConfig::from_toml_file(&path).expect("config should load");

    assert_eq!(config.max_page_size, 100);
    assert_eq!(config.default_page_size, CatalogConfig::default().default_page_size);
    assert_eq!(config.sync.retry_backoff_ms, 250);
    assert_eq!(config.sync.max_concurrent_syncs, 8);
    assert_eq!(config.sync.interval_secs, 300);
}

#[rstest]
fn out_of_range_values_are_rejected(scratch: ScratchDir) {
    let path = scratch.write("catalog.toml", "default_page_size = 80\nmax_page_size = 20\n");

    let result = CatalogConfig::from_toml_file(&path);

    assert!(
        matches!(result, Err(CatalogConfigError::Invalid(ref message)) if message.contains("max_page_size"))
    );
}

#[rstest]
fn unknown_keys_are_rejected(scratch: ScratchDir) {
    let path = scratch.write("catalog.toml", "[sync]\nparallelism = 3\n");

    let result = CatalogConfig::from_toml_file(&path);

    assert!(matches!(result, Err(CatalogConfigError::Parse(_))));
}

#[rstest]
fn missing_files_report_the_path(scratch: ScratchDir) {
    let path = scratch.path.join("absent.toml");

    let result = CatalogConfig::from_toml_file(&path);

    assert!(matches!(
        result,
        Err(CatalogConfigError::Io { path: ref reported, .. }) if reported.ends_with("absent.toml")
    ));
}
