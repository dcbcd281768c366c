//! Runtime configuration for the catalog services.
//!
//! Configuration is read from TOML. Every key has a default, so an empty
//! document is a valid configuration:
//!
//! ```toml
//! max_metadata_bytes = 262144
//! default_page_size = 50
//! max_page_size = 500
//!
//! [sync]
//! transient_retry_attempts = 3
//! retry_backoff_ms = 100
//! stale_after_secs = 1800
//! interval_secs = 300
//! max_concurrent_syncs = 4
//! ```

use camino::Utf8Path;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_MAX_METADATA_BYTES: usize = 256 * 1024;
const DEFAULT_PAGE_SIZE: usize = 50;
const DEFAULT_MAX_PAGE_SIZE: usize = 500;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 100;
const DEFAULT_STALE_AFTER_SECS: u64 = 30 * 60;
const MAX_STALE_AFTER_SECS: u64 = 365 * 24 * 60 * 60;
const DEFAULT_INTERVAL_SECS: u64 = 5 * 60;
const DEFAULT_MAX_CONCURRENT_SYNCS: usize = 4;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum CatalogConfigError {
    /// The TOML document could not be parsed.
    #[error("invalid catalog configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration file could not be read.
    #[error("failed to read catalog configuration {path}: {source}")]
    Io {
        /// File that failed to load.
        path: String,
        /// Underlying filesystem error.
        source: std::io::Error,
    },

    /// A value is out of range.
    #[error("invalid catalog configuration: {0}")]
    Invalid(String),
}

/// Top-level catalog configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogConfig {
    /// Cap on any serialized metadata blob, in bytes.
    pub max_metadata_bytes: usize,
    /// Page size used when a caller does not supply one.
    pub default_page_size: usize,
    /// Largest page size honoured; larger requests are clamped.
    pub max_page_size: usize,
    /// Background sync settings.
    pub sync: SyncConfig,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            max_metadata_bytes: DEFAULT_MAX_METADATA_BYTES,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            sync: SyncConfig::default(),
        }
    }
}

/// Settings for reconciliation runs and the coordinator loop.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Extra attempts made when the apply step fails transiently.
    pub transient_retry_attempts: u32,
    /// Linear backoff base between retries, in milliseconds.
    pub retry_backoff_ms: u64,
    /// Age after which an `IN_PROGRESS` run is considered abandoned. At
    /// most one year.
    pub stale_after_secs: u64,
    /// Period of the coordinator loop.
    pub interval_secs: u64,
    /// Registries synced in parallel during one coordinator pass.
    pub max_concurrent_syncs: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            transient_retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            stale_after_secs: DEFAULT_STALE_AFTER_SECS,
            interval_secs: DEFAULT_INTERVAL_SECS,
            max_concurrent_syncs: DEFAULT_MAX_CONCURRENT_SYNCS,
        }
    }
}

impl SyncConfig {
    /// Returns the retry backoff base.
    #[must_use]
    pub const fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Returns the stale-run threshold.
    #[must_use]
    pub const fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    /// Returns the coordinator period.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl CatalogConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogConfigError::Parse`] for malformed TOML or unknown
    /// keys, and [`CatalogConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(document: &str) -> Result<Self, CatalogConfigError> {
        let config: Self = toml::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogConfigError::Io`] when the file cannot be read, plus
    /// the failures of [`Self::from_toml_str`].
    pub fn from_toml_file(path: &Utf8Path) -> Result<Self, CatalogConfigError> {
        let io_error = |source| CatalogConfigError::Io {
            path: path.to_string(),
            source,
        };
        let file_name = path.file_name().ok_or_else(|| {
            io_error(std::io::Error::other("path must include a file name"))
        })?;
        let parent = path
            .parent()
            .filter(|dir| !dir.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(io_error)?;
        let document = dir.read_to_string(file_name).map_err(io_error)?;
        Self::from_toml_str(&document)
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogConfigError::Invalid`] naming the first offending
    /// key.
    pub fn validate(&self) -> Result<(), CatalogConfigError> {
        let checks = [
            (self.max_metadata_bytes == 0, "max_metadata_bytes must be positive"),
            (self.default_page_size == 0, "default_page_size must be positive"),
            (
                self.max_page_size < self.default_page_size,
                "max_page_size must not be below default_page_size",
            ),
            (self.sync.stale_after_secs == 0, "sync.stale_after_secs must be positive"),
            (
                self.sync.stale_after_secs > MAX_STALE_AFTER_SECS,
                "sync.stale_after_secs must not exceed one year",
            ),
            (self.sync.interval_secs == 0, "sync.interval_secs must be positive"),
            (
                self.sync.max_concurrent_syncs == 0,
                "sync.max_concurrent_syncs must be positive",
            ),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(CatalogConfigError::Invalid((*message).to_owned())),
            None => Ok(()),
        }
    }
}
