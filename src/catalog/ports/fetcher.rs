//! Source fetcher port: retrieves raw snapshot documents for a registry.

use crate::catalog::domain::{Registry, RegistryName};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Result type for source fetcher operations.
pub type SourceFetchResult<T> = Result<T, SourceFetchError>;

/// Retrieves the current snapshot document for a registry.
///
/// Implementations read a mounted file, a cluster config object or a remote
/// endpoint. The document is returned untyped; validation belongs to the
/// reconciliation engine.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetches the snapshot document for `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceFetchError`] when the source cannot be read.
    async fn fetch(&self, registry: &Registry) -> SourceFetchResult<Value>;
}

/// Errors returned by source fetcher adapters.
#[derive(Debug, Clone, Error)]
pub enum SourceFetchError {
    /// No source is configured for the registry.
    #[error("no source configured for registry {0}")]
    NotConfigured(RegistryName),

    /// The source could not be read.
    #[error("source unavailable for registry {registry}: {reason}")]
    Unavailable {
        /// Registry whose source failed.
        registry: RegistryName,
        /// Adapter-supplied reason; may carry sensitive detail.
        reason: String,
    },

    /// Generic adapter failure.
    #[error("source fetch error: {0}")]
    Fetch(Arc<dyn std::error::Error + Send + Sync>),
}

impl SourceFetchError {
    /// Wraps an adapter failure.
    pub fn fetch(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Fetch(Arc::new(err))
    }
}
