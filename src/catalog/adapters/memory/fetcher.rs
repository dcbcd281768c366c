//! In-memory source fetcher for tests and embedders.

use crate::catalog::{
    domain::{Registry, RegistryName},
    ports::{SourceFetchError, SourceFetchResult, SourceFetcher},
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Source fetcher serving documents held in memory.
///
/// Each registry name maps to either a document or a failure reason.
/// Replacing a document between syncs models a source that changed upstream.
#[derive(Debug, Clone, Default)]
pub struct InMemorySourceFetcher {
    state: Arc<RwLock<InMemorySourceState>>,
}

#[derive(Debug, Default)]
struct InMemorySourceState {
    documents: HashMap<RegistryName, Value>,
    failures: HashMap<RegistryName, String>,
    fetch_counts: HashMap<RegistryName, usize>,
}

impl InMemorySourceFetcher {
    /// Creates a fetcher with no sources.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `document` for `registry`, clearing any configured failure.
    ///
    /// # Errors
    ///
    /// Returns [`SourceFetchError::Fetch`] when lock acquisition fails.
    pub fn set_document(&self, registry: RegistryName, document: Value) -> SourceFetchResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        state.failures.remove(&registry);
        state.documents.insert(registry, document);
        Ok(())
    }

    /// Makes fetches for `registry` fail with `reason`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceFetchError::Fetch`] when lock acquisition fails.
    pub fn set_failure(
        &self,
        registry: RegistryName,
        reason: impl Into<String>,
    ) -> SourceFetchResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        state.failures.insert(registry, reason.into());
        Ok(())
    }

    /// Returns how many fetches were attempted for `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceFetchError::Fetch`] when lock acquisition fails.
    pub fn fetch_count(&self, registry: &RegistryName) -> SourceFetchResult<usize> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(state.fetch_counts.get(registry).copied().unwrap_or_default())
    }
}

fn lock_error(err: impl std::fmt::Display) -> SourceFetchError {
    SourceFetchError::fetch(std::io::Error::other(err.to_string()))
}

#[async_trait]
impl SourceFetcher for InMemorySourceFetcher {
    async fn fetch(&self, registry: &Registry) -> SourceFetchResult<Value> {
        let mut state = self.state.write().map_err(lock_error)?;
        *state
            .fetch_counts
            .entry(registry.name().clone())
            .or_default() += 1;

        if let Some(reason) = state.failures.get(registry.name()) {
            return Err(SourceFetchError::Unavailable {
                registry: registry.name().clone(),
                reason: reason.clone(),
            });
        }

        state
            .documents
            .get(registry.name())
            .cloned()
            .ok_or_else(|| SourceFetchError::NotConfigured(registry.name().clone()))
    }
}
