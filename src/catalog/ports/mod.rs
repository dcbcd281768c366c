//! Port contracts for catalog persistence and source retrieval.

mod fetcher;
mod store;

#[cfg(test)]
pub use fetcher::MockSourceFetcher;
pub use fetcher::{SourceFetchError, SourceFetchResult, SourceFetcher};
pub use store::{CatalogStore, CatalogStoreError, CatalogStoreResult, CatalogTransaction};
