//! In-memory adapters for catalog ports.

mod fetcher;
mod store;

pub use fetcher::InMemorySourceFetcher;
pub use store::InMemoryCatalogStore;
