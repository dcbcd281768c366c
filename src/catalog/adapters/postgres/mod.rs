//! `PostgreSQL` adapter for the catalog store.

mod models;
mod schema;
mod store;
mod transaction;

pub use store::{CatalogPgPool, PostgresCatalogStore};
