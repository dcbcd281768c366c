//! Catalog of MCP servers and skills reconciled from external sources.
//!
//! Registries are synced from their sources by the
//! [`services::ReconciliationEngine`], published to directly through the
//! [`services::CatalogAdminService`], and read through the
//! [`services::CatalogQueryService`]. The module follows hexagonal
//! architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]
//! - Runtime settings in [`config`]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
