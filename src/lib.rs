//! MCP catalog: reconciliation and versioning engine for MCP server and
//! skill registries.
//!
//! The crate keeps a relational catalog of registries, their versioned
//! entries and per-name latest pointers in step with external source
//! snapshots, while leaving records published through the API untouched.
//!
//! # Architecture
//!
//! The catalog follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for storage and source retrieval
//! - **Adapters**: `PostgreSQL` and in-memory implementations of the ports
//! - **Services**: Sync, publishing and query orchestration
//!
//! # Modules
//!
//! - [`catalog`]: Registries, entries, sync runs and the services over them

pub mod catalog;
