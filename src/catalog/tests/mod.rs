//! Service-level tests for the catalog over the in-memory adapters.

mod support;
