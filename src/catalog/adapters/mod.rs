//! Adapter implementations for catalog ports.

pub mod memory;
pub mod postgres;
