//! Step definitions for catalog sync scenarios.

pub mod given;
pub mod then;
pub mod when;
pub mod world;
