//! Shared doubles for the integration tests.

#![allow(dead_code)] // Not every test binary uses every helper

pub mod builders;
pub mod mock_plugin;
pub mod strategies;

pub use builders::*;
pub use mock_plugin::*;
