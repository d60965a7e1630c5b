//! Orchestration store abstraction
//!
//! This module provides the store traits the core depends on and a factory
//! choosing the backend (MongoDB or in-memory) from configuration.

pub mod factory;
pub mod traits;

pub use factory::{create_stores, Stores};
pub use traits::{ExportStore, ProfileStore, TaskStore};
