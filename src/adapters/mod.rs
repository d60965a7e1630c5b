//! External system integrations for Tidewater.
//!
//! This module provides adapters for integrating with external systems:
//!
//! - [`connectors`] - Source, target and worker-probe traits used by the core
//! - [`database`] - Orchestration store traits and the backend factory
//! - [`mongodb`] - MongoDB orchestration store and replication source
//! - [`bigquery`] - BigQuery REST target
//! - [`workers`] - HTTP health probes of worker processes
//! - [`memory`] - In-process implementations of every seam
//!
//! # Design Pattern
//!
//! Adapters follow the **Adapter Pattern** to isolate external dependencies and
//! enable testing with in-memory implementations. The core only ever holds
//! `Arc<dyn Trait>` handles, so a monolith with the memory backend and a
//! cluster of MongoDB-backed processes run the same orchestration code.
//!
//! ```rust
//! use std::sync::Arc;
//! use tidewater::adapters::database::Stores;
//! use tidewater::adapters::memory::MemoryStore;
//!
//! let stores = Stores::shared(Arc::new(MemoryStore::new()));
//! # let _ = stores;
//! ```

pub mod bigquery;
pub mod connectors;
pub mod database;
pub mod memory;
pub mod mongodb;
pub mod workers;
