//! Core business logic for Tidewater.
//!
//! This module contains the orchestration of exports: the state machines, the
//! scheduler, the worker and the ingestion pipeline.
//!
//! # Modules
//!
//! - [`export`] - Export state machine and manager-side commands
//! - [`task`] - Per-collection task state machine, claims and fan-out
//! - [`scheduler`] - The voter loop assigning tasks and settling exports
//! - [`worker`] - The executor loop running claimed tasks with retries
//! - [`ingest`] - Staging rows, NDJSON files and consolidation
//! - [`stamp`] - Change-stamp resolution and collection ignore patterns
//! - [`saga`] - Compensations for multi-record writes
//! - [`engine`] - Wiring of all of the above for one process role
//!
//! # Export Workflow
//!
//! 1. **Create**: the manager validates the profiles, probes both ends and
//!    writes the export plus one task per collection
//! 2. **Assign**: the voter hands the oldest unassigned task to a free worker
//! 3. **Execute**: the worker computes the window, stages the documents and
//!    consolidates them into the collection's main table
//! 4. **Settle**: once no task is active the voter finishes or errors the export
//!
//! # Example
//!
//! ```rust,no_run
//! use tidewater::config::load_config;
//! use tidewater::core::engine::Engine;
//! use tidewater::domain::ExportKey;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("tidewater.toml")?;
//! let engine = Engine::from_config(config).await?;
//!
//! let key = ExportKey::generate("s1", "tg1", "shop")?;
//! let export = engine.exports()?.create(&key).await?;
//! println!("Created export {}", export.key.transaction);
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod export;
pub mod ingest;
pub mod saga;
pub mod scheduler;
pub mod stamp;
pub mod task;
pub mod worker;
