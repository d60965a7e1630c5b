// Tidewater - MongoDB to BigQuery replication
// Copyright (c) 2025 Tidewater Contributors
// Licensed under the MIT License

//! # Tidewater - MongoDB to BigQuery replication
//!
//! Tidewater copies the documents of MongoDB databases into BigQuery, one
//! export per (source, target, database) and one task per collection, spread
//! over a pool of workers that share a MongoDB orchestration store.
//!
//! ## Overview
//!
//! This library provides the core functionality for:
//! - **Orchestrating** exports and tasks through guarded state machines
//! - **Scheduling** tasks onto healthy, idle workers
//! - **Extracting** the documents changed within a time window
//! - **Consolidating** them into append-only BigQuery tables without duplicates
//!
//! ## Architecture
//!
//! Tidewater follows a layered architecture:
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Business logic (state machines, scheduler, worker, ingestion)
//! - [`adapters`] - External integrations (MongoDB, BigQuery, worker probes)
//! - [`domain`] - Core domain types and models
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging and observability
//!
//! ## Process roles
//!
//! A **manager** answers export commands, a **voter** assigns tasks and
//! settles exports, a **worker** executes the tasks assigned to it and a
//! **monolith** does all three. Every role talks to the same store, so any
//! number of workers can be added by pointing them at it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tidewater::config::load_config;
//! use tidewater::core::engine::Engine;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("tidewater.toml")?;
//!     let engine = Engine::from_config(config).await?;
//!
//!     let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!     let voter = engine.voter()?;
//!     voter.run(shutdown_rx).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Tidewater uses the [`domain::TidewaterError`] type for all errors. Client
//! errors (bad input, unknown records, illegal transitions, wrong role) are
//! told apart from infrastructure failures with
//! [`domain::TidewaterError::is_client_error`].
//!
//! ## Logging
//!
//! Tidewater uses structured logging with the `tracing` crate; transitions,
//! retries and swallowed errors go through the macros in [`logging`].

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
