//! Configuration management for Tidewater.
//!
//! Tidewater uses TOML configuration files with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `TIDEWATER_<SECTION>_<KEY>` overrides
//! - Default values for optional settings
//! - Validation on load
//!
//! # Example Configuration
//!
//! ```toml
//! [application]
//! log_level = "info"
//! role = "monolith"
//!
//! [storage]
//! backend = "mongodb"
//! url = "${TIDEWATER_STORAGE_URL}"
//!
//! [scheduler]
//! tick_interval_ms = 5000
//!
//! [worker]
//! name = "worker-1"
//!
//! [[workers]]
//! name = "worker-1"
//!
//! [[sources]]
//! name = "s1"
//! url = "${SOURCE_S1_URL}"
//! ignore = ["system.*", "tmp_*"]
//!
//! [[targets]]
//! name = "tg1"
//! credentials = "${TARGET_TG1_CREDENTIALS}"
//! ```
//!
//! ```rust,no_run
//! use tidewater::config::load_config;
//!
//! match load_config("tidewater.toml") {
//!     Ok(config) => println!("{} workers configured", config.workers.len()),
//!     Err(e) => eprintln!("Configuration error: {}", e),
//! }
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

pub use loader::{load_config, parse_config};
pub use schema::{
    ApplicationConfig, LoggingConfig, RetryConfig, Role, SchedulerConfig, SelectionKind,
    SourceConfig, StampDefaults, StorageBackend, StorageConfig, TargetConfig, TidewaterConfig,
    WorkerConfig, WorkerEndpointConfig,
};
pub use secret::{secret_string, SecretString, SecretValue};
