//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the Tidewater configuration file without connecting to anything.

use crate::config::{load_config, TidewaterConfig};
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        match load_config(config_path) {
            Ok(config) => {
                println!("Configuration is valid: {config_path}");
                println!();
                print!("{}", summary(&config));
                Ok(0)
            }
            Err(e) => {
                eprintln!("Configuration validation failed");
                eprintln!("   Error: {e}");
                Ok(2)
            }
        }
    }
}

/// Human readable overview; secrets are never printed
fn summary(config: &TidewaterConfig) -> String {
    let endpoints = config.worker_endpoints();
    let workers: Vec<&str> = endpoints.iter().map(|w| w.name.as_str()).collect();
    let mut out = String::new();
    out.push_str("Configuration Summary:\n");
    out.push_str(&format!("  Role: {}\n", config.application.role.as_str()));
    out.push_str(&format!("  Log Level: {}\n", config.application.log_level));
    out.push_str(&format!("  Storage Backend: {:?}\n", config.storage.backend));
    out.push_str(&format!("  Storage Database: {}\n", config.storage.database));
    out.push_str(&format!("  Dataset Prefix: {}\n", config.target.dataset_prefix));
    out.push_str(&format!(
        "  Scheduler: every {} ms, {:?} selection\n",
        config.scheduler.tick_interval_ms, config.scheduler.selection
    ));
    out.push_str(&format!("  Workers: {}\n", workers.join(", ")));
    out.push_str(&format!(
        "  Seeded Profiles: {} sources, {} targets\n",
        config.sources.len(),
        config.targets.len()
    ));
    out
}
