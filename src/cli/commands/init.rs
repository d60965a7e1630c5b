//! Init command implementation
//!
//! This module implements the `init` command for generating a sample
//! configuration file.

use clap::Args;
use std::fs;
use std::path::Path;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path where to create the configuration file
    #[arg(short, long, default_value = "tidewater.toml")]
    pub output: String,

    /// Include every section with comments
    #[arg(long)]
    pub with_examples: bool,

    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Execute the init command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        tracing::info!(output = %self.output, "Initializing configuration file");

        if Path::new(&self.output).exists() && !self.force {
            eprintln!("Configuration file already exists: {}", self.output);
            eprintln!("Use --force to overwrite");
            return Ok(2);
        }

        let config_content = if self.with_examples {
            Self::generate_config_with_examples()
        } else {
            Self::generate_minimal_config()
        };

        match fs::write(&self.output, config_content) {
            Ok(_) => {
                println!("Configuration file created: {}", self.output);
                println!();
                println!("Next steps:");
                println!("  1. Edit {} with your settings", self.output);
                println!("  2. Point [storage].url at the shared MongoDB");
                println!("  3. Register profiles: tidewater source add / tidewater target add");
                println!("  4. Validate configuration: tidewater validate-config");
                println!("  5. Start the loops: tidewater monolith");
                Ok(0)
            }
            Err(e) => {
                eprintln!("Failed to write configuration file: {e}");
                Ok(5)
            }
        }
    }

    /// Single-process setup against a local MongoDB
    fn generate_minimal_config() -> String {
        r#"# Tidewater Configuration File
# MongoDB to BigQuery replication

[application]
log_level = "info"
role = "monolith"

[storage]
backend = "mongodb"
url = "mongodb://localhost:27017"
database = "tidewater"

[worker]
name = "worker-1"

[logging]
local_enabled = false
"#
        .to_string()
    }

    /// Every section, with comments
    fn generate_config_with_examples() -> String {
        r#"# Tidewater Configuration File
# MongoDB to BigQuery replication
#
# Values of the form ${VAR} are read from the environment (or a .env file).
# Any key can also be overridden with TIDEWATER_<SECTION>_<KEY>.

# ============================================================================
# Application Settings
# ============================================================================
[application]
# Log level (trace, debug, info, warn, error)
log_level = "info"

# Process role: manager | voter | worker | monolith
# A monolith runs the scheduler and one worker in the same process.
role = "monolith"

# ============================================================================
# Orchestration Store
# ============================================================================
[storage]
# mongodb | memory (memory is only valid for a monolith)
backend = "mongodb"
url = "${TIDEWATER_STORAGE_URL}"
database = "tidewater"
exports_collection = "exports"
tasks_collection = "export_tasks"
sources_collection = "sources"
targets_collection = "targets"

# ============================================================================
# Source Defaults
# ============================================================================
[source]
# Collections never replicated, on top of each source's own list
ignored_collections = ["system.*"]
connect_timeout_ms = 5000

# Candidate change-stamp fields, tried after the source's overrides
[source.stamps]
update_fields = ["updatedAt", "updated_at", "updateDate", "lastModified"]
insert_fields = ["createdAt", "created_at", "createDate", "insertedAt"]

# ============================================================================
# BigQuery
# ============================================================================
[target]
# One dataset per source database: <prefix><database>
dataset_prefix = "raw_mongodb_"
# location = "EU"
job_poll_interval_ms = 1000
job_timeout_seconds = 600
cleanup_attempts = 5
cleanup_delay_ms = 500

# ============================================================================
# Scheduler
# ============================================================================
[scheduler]
tick_interval_ms = 5000
# random | first
selection = "random"

# ============================================================================
# Local Worker
# ============================================================================
[worker]
name = "worker-1"
tick_interval_ms = 5000
# temp_dir = "/var/lib/tidewater/staging"

[worker.retry]
max_attempts = 5
# Delay before attempt n is base_delay_ms * 2^n
base_delay_ms = 2000

# ============================================================================
# Workers the scheduler assigns to
# ============================================================================
# A monolith without entries schedules onto its own worker.
# [[workers]]
# name = "worker-1"
# url = "http://worker-1:8080"
# probe_timeout_ms = 2000

# ============================================================================
# Profiles seeded at startup
# ============================================================================
[[sources]]
name = "s1"
url = "${SOURCE_S1_URL}"
ignore = ["tmp_*"]

[[targets]]
name = "tg1"
credentials = "${TARGET_TG1_CREDENTIALS}"

# ============================================================================
# Logging Configuration
# ============================================================================
[logging]
local_enabled = true
local_path = "/var/log/tidewater"
# daily or size
local_rotation = "daily"
local_max_size_mb = 100
"#
        .to_string()
    }
}
