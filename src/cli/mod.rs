//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for Tidewater using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// Tidewater - MongoDB to BigQuery replication
#[derive(Parser, Debug)]
#[command(name = "tidewater")]
#[command(version, about, long_about = None)]
#[command(author = "Tidewater Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "tidewater.toml", env = "TIDEWATER_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "TIDEWATER_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create and control exports
    Export(commands::export::ExportArgs),

    /// Inspect export tasks
    Task(commands::task::TaskArgs),

    /// Manage MongoDB source profiles
    Source(commands::profile::SourceArgs),

    /// Manage BigQuery target profiles
    Target(commands::profile::TargetArgs),

    /// Run the scheduler loop
    Voter(commands::run::VoterArgs),

    /// Run the worker loop
    Worker(commands::run::WorkerArgs),

    /// Run the scheduler and a worker in one process
    Monolith(commands::run::MonolithArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}

impl Commands {
    /// Loops that run until a shutdown signal, as opposed to one-shot commands
    pub fn is_long_running(&self) -> bool {
        matches!(
            self,
            Commands::Voter(_) | Commands::Worker(_) | Commands::Monolith(_)
        )
    }
}
