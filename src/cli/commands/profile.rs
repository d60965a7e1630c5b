//! Source and target profile commands
//!
//! Profiles are probed before they are saved, so `source add` against a
//! MongoDB that does not answer fails with a client error and stores nothing.

use crate::cli::commands::{open_engine, respond};
use crate::config::secret_string;
use crate::core::engine::Engine;
use crate::domain::profile::{SourceProfile, StampFields, StampOverrides, TargetProfile};
use crate::domain::{Result, TidewaterError};
use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Arguments for the source command
#[derive(Args, Debug)]
pub struct SourceArgs {
    #[command(subcommand)]
    pub command: SourceCommand,
}

#[derive(Subcommand, Debug)]
pub enum SourceCommand {
    /// Register or replace a MongoDB source
    Add(AddSourceArgs),

    /// List registered sources
    List,
}

#[derive(Args, Debug)]
pub struct AddSourceArgs {
    #[arg(long)]
    pub name: String,

    /// MongoDB connection string
    #[arg(long)]
    pub url: String,

    /// Collection pattern to skip (repeatable, `*` wildcards allowed)
    #[arg(long = "ignore")]
    pub ignore: Vec<String>,

    /// Field holding the last update time, tried first
    #[arg(long)]
    pub update_field: Option<String>,

    /// Field holding the insertion time
    #[arg(long)]
    pub insert_field: Option<String>,
}

impl AddSourceArgs {
    pub fn profile(&self) -> SourceProfile {
        SourceProfile {
            name: self.name.trim().to_string(),
            url: secret_string(self.url.clone()),
            ignore: self.ignore.clone(),
            stamps: StampOverrides {
                fields: StampFields {
                    update_field: self.update_field.clone(),
                    insert_field: self.insert_field.clone(),
                },
                ..StampOverrides::default()
            },
        }
    }
}

/// Arguments for the target command
#[derive(Args, Debug)]
pub struct TargetArgs {
    #[command(subcommand)]
    pub command: TargetCommand,
}

#[derive(Subcommand, Debug)]
pub enum TargetCommand {
    /// Register or replace a BigQuery target
    Add(AddTargetArgs),

    /// List registered targets
    List,
}

#[derive(Args, Debug)]
pub struct AddTargetArgs {
    #[arg(long)]
    pub name: String,

    /// Path of the service-account key JSON
    #[arg(long)]
    pub credentials_file: PathBuf,
}

impl AddTargetArgs {
    pub fn profile(&self) -> Result<TargetProfile> {
        let credentials = std::fs::read_to_string(&self.credentials_file).map_err(|e| {
            TidewaterError::BadRequest(format!(
                "cannot read {}: {e}",
                self.credentials_file.display()
            ))
        })?;
        Ok(TargetProfile {
            name: self.name.trim().to_string(),
            credentials: secret_string(credentials),
        })
    }
}

impl SourceArgs {
    /// Execute the source command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let engine = match open_engine(config_path).await {
            Ok(engine) => engine,
            Err(e) => return respond::<()>(Err(e)),
        };
        self.run(&engine).await
    }

    pub async fn run(&self, engine: &Engine) -> anyhow::Result<i32> {
        match &self.command {
            SourceCommand::Add(args) => respond(engine.add_source(args.profile()).await),
            SourceCommand::List => respond(engine.list_sources().await),
        }
    }
}

impl TargetArgs {
    /// Execute the target command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let engine = match open_engine(config_path).await {
            Ok(engine) => engine,
            Err(e) => return respond::<()>(Err(e)),
        };
        self.run(&engine).await
    }

    pub async fn run(&self, engine: &Engine) -> anyhow::Result<i32> {
        match &self.command {
            TargetCommand::Add(args) => match args.profile() {
                Ok(profile) => respond(engine.add_target(profile).await),
                Err(e) => respond::<()>(Err(e)),
            },
            TargetCommand::List => respond(engine.list_targets().await),
        }
    }
}
