//! Export command implementation
//!
//! This module implements the `export` subcommands a manager serves:
//! create, stop, retry, play, check and list.

use crate::cli::commands::{open_engine, respond};
use crate::core::engine::Engine;
use crate::domain::export::Export;
use crate::domain::ids::{ExportKey, Transaction};
use crate::domain::query::ExportFilter;
use crate::domain::response::{ListResponse, TransactionResponse};
use crate::domain::status::Status;
use crate::domain::Result;
use clap::{Args, Subcommand};
use serde::Serialize;

/// Arguments for the export command
#[derive(Args, Debug)]
pub struct ExportArgs {
    #[command(subcommand)]
    pub command: ExportCommand,
}

#[derive(Subcommand, Debug)]
pub enum ExportCommand {
    /// Create an export and one task per collection
    Create(CreateArgs),

    /// Stop an export and its pending tasks
    Stop(KeyArgs),

    /// Re-queue an errored (or, with --force, stopped) export
    Retry(RetryArgs),

    /// Resume a stopped export
    Play(KeyArgs),

    /// Show the status of an export
    Check(KeyArgs),

    /// List exports
    List(ExportListArgs),
}

/// Identity of an existing export
#[derive(Args, Debug, Clone)]
pub struct KeyArgs {
    #[arg(long)]
    pub transaction: String,

    #[arg(long)]
    pub source: String,

    #[arg(long)]
    pub target: String,

    #[arg(long)]
    pub database: String,
}

impl KeyArgs {
    pub fn key(&self) -> Result<ExportKey> {
        ExportKey::new(&self.transaction, &self.source, &self.target, &self.database)
    }
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Transaction id (UUID); generated when omitted
    #[arg(long)]
    pub transaction: Option<String>,

    #[arg(long)]
    pub source: String,

    #[arg(long)]
    pub target: String,

    /// Source database to replicate
    #[arg(long)]
    pub database: String,
}

impl CreateArgs {
    pub fn key(&self) -> Result<ExportKey> {
        match &self.transaction {
            Some(txn) => ExportKey::new(txn, &self.source, &self.target, &self.database),
            None => ExportKey::generate(&self.source, &self.target, &self.database),
        }
    }
}

#[derive(Args, Debug)]
pub struct RetryArgs {
    #[command(flatten)]
    pub key: KeyArgs,

    /// Also retry a stopped export
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug, Default)]
pub struct ExportListArgs {
    #[arg(long)]
    pub transaction: Option<String>,

    #[arg(long)]
    pub source: Option<String>,

    #[arg(long)]
    pub target: Option<String>,

    #[arg(long)]
    pub database: Option<String>,

    /// Only exports in this status (repeatable)
    #[arg(long = "status")]
    pub statuses: Vec<Status>,
}

impl ExportListArgs {
    pub fn filter(&self) -> Result<ExportFilter> {
        Ok(ExportFilter {
            transaction: self.transaction.as_deref().map(Transaction::new).transpose()?,
            source: self.source.clone(),
            target: self.target.clone(),
            database: self.database.clone(),
            statuses: self.statuses.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct CheckResponse {
    transaction: Transaction,
    status: Status,
}

impl ExportArgs {
    /// Execute the export command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let engine = match open_engine(config_path).await {
            Ok(engine) => engine,
            Err(e) => return respond::<()>(Err(e)),
        };
        self.run(&engine).await
    }

    /// Runs the subcommand against an assembled engine
    pub async fn run(&self, engine: &Engine) -> anyhow::Result<i32> {
        match &self.command {
            ExportCommand::Create(args) => respond(create(engine, args).await),
            ExportCommand::Stop(args) => respond(stop(engine, args).await),
            ExportCommand::Retry(args) => respond(retry(engine, args).await),
            ExportCommand::Play(args) => respond(play(engine, args).await),
            ExportCommand::Check(args) => respond(check(engine, args).await),
            ExportCommand::List(args) => respond(list(engine, args).await),
        }
    }
}

async fn create(engine: &Engine, args: &CreateArgs) -> Result<TransactionResponse> {
    let key = args.key()?;
    let export = engine.exports()?.create(&key).await?;
    Ok(export.key.transaction.into())
}

async fn stop(engine: &Engine, args: &KeyArgs) -> Result<TransactionResponse> {
    let export = engine.exports()?.stop(&args.key()?).await?;
    Ok(export.key.transaction.into())
}

async fn retry(engine: &Engine, args: &RetryArgs) -> Result<TransactionResponse> {
    let export = engine.exports()?.retry(&args.key.key()?, args.force).await?;
    Ok(export.key.transaction.into())
}

async fn play(engine: &Engine, args: &KeyArgs) -> Result<TransactionResponse> {
    let export = engine.exports()?.play(&args.key()?).await?;
    Ok(export.key.transaction.into())
}

async fn list(engine: &Engine, args: &ExportListArgs) -> Result<ListResponse<Export>> {
    engine.exports()?.list(&args.filter()?).await
}

async fn check(engine: &Engine, args: &KeyArgs) -> Result<CheckResponse> {
    let key = args.key()?;
    let status = engine.exports()?.check(&key).await?;
    Ok(CheckResponse {
        transaction: key.transaction,
        status,
    })
}
