//! Task command implementation

use crate::cli::commands::{open_engine, respond};
use crate::core::engine::Engine;
use crate::domain::ids::{Transaction, WorkerName};
use crate::domain::query::{TaskFilter, WorkerMatch};
use crate::domain::response::ListResponse;
use crate::domain::status::Status;
use crate::domain::task::ExportTask;
use crate::domain::Result;
use clap::{Args, Subcommand};
use serde::Serialize;

/// Arguments for the task command
#[derive(Args, Debug)]
pub struct TaskArgs {
    #[command(subcommand)]
    pub command: TaskCommand,
}

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    /// List tasks
    List(TaskFilterArgs),

    /// Count tasks
    Count(TaskFilterArgs),
}

#[derive(Args, Debug, Default)]
pub struct TaskFilterArgs {
    #[arg(long)]
    pub transaction: Option<String>,

    #[arg(long)]
    pub source: Option<String>,

    #[arg(long)]
    pub target: Option<String>,

    #[arg(long)]
    pub database: Option<String>,

    #[arg(long)]
    pub collection: Option<String>,

    /// Only tasks claimed by this worker
    #[arg(long)]
    pub worker: Option<String>,

    /// Only tasks in this status (repeatable)
    #[arg(long = "status")]
    pub statuses: Vec<Status>,
}

impl TaskFilterArgs {
    pub fn filter(&self) -> Result<TaskFilter> {
        let worker = match &self.worker {
            Some(name) => WorkerMatch::Assigned(WorkerName::new(name)?),
            None => WorkerMatch::Any,
        };
        Ok(TaskFilter {
            transaction: self.transaction.as_deref().map(Transaction::new).transpose()?,
            source: self.source.clone(),
            target: self.target.clone(),
            database: self.database.clone(),
            collection: self.collection.clone(),
            statuses: self.statuses.clone(),
            worker,
        })
    }
}

#[derive(Debug, Serialize)]
struct CountResponse {
    count: u64,
}

impl TaskArgs {
    /// Execute the task command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let engine = match open_engine(config_path).await {
            Ok(engine) => engine,
            Err(e) => return respond::<()>(Err(e)),
        };
        self.run(&engine).await
    }

    pub async fn run(&self, engine: &Engine) -> anyhow::Result<i32> {
        match &self.command {
            TaskCommand::List(args) => respond(list(engine, args).await),
            TaskCommand::Count(args) => respond(count(engine, args).await),
        }
    }
}

async fn list(engine: &Engine, args: &TaskFilterArgs) -> Result<ListResponse<ExportTask>> {
    engine.tasks()?.list(&args.filter()?).await
}

async fn count(engine: &Engine, args: &TaskFilterArgs) -> Result<CountResponse> {
    let count = engine.tasks()?.count(&args.filter()?).await?;
    Ok(CountResponse { count })
}
