//! Long-running role loops
//!
//! `voter`, `worker` and `monolith` run until SIGINT or SIGTERM flips the
//! shutdown channel; the current tick is allowed to finish first.

use crate::cli::commands::{exit_code, open_engine, respond, EXIT_FATAL, EXIT_OK};
use crate::core::engine::Engine;
use crate::domain::Result;
use clap::Args;
use tokio::sync::watch;

/// Arguments for the voter command
#[derive(Args, Debug)]
pub struct VoterArgs {}

/// Arguments for the worker command
#[derive(Args, Debug)]
pub struct WorkerArgs {
    /// Name to claim tasks under; `[worker].name` when omitted
    #[arg(long)]
    pub name: Option<String>,
}

/// Arguments for the monolith command
#[derive(Args, Debug)]
pub struct MonolithArgs {}

fn stopped(result: Result<()>) -> anyhow::Result<i32> {
    match result {
        Ok(()) => Ok(EXIT_OK),
        Err(e) => {
            tracing::error!(error = %e, "Loop terminated");
            eprintln!("Error: {e}");
            Ok(exit_code(&e))
        }
    }
}

async fn engine_or_exit(config_path: &str) -> std::result::Result<Engine, i32> {
    match open_engine(config_path).await {
        Ok(engine) => Ok(engine),
        Err(e) => Err(respond::<()>(Err(e)).unwrap_or(EXIT_FATAL)),
    }
}

impl VoterArgs {
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        let engine = match engine_or_exit(config_path).await {
            Ok(engine) => engine,
            Err(code) => return Ok(code),
        };
        match engine.voter() {
            Ok(voter) => stopped(voter.run(shutdown).await),
            Err(e) => respond::<()>(Err(e)),
        }
    }
}

impl WorkerArgs {
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        let engine = match engine_or_exit(config_path).await {
            Ok(engine) => engine,
            Err(code) => return Ok(code),
        };
        match engine.executor(self.name.as_deref()) {
            Ok(executor) => stopped(executor.run(shutdown).await),
            Err(e) => respond::<()>(Err(e)),
        }
    }
}

impl MonolithArgs {
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        let engine = match engine_or_exit(config_path).await {
            Ok(engine) => engine,
            Err(code) => return Ok(code),
        };
        let loops = engine.voter().and_then(|voter| Ok((voter, engine.executor(None)?)));
        let (voter, executor) = match loops {
            Ok(loops) => loops,
            Err(e) => return respond::<()>(Err(e)),
        };

        tracing::info!(worker = %executor.name(), "Running as monolith");
        let result = tokio::try_join!(voter.run(shutdown.clone()), executor.run(shutdown));
        stopped(result.map(|_| ()))
    }
}
