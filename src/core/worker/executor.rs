//! Worker control loop
//!
//! Each tick the worker looks up the running task claimed under its own name
//! and executes it: resolve profiles and window, ingest, then report finish or
//! error back to the store.

use crate::adapters::database::traits::ProfileStore;
use crate::core::ingest::{IngestJob, Ingestor};
use crate::core::stamp::StampResolver;
use crate::core::task::TaskService;
use crate::core::worker::RetryPolicy;
use crate::domain::ids::{TaskKey, WorkerName};
use crate::domain::task::ExportTask;
use crate::domain::{Result, TidewaterError};
use crate::log_error_with_context;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// How an execution ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Task terminated with this row count
    Finished { task: TaskKey, count: u64 },
    /// Retries exhausted; the task was marked `error`
    Failed { task: TaskKey, cause: String },
    /// The task left `running` while it executed, e.g. after a stop
    Abandoned { task: TaskKey },
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub name: WorkerName,
    pub tick_interval: Duration,
    pub retry: RetryPolicy,
}

pub struct Executor {
    settings: WorkerSettings,
    tasks: Arc<TaskService>,
    profiles: Arc<dyn ProfileStore>,
    ingestor: Ingestor,
    resolver: StampResolver,
}

impl Executor {
    pub fn new(
        settings: WorkerSettings,
        tasks: Arc<TaskService>,
        profiles: Arc<dyn ProfileStore>,
        ingestor: Ingestor,
        resolver: StampResolver,
    ) -> Self {
        Self {
            settings,
            tasks,
            profiles,
            ingestor,
            resolver,
        }
    }

    pub fn name(&self) -> &WorkerName {
        &self.settings.name
    }

    /// Runs ticks until `shutdown` flips to true
    ///
    /// A shutdown request is honoured between executions only.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        tracing::info!(worker = %self.settings.name, "Worker started");
        let mut interval = tokio::time::interval(self.settings.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        log_error_with_context!(e, "Worker tick failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!(worker = %self.settings.name, "Worker stopped");
        Ok(())
    }

    /// Executes this worker's running task, if it has one
    pub async fn tick(&self) -> Result<Option<Outcome>> {
        match self.tasks.next(&self.settings.name).await? {
            Some(task) => self.execute(&task).await.map(Some),
            None => Ok(None),
        }
    }

    async fn execute(&self, task: &ExportTask) -> Result<Outcome> {
        let key = task.key.clone();
        let worker = &self.settings.name;
        tracing::info!(task = %key, worker = %worker, "Executing task");

        match self.settings.retry.run(|_| self.attempt(task)).await {
            Ok(count) => match self.tasks.finish(&key, worker, count).await {
                Ok(_) => Ok(Outcome::Finished { task: key, count }),
                Err(TidewaterError::InvalidStateChange { old, .. }) => {
                    tracing::info!(task = %key, status = %old, "Task changed while executing");
                    Ok(Outcome::Abandoned { task: key })
                }
                Err(e) => Err(e),
            },
            Err(cause) => {
                let cause = cause.to_string();
                tracing::warn!(task = %key, error = %cause, "Task failed after retries");
                if let Err(e) = self.tasks.error(&key, Some(worker), &cause).await {
                    log_error_with_context!(e, "Failed to record task error");
                }
                Ok(Outcome::Failed { task: key, cause })
            }
        }
    }

    async fn attempt(&self, task: &ExportTask) -> Result<u64> {
        let export = &task.key.export;
        let source = self
            .profiles
            .find_source(&export.source)
            .await?
            .ok_or_else(|| TidewaterError::NotFound(format!("source '{}'", export.source)))?;
        let target = self
            .profiles
            .find_target(&export.target)
            .await?
            .ok_or_else(|| TidewaterError::NotFound(format!("target '{}'", export.target)))?;

        let window = match task.window {
            Some(window) => window,
            None => self.tasks.resume_window(&task.key).await?,
        };
        let plan = self.resolver.plan(&source, &task.key.collection);

        self.ingestor
            .ingest(IngestJob {
                task,
                source: &source,
                target: &target,
                plan: &plan,
                window: &window,
            })
            .await
    }
}
