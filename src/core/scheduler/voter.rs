//! Scheduler control loop
//!
//! One tick, in order: match one free worker to the oldest schedulable task,
//! start created exports that have a running task, settle running exports
//! whose tasks are all done. Lost races are logged and left to the next tick.

use crate::core::export::ExportService;
use crate::core::scheduler::{SelectionPolicy, WorkerDirectory};
use crate::core::task::TaskService;
use crate::domain::export::Export;
use crate::domain::ids::{TaskKey, Transaction, WorkerName};
use crate::domain::query::ExportFilter;
use crate::domain::status::Status;
use crate::domain::task::ExportTask;
use crate::domain::{Result, TidewaterError};
use crate::log_error_with_context;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// What one tick changed
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub assigned: Option<(TaskKey, WorkerName)>,
    pub started: Vec<Transaction>,
    pub finished: Vec<Transaction>,
    pub errored: Vec<Transaction>,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        self.assigned.is_none()
            && self.started.is_empty()
            && self.finished.is_empty()
            && self.errored.is_empty()
    }
}

/// What the voter does with a running export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settlement {
    Wait,
    Error,
    Finish,
    /// Only stopped tasks remain besides terminated ones
    Hold,
}

/// An error settles the export as soon as nothing runs; finishing also
/// needs every created task to be done.
fn settle(tasks: &[ExportTask]) -> Settlement {
    let any = |status: Status| tasks.iter().any(|t| t.status == status);
    if any(Status::Running) {
        Settlement::Wait
    } else if any(Status::Error) {
        Settlement::Error
    } else if any(Status::Created) {
        Settlement::Wait
    } else if any(Status::Stopped) {
        Settlement::Hold
    } else {
        Settlement::Finish
    }
}

pub struct Voter {
    tasks: Arc<TaskService>,
    exports: Arc<ExportService>,
    directory: WorkerDirectory,
    selection: Arc<dyn SelectionPolicy>,
    tick_interval: Duration,
}

impl Voter {
    pub fn new(
        tasks: Arc<TaskService>,
        exports: Arc<ExportService>,
        directory: WorkerDirectory,
        selection: Arc<dyn SelectionPolicy>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            tasks,
            exports,
            directory,
            selection,
            tick_interval,
        }
    }

    /// Runs ticks until `shutdown` flips to true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        tracing::info!(
            workers = self.directory.endpoints().len(),
            interval_ms = self.tick_interval.as_millis() as u64,
            "Voter started"
        );
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.tick().await {
                        Ok(report) if !report.is_idle() => {
                            tracing::debug!(?report, "Voter tick");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            log_error_with_context!(e, "Voter tick failed");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Voter stopped");
        Ok(())
    }

    pub async fn tick(&self) -> Result<TickReport> {
        let mut report = TickReport {
            assigned: self.assign().await?,
            ..TickReport::default()
        };
        report.started = self.start_exports().await?;
        let (finished, errored) = self.settle_exports().await?;
        report.finished = finished;
        report.errored = errored;
        Ok(report)
    }

    async fn assign(&self) -> Result<Option<(TaskKey, WorkerName)>> {
        let busy = self.tasks.busy_workers().await?;
        let free = self.directory.free_workers(&busy).await;
        let Some(worker) = self.selection.pick(&free) else {
            return Ok(None);
        };
        let Some(task) = self.tasks.next_schedulable().await? else {
            return Ok(None);
        };

        match self.tasks.start(&task.key, &worker.name).await {
            Ok(_) => {
                tracing::info!(task = %task.key, worker = %worker.name, "Assigned task");
                Ok(Some((task.key, worker.name.clone())))
            }
            Err(e @ TidewaterError::InvalidStateChange { .. }) => {
                tracing::info!(task = %task.key, error = %e, "Lost task claim, retrying next tick");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn exports_in(&self, status: Status) -> Result<Vec<Export>> {
        let filter = ExportFilter::default().with_statuses(&[status]);
        Ok(self.exports.list(&filter).await?.results)
    }

    async fn start_exports(&self) -> Result<Vec<Transaction>> {
        let mut started = Vec::new();
        for export in self.exports_in(Status::Created).await? {
            let tasks = self.tasks.tasks_of(&export.key).await?;
            if !tasks.iter().any(|t| t.status == Status::Running) {
                continue;
            }
            match self.exports.start(&export.key).await {
                Ok(_) => started.push(export.key.transaction),
                Err(e) => {
                    tracing::info!(export = %export.key.transaction, error = %e, "Export start skipped");
                }
            }
        }
        Ok(started)
    }

    async fn settle_exports(&self) -> Result<(Vec<Transaction>, Vec<Transaction>)> {
        let mut finished = Vec::new();
        let mut errored = Vec::new();
        for export in self.exports_in(Status::Running).await? {
            let tasks = self.tasks.tasks_of(&export.key).await?;
            let settlement = settle(&tasks);
            let outcome = match settlement {
                Settlement::Wait | Settlement::Hold => continue,
                Settlement::Error => self.exports.error(&export.key).await,
                Settlement::Finish => self.exports.finish(&export.key).await,
            };
            match (outcome, settlement) {
                (Ok(_), Settlement::Error) => errored.push(export.key.transaction),
                (Ok(_), _) => finished.push(export.key.transaction),
                (Err(e), _) => {
                    tracing::info!(
                        export = %export.key.transaction,
                        error = %e,
                        "Export settlement skipped"
                    );
                }
            }
        }
        Ok((finished, errored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::ExportKey;
    use crate::domain::task::ExportTaskBuilder;
    use test_case::test_case;

    fn tasks(statuses: &[Status]) -> Vec<ExportTask> {
        let export = ExportKey::generate("s1", "tg1", "db1").unwrap();
        statuses
            .iter()
            .enumerate()
            .map(|(i, s)| {
                ExportTaskBuilder::new(export.task(&format!("c{i}")).unwrap())
                    .status(*s)
                    .build()
            })
            .collect()
    }

    #[test_case(&[Status::Terminated, Status::Running], Settlement::Wait ; "running task")]
    #[test_case(&[Status::Error, Status::Created], Settlement::Error ; "error with created task")]
    #[test_case(&[Status::Error, Status::Running], Settlement::Wait ; "error with running task")]
    #[test_case(&[Status::Terminated, Status::Created], Settlement::Wait ; "created task")]
    #[test_case(&[Status::Terminated, Status::Error], Settlement::Error ; "errored task")]
    #[test_case(&[Status::Terminated, Status::Terminated], Settlement::Finish ; "all terminated")]
    #[test_case(&[Status::Terminated, Status::Stopped], Settlement::Hold ; "stopped task")]
    #[test_case(&[Status::Stopped, Status::Error], Settlement::Error ; "error beats stopped")]
    fn test_settle(statuses: &[Status], expected: Settlement) {
        assert_eq!(settle(&tasks(statuses)), expected);
    }
}
