//! Task state machine
//!
//! Single-task transitions are filtered by the claiming worker where one is
//! involved; bulk transitions act on every task of an export and ignore the
//! worker, so a stop always wins over an in-flight execution.

use crate::adapters::database::traits::TaskStore;
use crate::domain::ids::{ExportKey, TaskKey, WorkerName};
use crate::domain::query::{TaskFilter, TaskUpdate, WorkerMatch};
use crate::domain::status::{Lifecycle, Status, Transition};
use crate::domain::task::{ExportTask, Window};
use crate::domain::{Result, TidewaterError};
use crate::log_transition;
use std::sync::Arc;

pub struct TaskMachine {
    store: Arc<dyn TaskStore>,
}

impl TaskMachine {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// Loads a task
    ///
    /// # Errors
    ///
    /// Returns `TidewaterError::NotFound` if no task has this key
    pub async fn get(&self, key: &TaskKey) -> Result<ExportTask> {
        self.store
            .find_task(key)
            .await?
            .ok_or_else(|| TidewaterError::NotFound(format!("task {key}")))
    }

    /// created → running, atomically assigning `worker` and `window`
    ///
    /// # Errors
    ///
    /// Returns `TidewaterError::InvalidStateChange` if the task is not an
    /// unassigned created task, including when another claim won the race.
    pub async fn claim(
        &self,
        key: &TaskKey,
        worker: &WorkerName,
        window: Window,
    ) -> Result<ExportTask> {
        let current = self.get(key).await?;
        Transition::Start.evaluate(current.status, Lifecycle::Task)?;
        if let Some(owner) = &current.worker {
            return Err(TidewaterError::BadRequest(format!(
                "task {key} is already claimed by worker '{owner}'"
            )));
        }

        let filter = TaskFilter::for_task(key)
            .with_statuses(&[Status::Created])
            .with_worker(WorkerMatch::Unassigned);
        let update = TaskUpdate::status(Status::Running)
            .claim(worker.clone())
            .window(window)
            .clear_error();
        self.swap(key, current.status, Transition::Start, &filter, &update)
            .await
    }

    /// running → terminated, recording the ingested row count
    ///
    /// # Errors
    ///
    /// Returns `TidewaterError::InvalidStateChange` unless the task is running,
    /// and `TidewaterError::BadRequest` if `worker` does not hold the claim.
    pub async fn finish(
        &self,
        key: &TaskKey,
        worker: &WorkerName,
        count: u64,
    ) -> Result<ExportTask> {
        let current = self.get(key).await?;
        Transition::Finish.evaluate(current.status, Lifecycle::Task)?;
        ensure_owner(key, &current, worker)?;

        let filter = TaskFilter::for_task(key)
            .with_statuses(&[Status::Running])
            .with_worker(WorkerMatch::Assigned(worker.clone()));
        let update = TaskUpdate::status(Status::Terminated).count(count);
        self.swap(key, current.status, Transition::Finish, &filter, &update)
            .await
    }

    /// created|running → error, recording `cause`
    ///
    /// When `worker` is given the swap only matches that worker's claim.
    pub async fn fail(
        &self,
        key: &TaskKey,
        worker: Option<&WorkerName>,
        cause: &str,
    ) -> Result<ExportTask> {
        let current = self.get(key).await?;
        Transition::Error.evaluate(current.status, Lifecycle::Task)?;
        if let Some(worker) = worker {
            ensure_owner(key, &current, worker)?;
        }

        let filter = TaskFilter::for_task(key)
            .with_statuses(Transition::Error.valid_from())
            .with_worker(
                worker.map_or(WorkerMatch::Any, |w| WorkerMatch::Assigned(w.clone())),
            );
        let update = TaskUpdate::status(Status::Error).fail(cause);
        self.swap(key, current.status, Transition::Error, &filter, &update)
            .await
    }

    /// Applies a bulk transition to every eligible task of an export
    ///
    /// Only `stop`, `play` and `retry` are bulk transitions; the worker and
    /// error of replayed or retried tasks are cleared while window and count
    /// are kept.
    ///
    /// # Returns
    ///
    /// The number of tasks changed.
    pub async fn bulk(&self, export: &ExportKey, transition: Transition) -> Result<u64> {
        let update = match transition {
            Transition::Stop => TaskUpdate::status(Status::Stopped),
            Transition::Play | Transition::Retry { .. } => TaskUpdate::status(Status::Created)
                .release()
                .clear_error(),
            Transition::Start | Transition::Finish | Transition::Error => {
                return Err(TidewaterError::Internal(format!(
                    "'{transition}' is not a bulk task transition"
                )))
            }
        };
        let filter = TaskFilter::for_export(export).with_statuses(transition.valid_from());
        if update.status.map_or(false, |s| s.is_active()) {
            self.ensure_collections_free(&filter).await?;
        }
        let changed = self.store.update_tasks(&filter, &update).await?;
        tracing::info!(
            export = %export.transaction,
            %transition,
            changed,
            "Bulk task transition"
        );
        Ok(changed)
    }

    /// Rejects reviving a task whose collection has an active task elsewhere
    async fn ensure_collections_free(&self, revived: &TaskFilter) -> Result<()> {
        for task in self.store.list_tasks(revived).await? {
            let slot = TaskFilter::active_collection(&task.key);
            if let Some(blocker) = self.store.first_task(&slot).await? {
                tracing::warn!(
                    task = %task.key,
                    active = %blocker.key.transaction(),
                    "Collection already has an active task"
                );
                return Err(TidewaterError::InvalidStateChange {
                    old: blocker.status,
                    new: Status::Created,
                    valid_from: vec![Status::Terminated, Status::Stopped, Status::Error],
                });
            }
        }
        Ok(())
    }

    async fn swap(
        &self,
        key: &TaskKey,
        from: Status,
        transition: Transition,
        filter: &TaskFilter,
        update: &TaskUpdate,
    ) -> Result<ExportTask> {
        match self.store.find_and_update_task(filter, update).await? {
            Some(updated) => {
                log_transition!("task", key, from, updated.status);
                Ok(updated)
            }
            None => {
                let latest = self.get(key).await?;
                tracing::debug!(task = %key, status = %latest.status, %transition, "Lost task swap");
                Err(transition.rejection(latest.status))
            }
        }
    }
}

fn ensure_owner(key: &TaskKey, task: &ExportTask, worker: &WorkerName) -> Result<()> {
    match &task.worker {
        Some(owner) if owner == worker => Ok(()),
        Some(owner) => Err(TidewaterError::BadRequest(format!(
            "task {key} is claimed by worker '{owner}', not '{worker}'"
        ))),
        None => Err(TidewaterError::BadRequest(format!(
            "task {key} is not claimed by worker '{worker}'"
        ))),
    }
}
