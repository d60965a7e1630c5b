//! Task operations
//!
//! Fan-out of an export into one task per collection, the claim performed by
//! the scheduler, the worker-side finish/error reports and the bulk
//! transitions driven by export commands.

use crate::adapters::connectors::SourceConnector;
use crate::core::export::ExportMachine;
use crate::core::saga::Saga;
use crate::core::stamp::CollectionFilter;
use crate::core::task::TaskMachine;
use crate::domain::ids::{ExportKey, TaskKey, WorkerName};
use crate::domain::profile::SourceProfile;
use crate::domain::query::{TaskFilter, WorkerMatch};
use crate::domain::response::ListResponse;
use crate::domain::status::{Status, Transition};
use crate::domain::task::{ExportTask, Window};
use crate::domain::{Result, TidewaterError};
use crate::log_error_with_context;
use chrono::Utc;
use futures::FutureExt;
use std::sync::Arc;

pub struct TaskService {
    machine: TaskMachine,
    exports: Arc<ExportMachine>,
    source: Arc<dyn SourceConnector>,
    ignored: Vec<String>,
}

impl TaskService {
    /// # Arguments
    ///
    /// * `ignored` - Global collection ignore patterns, applied on top of each
    ///   source profile's own list
    pub fn new(
        machine: TaskMachine,
        exports: Arc<ExportMachine>,
        source: Arc<dyn SourceConnector>,
        ignored: Vec<String>,
    ) -> Self {
        Self {
            machine,
            exports,
            source,
            ignored,
        }
    }

    pub fn machine(&self) -> &TaskMachine {
        &self.machine
    }

    /// Collections of the export's database that will get a task
    pub async fn collections(
        &self,
        export: &ExportKey,
        source: &SourceProfile,
    ) -> Result<Vec<String>> {
        let names = self
            .source
            .list_collections(source, &export.database)
            .await?;
        Ok(CollectionFilter::for_source(&self.ignored, source).apply(names))
    }

    /// Creates one task per collection of the export's database
    ///
    /// Either every task is inserted or none is: on any failure the tasks
    /// already written for the transaction are deleted again.
    ///
    /// # Errors
    ///
    /// * `TidewaterError::BadRequest` if no collection is left after filtering
    /// * `TidewaterError::InvalidStateChange` if one collection already has an
    ///   active task under another export
    pub async fn create(
        &self,
        export: &ExportKey,
        source: &SourceProfile,
    ) -> Result<Vec<ExportTask>> {
        let collections = self.collections(export, source).await?;
        if collections.is_empty() {
            return Err(TidewaterError::BadRequest(format!(
                "database '{}' of source '{}' has no collections to export",
                export.database, export.source
            )));
        }

        let mut saga = Saga::new("task.create");
        let store = Arc::clone(self.machine.store());
        let transaction = export.transaction.clone();
        saga.record(format!("delete tasks of {transaction}"), move || {
            async move {
                store
                    .delete_tasks(&TaskFilter::for_transaction(&transaction))
                    .await
                    .map(|_| ())
            }
            .boxed()
        });

        match self.insert_all(export, &collections).await {
            Ok(tasks) => {
                saga.commit();
                tracing::info!(
                    export = %export.transaction,
                    tasks = tasks.len(),
                    "Created export tasks"
                );
                Ok(tasks)
            }
            Err(e) => {
                saga.compensate().await;
                Err(e)
            }
        }
    }

    async fn insert_all(
        &self,
        export: &ExportKey,
        collections: &[String],
    ) -> Result<Vec<ExportTask>> {
        let mut tasks = Vec::with_capacity(collections.len());
        for collection in collections {
            let task = ExportTask::created(export.task(collection)?);
            if let Some(blocker) = self.machine.store().insert_task(&task).await? {
                tracing::warn!(
                    task = %task.key,
                    blocker = %blocker.key,
                    "Collection already has an active task"
                );
                return Err(TidewaterError::InvalidStateChange {
                    old: blocker.status,
                    new: Status::Created,
                    valid_from: vec![Status::Terminated, Status::Stopped, Status::Error],
                });
            }
            tasks.push(task);
        }
        Ok(tasks)
    }

    /// Window the next run of `key` extracts, ending now
    pub async fn resume_window(&self, key: &TaskKey) -> Result<Window> {
        let last_end = self.machine.store().last_terminated_window_end(key).await?;
        Ok(Window::resume(last_end, Utc::now()))
    }

    /// Claims a created task for `worker` and starts its export
    ///
    /// Only one of several concurrent claims on the same task succeeds; the
    /// others get `TidewaterError::InvalidStateChange`. A failure to start the
    /// export is logged, the scheduler retries it on its next tick.
    pub async fn start(&self, key: &TaskKey, worker: &WorkerName) -> Result<ExportTask> {
        let window = self.resume_window(key).await?;
        let task = self.machine.claim(key, worker, window).await?;

        if let Err(e) = self.exports.transition(&key.export, Transition::Start).await {
            log_error_with_context!(e, "Failed to start export after task claim");
        }
        Ok(task)
    }

    pub async fn finish(
        &self,
        key: &TaskKey,
        worker: &WorkerName,
        count: u64,
    ) -> Result<ExportTask> {
        self.machine.finish(key, worker, count).await
    }

    pub async fn error(
        &self,
        key: &TaskKey,
        worker: Option<&WorkerName>,
        cause: &str,
    ) -> Result<ExportTask> {
        self.machine.fail(key, worker, cause).await
    }

    pub async fn stop(&self, export: &ExportKey) -> Result<u64> {
        self.machine.bulk(export, Transition::Stop).await
    }

    pub async fn play(&self, export: &ExportKey) -> Result<u64> {
        self.machine.bulk(export, Transition::Play).await
    }

    pub async fn retry(&self, export: &ExportKey, force: bool) -> Result<u64> {
        self.machine.bulk(export, Transition::Retry { force }).await
    }

    /// The running task claimed by `worker`, if any
    pub async fn next(&self, worker: &WorkerName) -> Result<Option<ExportTask>> {
        let filter = TaskFilter::default()
            .with_statuses(&[Status::Running])
            .with_worker(WorkerMatch::Assigned(worker.clone()));
        self.machine.store().first_task(&filter).await
    }

    /// Oldest created task nobody claimed yet
    pub async fn next_schedulable(&self) -> Result<Option<ExportTask>> {
        let filter = TaskFilter::default()
            .with_statuses(&[Status::Created])
            .with_worker(WorkerMatch::Unassigned);
        self.machine.store().first_task(&filter).await
    }

    pub async fn busy_workers(&self) -> Result<Vec<WorkerName>> {
        self.machine.store().busy_workers().await
    }

    pub async fn tasks_of(&self, export: &ExportKey) -> Result<Vec<ExportTask>> {
        self.machine
            .store()
            .list_tasks(&TaskFilter::for_export(export))
            .await
    }

    pub async fn list(&self, filter: &TaskFilter) -> Result<ListResponse<ExportTask>> {
        Ok(self.machine.store().list_tasks(filter).await?.into())
    }

    pub async fn count(&self, filter: &TaskFilter) -> Result<u64> {
        self.machine.store().count_tasks(filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::database::traits::{ExportStore, TaskStore};
    use crate::adapters::memory::{MemorySource, MemoryStore};
    use crate::config::secret_string;
    use crate::domain::export::Export;
    use crate::domain::profile::StampOverrides;

    const TXN: &str = "6f1c1c1e-8f57-4bd5-a6a9-1e0b3f0f2f41";
    const OTHER: &str = "0b6f0c52-42c4-4a1a-a1d4-3a1f3f7d7b10";

    fn profile() -> SourceProfile {
        SourceProfile {
            name: "s1".to_string(),
            url: secret_string("mongodb://localhost".to_string()),
            ignore: vec!["tmp_*".to_string()],
            stamps: StampOverrides::default(),
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        service: TaskService,
        key: ExportKey,
    }

    async fn fixture(collections: &[&str]) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(MemorySource::new());
        source.add_database("db1", collections);
        let exports = Arc::new(ExportMachine::new(store.clone()));
        let service = TaskService::new(
            TaskMachine::new(store.clone()),
            exports,
            source,
            vec!["system.*".to_string()],
        );
        let key = ExportKey::new(TXN, "s1", "tg1", "db1").unwrap();
        store.insert_export(&Export::created(key.clone())).await.unwrap();
        Fixture {
            store,
            service,
            key,
        }
    }

    fn worker(name: &str) -> WorkerName {
        WorkerName::new(name).unwrap()
    }

    #[tokio::test]
    async fn test_create_skips_ignored_collections() {
        let f = fixture(&["b", "system.views", "tmp_x", "a"]).await;
        let tasks = f.service.create(&f.key, &profile()).await.unwrap();
        let names: Vec<_> = tasks.iter().map(|t| t.key.collection.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(tasks.iter().all(ExportTask::is_schedulable));
    }

    #[tokio::test]
    async fn test_create_without_collections_is_rejected() {
        let f = fixture(&["system.views"]).await;
        let err = f.service.create(&f.key, &profile()).await.unwrap_err();
        assert!(matches!(err, TidewaterError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_create_rolls_back_on_conflict() {
        let f = fixture(&["a", "b", "c"]).await;
        let other = ExportKey::new(OTHER, "s1", "tg1", "db1").unwrap();
        f.store
            .insert_task(&ExportTask::created(other.task("c").unwrap()))
            .await
            .unwrap();

        let err = f.service.create(&f.key, &profile()).await.unwrap_err();
        assert!(matches!(
            err,
            TidewaterError::InvalidStateChange {
                old: Status::Created,
                ..
            }
        ));
        assert_eq!(
            f.service
                .count(&TaskFilter::for_transaction(&f.key.transaction))
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_start_claims_and_starts_export() {
        let f = fixture(&["a"]).await;
        let tasks = f.service.create(&f.key, &profile()).await.unwrap();
        let task = f.service.start(&tasks[0].key, &worker("w1")).await.unwrap();

        assert_eq!(task.status, Status::Running);
        assert_eq!(task.worker, Some(worker("w1")));
        assert_eq!(task.window.unwrap().begin.timestamp(), 0);
        let export = f.store.find_export(&f.key).await.unwrap().unwrap();
        assert_eq!(export.status, Status::Running);
    }

    #[tokio::test]
    async fn test_second_claim_loses() {
        let f = fixture(&["a"]).await;
        let tasks = f.service.create(&f.key, &profile()).await.unwrap();
        f.service.start(&tasks[0].key, &worker("w1")).await.unwrap();
        let err = f
            .service
            .start(&tasks[0].key, &worker("w2"))
            .await
            .unwrap_err();
        assert!(matches!(err, TidewaterError::InvalidStateChange { .. }));
    }

    #[tokio::test]
    async fn test_finish_requires_claiming_worker() {
        let f = fixture(&["a"]).await;
        let tasks = f.service.create(&f.key, &profile()).await.unwrap();
        let key = &tasks[0].key;
        f.service.start(key, &worker("w1")).await.unwrap();

        let err = f.service.finish(key, &worker("w2"), 3).await.unwrap_err();
        assert!(matches!(err, TidewaterError::BadRequest(_)));

        let done = f.service.finish(key, &worker("w1"), 3).await.unwrap();
        assert_eq!(done.status, Status::Terminated);
        assert_eq!(done.count, 3);

        let again = f.service.finish(key, &worker("w1"), 3).await.unwrap_err();
        assert!(matches!(again, TidewaterError::InvalidStateChange { .. }));
    }

    #[tokio::test]
    async fn test_next_returns_own_running_task() {
        let f = fixture(&["a", "b"]).await;
        let tasks = f.service.create(&f.key, &profile()).await.unwrap();
        assert!(f.service.next(&worker("w1")).await.unwrap().is_none());

        f.service.start(&tasks[1].key, &worker("w1")).await.unwrap();
        let next = f.service.next(&worker("w1")).await.unwrap().unwrap();
        assert_eq!(next.key.collection, "b");
        assert!(f.service.next(&worker("w2")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retry_keeps_window_and_count() {
        let f = fixture(&["a"]).await;
        let tasks = f.service.create(&f.key, &profile()).await.unwrap();
        let key = &tasks[0].key;
        let running = f.service.start(key, &worker("w1")).await.unwrap();
        f.service
            .error(key, Some(&worker("w1")), "load failed")
            .await
            .unwrap();

        assert_eq!(f.service.retry(&f.key, false).await.unwrap(), 1);
        let retried = f.store.find_task(key).await.unwrap().unwrap();
        assert_eq!(retried.status, Status::Created);
        assert!(retried.worker.is_none());
        assert!(retried.error.is_none());
        assert_eq!(retried.window, running.window);
    }

    #[tokio::test]
    async fn test_window_resumes_after_terminated_run() {
        let f = fixture(&["a"]).await;
        let tasks = f.service.create(&f.key, &profile()).await.unwrap();
        let key = &tasks[0].key;
        let first = f.service.start(key, &worker("w1")).await.unwrap();
        f.service.finish(key, &worker("w1"), 0).await.unwrap();

        let next = f.service.resume_window(key).await.unwrap();
        assert_eq!(next.begin, first.window.unwrap().end);
    }
    #[tokio::test]
    async fn test_play_rejected_while_collection_is_active_elsewhere() {
        let f = fixture(&["a", "b"]).await;
        f.service.create(&f.key, &profile()).await.unwrap();
        assert_eq!(f.service.stop(&f.key).await.unwrap(), 2);

        let other = ExportKey::new(OTHER, "s1", "tg1", "db1").unwrap();
        f.store
            .insert_task(&ExportTask::created(other.task("b").unwrap()))
            .await
            .unwrap();

        let err = f.service.play(&f.key).await.unwrap_err();
        assert!(matches!(
            err,
            TidewaterError::InvalidStateChange {
                old: Status::Created,
                new: Status::Created,
                ..
            }
        ));
        // nothing was half-reset
        assert_eq!(
            f.service
                .count(&TaskFilter::for_export(&f.key).with_statuses(&[Status::Stopped]))
                .await
                .unwrap(),
            2
        );
    }
}
