//! Export operations
//!
//! Commands issued by the manager role. Bulk commands first check the export
//! transition against the persisted status, then move the child tasks, then
//! the export itself, so a rejected command leaves the tasks untouched.

use crate::adapters::connectors::{SourceConnector, TargetConnector};
use crate::adapters::database::traits::ProfileStore;
use crate::core::export::ExportMachine;
use crate::core::saga::Saga;
use crate::core::task::TaskService;
use crate::domain::export::Export;
use crate::domain::ids::ExportKey;
use crate::domain::profile::{SourceProfile, TargetProfile};
use crate::domain::query::{ExportFilter, TaskFilter};
use crate::domain::response::ListResponse;
use crate::domain::status::{Status, Transition};
use crate::domain::{Result, TidewaterError};
use futures::FutureExt;
use std::sync::Arc;

/// Manager-side export operations
pub struct ExportService {
    machine: Arc<ExportMachine>,
    tasks: Arc<TaskService>,
    profiles: Arc<dyn ProfileStore>,
    source: Arc<dyn SourceConnector>,
    target: Arc<dyn TargetConnector>,
}

impl ExportService {
    pub fn new(
        machine: Arc<ExportMachine>,
        tasks: Arc<TaskService>,
        profiles: Arc<dyn ProfileStore>,
        source: Arc<dyn SourceConnector>,
        target: Arc<dyn TargetConnector>,
    ) -> Self {
        Self {
            machine,
            tasks,
            profiles,
            source,
            target,
        }
    }

    pub async fn source_profile(&self, name: &str) -> Result<SourceProfile> {
        self.profiles
            .find_source(name)
            .await?
            .ok_or_else(|| TidewaterError::NotFound(format!("source '{name}'")))
    }

    pub async fn target_profile(&self, name: &str) -> Result<TargetProfile> {
        self.profiles
            .find_target(name)
            .await?
            .ok_or_else(|| TidewaterError::NotFound(format!("target '{name}'")))
    }

    /// Creates an export and its tasks
    ///
    /// # Errors
    ///
    /// * `TidewaterError::NotFound` if the source or target profile is unknown
    /// * `TidewaterError::BadRequest` if either does not answer, or the
    ///   transaction was already used
    /// * `TidewaterError::InvalidStateChange` if the triple already has an
    ///   active export, or a collection an active task
    pub async fn create(&self, key: &ExportKey) -> Result<Export> {
        let source = self.source_profile(&key.source).await?;
        let target = self.target_profile(&key.target).await?;
        self.source
            .ping(&source)
            .await
            .map_err(|e| reachability(&format!("source '{}'", source.name), e))?;
        self.target
            .ping(&target)
            .await
            .map_err(|e| reachability(&format!("target '{}'", target.name), e))?;

        let store = self.machine.store();
        let used = ExportFilter {
            transaction: Some(key.transaction.clone()),
            ..ExportFilter::default()
        };
        if !store.list_exports(&used).await?.is_empty() {
            return Err(TidewaterError::BadRequest(format!(
                "transaction {} already exists",
                key.transaction
            )));
        }

        let export = Export::created(key.clone());
        if let Some(active) = store.insert_export(&export).await? {
            tracing::warn!(
                export = %key,
                active = %active.key.transaction,
                "Triple already has an active export"
            );
            return Err(triple_taken(&active));
        }

        let mut saga = Saga::new("export.create");
        let undo_store = Arc::clone(store);
        let undo_key = key.clone();
        saga.record(format!("delete export {}", key.transaction), move || {
            async move { undo_store.delete_export(&undo_key).await.map(|_| ()) }.boxed()
        });

        match self.tasks.create(key, &source).await {
            Ok(tasks) => {
                saga.commit();
                tracing::info!(
                    export = %key.transaction,
                    source = %key.source,
                    target = %key.target,
                    database = %key.database,
                    tasks = tasks.len(),
                    "Export created"
                );
                Ok(export)
            }
            Err(e) => {
                saga.compensate().await;
                Err(e)
            }
        }
    }

    pub async fn start(&self, key: &ExportKey) -> Result<Export> {
        self.machine.transition(key, Transition::Start).await
    }

    /// running → terminated once no task is created or running
    pub async fn finish(&self, key: &ExportKey) -> Result<Export> {
        self.machine.check(key, Transition::Finish).await?;
        let active = self
            .tasks
            .count(&TaskFilter::for_export(key).with_statuses(&Status::ACTIVE))
            .await?;
        if active > 0 {
            return Err(TidewaterError::BadRequest(format!(
                "export {} still has {active} active task(s)",
                key.transaction
            )));
        }
        self.machine.transition(key, Transition::Finish).await
    }

    /// Stops the export and every created or running task
    pub async fn stop(&self, key: &ExportKey) -> Result<Export> {
        self.machine.check(key, Transition::Stop).await?;
        let stopped = self.tasks.stop(key).await?;
        self.machine
            .transition(key, Transition::Stop)
            .await
            .map_err(|e| {
                if stopped > 0 {
                    tracing::error!(
                        export = %key,
                        stopped_tasks = stopped,
                        error = %e,
                        "Export changed while its tasks were stopped; tasks stay stopped"
                    );
                }
                e
            })
    }

    /// created|running → error once at least one task failed
    pub async fn error(&self, key: &ExportKey) -> Result<Export> {
        self.machine.check(key, Transition::Error).await?;
        let failed = self
            .tasks
            .count(&TaskFilter::for_export(key).with_statuses(&[Status::Error]))
            .await?;
        if failed == 0 {
            return Err(TidewaterError::BadRequest(format!(
                "export {} has no task in error",
                key.transaction
            )));
        }
        self.machine.transition(key, Transition::Error).await
    }

    /// Resets failed (and with `force`, stopped) tasks and the export to created
    pub async fn retry(&self, key: &ExportKey, force: bool) -> Result<Export> {
        let transition = Transition::Retry { force };
        self.machine.check(key, transition).await?;
        self.ensure_triple_free(key).await?;
        self.tasks.retry(key, force).await?;
        self.machine.transition(key, transition).await
    }

    /// Resumes a stopped export
    pub async fn play(&self, key: &ExportKey) -> Result<Export> {
        self.machine.check(key, Transition::Play).await?;
        self.ensure_triple_free(key).await?;
        self.tasks.play(key).await?;
        self.machine.transition(key, Transition::Play).await
    }

    /// Rejects moving `key` back to created while another export holds its triple
    async fn ensure_triple_free(&self, key: &ExportKey) -> Result<()> {
        let holders = self
            .machine
            .store()
            .list_exports(&ExportFilter::active_triple(key))
            .await?;
        match holders
            .into_iter()
            .find(|e| e.key.transaction != key.transaction)
        {
            Some(active) => {
                tracing::warn!(
                    export = %key,
                    active = %active.key.transaction,
                    "Triple already has an active export"
                );
                Err(triple_taken(&active))
            }
            None => Ok(()),
        }
    }

    pub async fn check(&self, key: &ExportKey) -> Result<Status> {
        Ok(self.machine.get(key).await?.status)
    }

    pub async fn list(&self, filter: &ExportFilter) -> Result<ListResponse<Export>> {
        Ok(self.machine.store().list_exports(filter).await?.into())
    }
}

fn triple_taken(active: &Export) -> TidewaterError {
    TidewaterError::InvalidStateChange {
        old: active.status,
        new: Status::Created,
        valid_from: vec![Status::Terminated, Status::Stopped, Status::Error],
    }
}

fn reachability(what: &str, error: TidewaterError) -> TidewaterError {
    match error {
        TidewaterError::BadRequest(_) => error,
        other => TidewaterError::unreachable(what, other),
    }
}
