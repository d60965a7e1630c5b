//! In-memory orchestration store
//!
//! Every operation runs under one mutex, which gives the same per-record
//! atomicity as the MongoDB conditional updates.

use crate::adapters::database::traits::{ExportStore, ProfileStore, TaskStore};
use crate::domain::errors::StoreError;
use crate::domain::export::Export;
use crate::domain::ids::{ExportKey, TaskKey, WorkerName};
use crate::domain::profile::{SourceProfile, TargetProfile};
use crate::domain::query::{ExportFilter, TaskFilter, TaskUpdate};
use crate::domain::status::Status;
use crate::domain::task::ExportTask;
use crate::domain::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct State {
    exports: Vec<Export>,
    tasks: Vec<ExportTask>,
    sources: BTreeMap<String, SourceProfile>,
    targets: BTreeMap<String, TargetProfile>,
    failing_collections: HashSet<String>,
}

/// Store backend keeping everything in process memory
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later task insert for `collection` fail
    pub fn fail_task_insert_for(&self, collection: &str) {
        self.lock().failing_collections.insert(collection.to_string());
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ExportStore for MemoryStore {
    async fn insert_export(&self, export: &Export) -> Result<Option<Export>> {
        let mut state = self.lock();
        if let Some(active) = state
            .exports
            .iter()
            .find(|e| e.is_active() && e.same_triple(&export.key))
        {
            return Ok(Some(active.clone()));
        }
        if state
            .exports
            .iter()
            .any(|e| e.key.transaction == export.key.transaction)
        {
            return Err(StoreError::WriteFailed(format!(
                "duplicate transaction {}",
                export.key.transaction
            ))
            .into());
        }
        state.exports.push(export.clone());
        Ok(None)
    }

    async fn find_export(&self, key: &ExportKey) -> Result<Option<Export>> {
        Ok(self.lock().exports.iter().find(|e| e.key == *key).cloned())
    }

    async fn list_exports(&self, filter: &ExportFilter) -> Result<Vec<Export>> {
        Ok(self
            .lock()
            .exports
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect())
    }

    async fn update_export_status(
        &self,
        key: &ExportKey,
        expected: Status,
        next: Status,
    ) -> Result<Option<Export>> {
        let mut state = self.lock();
        if next.is_active()
            && state
                .exports
                .iter()
                .any(|e| e.key != *key && e.is_active() && e.same_triple(key))
        {
            tracing::debug!(export = %key, "Status swap blocked by an active export");
            return Ok(None);
        }
        Ok(state
            .exports
            .iter_mut()
            .find(|e| e.key == *key && e.status == expected)
            .map(|e| {
                e.status = next;
                e.updated_at = Utc::now();
                e.clone()
            }))
    }

    async fn delete_export(&self, key: &ExportKey) -> Result<u64> {
        let mut state = self.lock();
        let before = state.exports.len();
        state.exports.retain(|e| e.key != *key);
        Ok((before - state.exports.len()) as u64)
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn insert_task(&self, task: &ExportTask) -> Result<Option<ExportTask>> {
        let mut state = self.lock();
        if state.failing_collections.contains(&task.key.collection) {
            return Err(StoreError::WriteFailed(format!("insert of task {} refused", task.key)).into());
        }
        let active = TaskFilter::active_collection(&task.key);
        if let Some(blocker) = state.tasks.iter().find(|t| active.matches(t)) {
            return Ok(Some(blocker.clone()));
        }
        if state.tasks.iter().any(|t| t.key == task.key) {
            return Err(StoreError::WriteFailed(format!("duplicate task {}", task.key)).into());
        }
        state.tasks.push(task.clone());
        Ok(None)
    }

    async fn find_task(&self, key: &TaskKey) -> Result<Option<ExportTask>> {
        Ok(self.lock().tasks.iter().find(|t| t.key == *key).cloned())
    }

    async fn first_task(&self, filter: &TaskFilter) -> Result<Option<ExportTask>> {
        Ok(self.lock().tasks.iter().find(|t| filter.matches(t)).cloned())
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<ExportTask>> {
        Ok(self
            .lock()
            .tasks
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect())
    }

    async fn count_tasks(&self, filter: &TaskFilter) -> Result<u64> {
        Ok(self.lock().tasks.iter().filter(|t| filter.matches(t)).count() as u64)
    }

    async fn find_and_update_task(
        &self,
        filter: &TaskFilter,
        update: &TaskUpdate,
    ) -> Result<Option<ExportTask>> {
        let mut state = self.lock();
        let now = Utc::now();
        Ok(state
            .tasks
            .iter_mut()
            .find(|t| filter.matches(t))
            .map(|t| {
                update.apply(t, now);
                t.clone()
            }))
    }

    async fn update_tasks(&self, filter: &TaskFilter, update: &TaskUpdate) -> Result<u64> {
        let mut state = self.lock();
        if update.status.map_or(false, |s| s.is_active()) {
            let taken = state
                .tasks
                .iter()
                .filter(|t| filter.matches(t) && !t.status.is_active())
                .find(|revived| {
                    let slot = TaskFilter::active_collection(&revived.key);
                    state.tasks.iter().any(|t| slot.matches(t))
                });
            if let Some(revived) = taken {
                return Err(StoreError::WriteFailed(format!(
                    "task {} would duplicate an active task",
                    revived.key
                ))
                .into());
            }
        }
        let now = Utc::now();
        let mut changed = 0;
        for task in state.tasks.iter_mut().filter(|t| filter.matches(t)) {
            update.apply(task, now);
            changed += 1;
        }
        Ok(changed)
    }

    async fn delete_tasks(&self, filter: &TaskFilter) -> Result<u64> {
        let mut state = self.lock();
        let before = state.tasks.len();
        state.tasks.retain(|t| !filter.matches(t));
        Ok((before - state.tasks.len()) as u64)
    }

    async fn busy_workers(&self) -> Result<Vec<WorkerName>> {
        let busy: BTreeSet<WorkerName> = self
            .lock()
            .tasks
            .iter()
            .filter(|t| t.status.is_active())
            .filter_map(|t| t.worker.clone())
            .collect();
        Ok(busy.into_iter().collect())
    }

    async fn last_terminated_window_end(&self, key: &TaskKey) -> Result<Option<DateTime<Utc>>> {
        let same_collection = TaskFilter {
            transaction: None,
            ..TaskFilter::for_task(key)
        }
        .with_statuses(&[Status::Terminated]);
        Ok(self
            .lock()
            .tasks
            .iter()
            .filter(|t| same_collection.matches(t))
            .filter_map(|t| t.window.map(|w| w.end))
            .max())
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn find_source(&self, name: &str) -> Result<Option<SourceProfile>> {
        Ok(self.lock().sources.get(name).cloned())
    }

    async fn save_source(&self, profile: &SourceProfile) -> Result<()> {
        self.lock()
            .sources
            .insert(profile.name.clone(), profile.clone());
        Ok(())
    }

    async fn list_sources(&self) -> Result<Vec<SourceProfile>> {
        Ok(self.lock().sources.values().cloned().collect())
    }

    async fn find_target(&self, name: &str) -> Result<Option<TargetProfile>> {
        Ok(self.lock().targets.get(name).cloned())
    }

    async fn save_target(&self, profile: &TargetProfile) -> Result<()> {
        self.lock()
            .targets
            .insert(profile.name.clone(), profile.clone());
        Ok(())
    }

    async fn list_targets(&self) -> Result<Vec<TargetProfile>> {
        Ok(self.lock().targets.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::{ExportTaskBuilder, Window};
    use chrono::TimeZone;

    const TXN: &str = "6f1c1c1e-8f57-4bd5-a6a9-1e0b3f0f2f41";
    const OTHER: &str = "0b6f0c52-42c4-4a1a-a1d4-3a1f3f7d7b10";

    fn export_key(txn: &str) -> ExportKey {
        ExportKey::new(txn, "s1", "tg1", "db1").unwrap()
    }

    #[tokio::test]
    async fn test_active_export_blocks_triple() {
        let store = MemoryStore::new();
        assert!(store
            .insert_export(&Export::created(export_key(TXN)))
            .await
            .unwrap()
            .is_none());
        let blocker = store
            .insert_export(&Export::created(export_key(OTHER)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(blocker.key, export_key(TXN));

        store
            .update_export_status(&export_key(TXN), Status::Created, Status::Stopped)
            .await
            .unwrap()
            .unwrap();
        assert!(store
            .insert_export(&Export::created(export_key(OTHER)))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_status_swap_requires_expected_status() {
        let store = MemoryStore::new();
        store
            .insert_export(&Export::created(export_key(TXN)))
            .await
            .unwrap();
        assert!(store
            .update_export_status(&export_key(TXN), Status::Running, Status::Terminated)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_last_terminated_window_spans_transactions() {
        let store = MemoryStore::new();
        let at = |s| Utc.timestamp_opt(s, 0).unwrap();
        for (txn, end) in [(TXN, 100), (OTHER, 300)] {
            let task = ExportTaskBuilder::new(export_key(txn).task("a").unwrap())
                .status(Status::Terminated)
                .window(Window {
                    begin: at(0),
                    end: at(end),
                })
                .build();
            store.insert_task(&task).await.unwrap();
        }
        let probe = export_key(TXN).task("a").unwrap();
        assert_eq!(
            store.last_terminated_window_end(&probe).await.unwrap(),
            Some(at(300))
        );
        let other_collection = export_key(TXN).task("b").unwrap();
        assert!(store
            .last_terminated_window_end(&other_collection)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_busy_workers() {
        let store = MemoryStore::new();
        let w1 = WorkerName::new("w1").unwrap();
        let w2 = WorkerName::new("w2").unwrap();
        let running = ExportTaskBuilder::new(export_key(TXN).task("a").unwrap())
            .status(Status::Running)
            .worker(w1.clone())
            .build();
        let done = ExportTaskBuilder::new(export_key(TXN).task("b").unwrap())
            .status(Status::Terminated)
            .worker(w2)
            .build();
        store.insert_task(&running).await.unwrap();
        store.insert_task(&done).await.unwrap();
        assert_eq!(store.busy_workers().await.unwrap(), vec![w1]);
    }
    #[tokio::test]
    async fn test_status_swap_cannot_reactivate_taken_triple() {
        let store = MemoryStore::new();
        store
            .insert_export(&Export::created(export_key(TXN)))
            .await
            .unwrap();
        store
            .update_export_status(&export_key(TXN), Status::Created, Status::Stopped)
            .await
            .unwrap()
            .unwrap();
        store
            .insert_export(&Export::created(export_key(OTHER)))
            .await
            .unwrap();

        assert!(store
            .update_export_status(&export_key(TXN), Status::Stopped, Status::Created)
            .await
            .unwrap()
            .is_none());
        let stopped = store.find_export(&export_key(TXN)).await.unwrap().unwrap();
        assert_eq!(stopped.status, Status::Stopped);
    }

    #[tokio::test]
    async fn test_bulk_update_cannot_reactivate_taken_collection() {
        let store = MemoryStore::new();
        for (txn, status) in [(TXN, Status::Stopped), (OTHER, Status::Created)] {
            let task = ExportTaskBuilder::new(export_key(txn).task("a").unwrap())
                .status(status)
                .build();
            store.insert_task(&task).await.unwrap();
        }

        let revive = TaskFilter::for_export(&export_key(TXN)).with_statuses(&[Status::Stopped]);
        let result = store
            .update_tasks(&revive, &TaskUpdate::status(Status::Created))
            .await;
        assert!(result.is_err());
        let kept = store
            .find_task(&export_key(TXN).task("a").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(kept.status, Status::Stopped);

        // stopping is always allowed
        let stop = TaskFilter::for_export(&export_key(OTHER));
        assert_eq!(
            store
                .update_tasks(&stop, &TaskUpdate::status(Status::Stopped))
                .await
                .unwrap(),
            1
        );
    }
}
