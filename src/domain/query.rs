//! Store-agnostic filters and updates
//!
//! Services describe what they want to read or change with these types; each
//! store backend translates them (the MongoDB store into filter and `$set`
//! documents, the in-memory store through [`TaskFilter::matches`] and
//! [`TaskUpdate::apply`]).

use crate::domain::export::Export;
use crate::domain::ids::{ExportKey, TaskKey, Transaction, WorkerName};
use crate::domain::status::Status;
use crate::domain::task::{ExportTask, Window};
use chrono::{DateTime, Utc};

/// Selection of exports; unset fields match anything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportFilter {
    pub transaction: Option<Transaction>,
    pub source: Option<String>,
    pub target: Option<String>,
    pub database: Option<String>,
    /// Empty matches every status
    pub statuses: Vec<Status>,
}

impl ExportFilter {
    pub fn with_statuses(mut self, statuses: &[Status]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    /// Active exports of the key's (source, target, database) triple
    pub fn active_triple(key: &ExportKey) -> Self {
        Self {
            transaction: None,
            source: Some(key.source.clone()),
            target: Some(key.target.clone()),
            database: Some(key.database.clone()),
            statuses: Status::ACTIVE.to_vec(),
        }
    }

    pub fn matches(&self, export: &Export) -> bool {
        let key = &export.key;
        self.transaction
            .as_ref()
            .map_or(true, |t| *t == key.transaction)
            && self.source.as_ref().map_or(true, |s| *s == key.source)
            && self.target.as_ref().map_or(true, |t| *t == key.target)
            && self.database.as_ref().map_or(true, |d| *d == key.database)
            && (self.statuses.is_empty() || self.statuses.contains(&export.status))
    }
}

/// Constraint on the `worker` field of a task
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum WorkerMatch {
    #[default]
    Any,
    Unassigned,
    Assigned(WorkerName),
}

/// Selection of tasks; unset fields match anything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFilter {
    pub transaction: Option<Transaction>,
    pub source: Option<String>,
    pub target: Option<String>,
    pub database: Option<String>,
    pub collection: Option<String>,
    /// Empty matches every status
    pub statuses: Vec<Status>,
    pub worker: WorkerMatch,
}

impl TaskFilter {
    /// Every task of an export
    pub fn for_export(key: &ExportKey) -> Self {
        Self {
            transaction: Some(key.transaction.clone()),
            source: Some(key.source.clone()),
            target: Some(key.target.clone()),
            database: Some(key.database.clone()),
            ..Self::default()
        }
    }

    /// Exactly one task
    pub fn for_task(key: &TaskKey) -> Self {
        Self {
            collection: Some(key.collection.clone()),
            ..Self::for_export(&key.export)
        }
    }

    /// Every task of a transaction, whatever its other key fields say
    pub fn for_transaction(transaction: &Transaction) -> Self {
        Self {
            transaction: Some(transaction.clone()),
            ..Self::default()
        }
    }

    /// Active tasks replicating the same collection, across transactions
    pub fn active_collection(key: &TaskKey) -> Self {
        Self {
            transaction: None,
            statuses: Status::ACTIVE.to_vec(),
            ..Self::for_task(key)
        }
    }

    pub fn with_statuses(mut self, statuses: &[Status]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    pub fn with_worker(mut self, worker: WorkerMatch) -> Self {
        self.worker = worker;
        self
    }

    pub fn matches(&self, task: &ExportTask) -> bool {
        let export = &task.key.export;
        let worker_ok = match &self.worker {
            WorkerMatch::Any => true,
            WorkerMatch::Unassigned => task.worker.is_none(),
            WorkerMatch::Assigned(name) => task.worker.as_ref() == Some(name),
        };
        worker_ok
            && self
                .transaction
                .as_ref()
                .map_or(true, |t| *t == export.transaction)
            && self.source.as_ref().map_or(true, |s| *s == export.source)
            && self.target.as_ref().map_or(true, |t| *t == export.target)
            && self.database.as_ref().map_or(true, |d| *d == export.database)
            && self
                .collection
                .as_ref()
                .map_or(true, |c| *c == task.key.collection)
            && (self.statuses.is_empty() || self.statuses.contains(&task.status))
    }
}

/// Partial update of a task
///
/// `worker` and `error` use a nested option: `Some(None)` clears the field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    pub status: Option<Status>,
    pub worker: Option<Option<WorkerName>>,
    pub error: Option<Option<String>>,
    pub count: Option<u64>,
    pub window: Option<Window>,
}

impl TaskUpdate {
    pub fn status(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn claim(mut self, worker: WorkerName) -> Self {
        self.worker = Some(Some(worker));
        self
    }

    pub fn release(mut self) -> Self {
        self.worker = Some(None);
        self
    }

    pub fn fail(mut self, cause: impl Into<String>) -> Self {
        self.error = Some(Some(cause.into()));
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.error = Some(None);
        self
    }

    pub fn count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    pub fn window(mut self, window: Window) -> Self {
        self.window = Some(window);
        self
    }

    pub fn apply(&self, task: &mut ExportTask, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(worker) = &self.worker {
            task.worker = worker.clone();
        }
        if let Some(error) = &self.error {
            task.error = error.clone();
        }
        if let Some(count) = self.count {
            task.count = count;
        }
        if let Some(window) = self.window {
            task.window = Some(window);
        }
        task.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::ExportTaskBuilder;

    const TXN: &str = "6f1c1c1e-8f57-4bd5-a6a9-1e0b3f0f2f41";
    const OTHER: &str = "0b6f0c52-42c4-4a1a-a1d4-3a1f3f7d7b10";

    fn task(txn: &str, collection: &str) -> ExportTask {
        ExportTask::created(TaskKey::new(txn, "s1", "tg1", "db1", collection).unwrap())
    }

    #[test]
    fn test_export_filter_scopes_to_export() {
        let a = task(TXN, "a");
        let other = task(OTHER, "a");
        let filter = TaskFilter::for_export(&a.key.export);
        assert!(filter.matches(&a));
        assert!(!filter.matches(&other));
    }

    #[test]
    fn test_active_collection_spans_transactions() {
        let a = task(TXN, "a");
        let mut other = task(OTHER, "a");
        let filter = TaskFilter::active_collection(&a.key);
        assert!(filter.matches(&other));
        other.status = Status::Terminated;
        assert!(!filter.matches(&other));
    }

    #[test]
    fn test_worker_match() {
        let w1 = WorkerName::new("w1").unwrap();
        let claimed = ExportTaskBuilder::new(TaskKey::new(TXN, "s1", "tg1", "db1", "a").unwrap())
            .worker(w1.clone())
            .build();
        assert!(!TaskFilter::default()
            .with_worker(WorkerMatch::Unassigned)
            .matches(&claimed));
        assert!(TaskFilter::default()
            .with_worker(WorkerMatch::Assigned(w1))
            .matches(&claimed));
    }

    #[test]
    fn test_update_clears_nested_options() {
        let mut t = ExportTaskBuilder::new(TaskKey::new(TXN, "s1", "tg1", "db1", "a").unwrap())
            .status(Status::Error)
            .worker(WorkerName::new("w1").unwrap())
            .error("boom")
            .count(7)
            .build();
        TaskUpdate::status(Status::Created)
            .release()
            .clear_error()
            .apply(&mut t, Utc::now());
        assert_eq!(t.status, Status::Created);
        assert!(t.worker.is_none());
        assert!(t.error.is_none());
        assert_eq!(t.count, 7);
    }
}
