//! Orchestration store traits
//!
//! Exports, tasks and profiles live in a shared document store. The traits
//! below are the only way the core touches that store. Status changes go
//! through the conditional primitives (`insert_*` guarded by the active slot,
//! `update_export_status`, `find_and_update_task`) which must be atomic per
//! document in every implementation.

use crate::domain::export::Export;
use crate::domain::ids::{ExportKey, TaskKey, WorkerName};
use crate::domain::profile::{SourceProfile, TargetProfile};
use crate::domain::query::{ExportFilter, TaskFilter, TaskUpdate};
use crate::domain::status::Status;
use crate::domain::task::ExportTask;
use crate::domain::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Persistence of exports
#[async_trait]
pub trait ExportStore: Send + Sync {
    /// Inserts `export` unless its (source, target, database) triple already
    /// has an export in created or running status
    ///
    /// # Returns
    ///
    /// `None` when the export was inserted, otherwise the export holding the
    /// active slot.
    async fn insert_export(&self, export: &Export) -> Result<Option<Export>>;

    /// Looks up an export by its full key
    async fn find_export(&self, key: &ExportKey) -> Result<Option<Export>>;

    /// Exports matching `filter`, oldest first
    async fn list_exports(&self, filter: &ExportFilter) -> Result<Vec<Export>>;

    /// Compare-and-swap of the export status
    ///
    /// Sets `next` only if the persisted status is `expected`.
    ///
    /// # Returns
    ///
    /// The updated export, or `None` when nothing matched.
    async fn update_export_status(
        &self,
        key: &ExportKey,
        expected: Status,
        next: Status,
    ) -> Result<Option<Export>>;

    /// Deletes an export, returning how many records were removed
    async fn delete_export(&self, key: &ExportKey) -> Result<u64>;
}

/// Persistence of export tasks
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Inserts `task` unless its (source, target, database, collection) has a
    /// task in created or running status
    ///
    /// # Returns
    ///
    /// `None` when the task was inserted, otherwise the blocking task.
    async fn insert_task(&self, task: &ExportTask) -> Result<Option<ExportTask>>;

    async fn find_task(&self, key: &TaskKey) -> Result<Option<ExportTask>>;

    /// Oldest task matching `filter`
    async fn first_task(&self, filter: &TaskFilter) -> Result<Option<ExportTask>>;

    /// Tasks matching `filter`, oldest first
    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<ExportTask>>;

    async fn count_tasks(&self, filter: &TaskFilter) -> Result<u64>;

    /// Compare-and-swap on the oldest task matching `filter`
    ///
    /// # Returns
    ///
    /// The task after `update` was applied, or `None` when nothing matched.
    async fn find_and_update_task(
        &self,
        filter: &TaskFilter,
        update: &TaskUpdate,
    ) -> Result<Option<ExportTask>>;

    /// Applies `update` to every matching task, returning how many changed
    async fn update_tasks(&self, filter: &TaskFilter, update: &TaskUpdate) -> Result<u64>;

    async fn delete_tasks(&self, filter: &TaskFilter) -> Result<u64>;

    /// Workers referenced by a created or running task
    async fn busy_workers(&self) -> Result<Vec<WorkerName>>;

    /// Latest window end among terminated tasks replicating the same
    /// collection, across every transaction
    async fn last_terminated_window_end(&self, key: &TaskKey) -> Result<Option<DateTime<Utc>>>;
}

/// Persistence of source and target profiles
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find_source(&self, name: &str) -> Result<Option<SourceProfile>>;

    /// Inserts or replaces the profile with the same name
    async fn save_source(&self, profile: &SourceProfile) -> Result<()>;

    async fn list_sources(&self) -> Result<Vec<SourceProfile>>;

    async fn find_target(&self, name: &str) -> Result<Option<TargetProfile>>;

    /// Inserts or replaces the profile with the same name
    async fn save_target(&self, profile: &TargetProfile) -> Result<()>;

    async fn list_targets(&self) -> Result<Vec<TargetProfile>>;
}
