//! Source, target and worker-probe traits
//!
//! The worker reads documents through a [`SourceConnector`] and writes them
//! through a [`TargetConnector`]; the scheduler asks a [`WorkerProbe`] whether
//! a worker with a health endpoint is up. Each trait has a production
//! implementation (MongoDB, BigQuery, HTTP) and an in-memory one for tests and
//! single-process runs.

use crate::core::ingest::TableRefs;
use crate::core::scheduler::WorkerEndpoint;
use crate::core::stamp::StampPlan;
use crate::domain::profile::{SourceProfile, TargetProfile};
use crate::domain::task::Window;
use crate::domain::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::path::Path;

/// Documents of one collection as relaxed extended JSON
pub type DocumentStream = BoxStream<'static, Result<serde_json::Value>>;

/// Read side of replication
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Checks that the source answers
    ///
    /// # Errors
    ///
    /// Returns `TidewaterError::BadRequest` when the source is unreachable
    async fn ping(&self, source: &SourceProfile) -> Result<()>;

    /// Every collection name of `database`; ignore lists are applied by the caller
    async fn list_collections(&self, source: &SourceProfile, database: &str)
        -> Result<Vec<String>>;

    /// Number of documents whose effective stamp falls in `window`
    async fn count_window(
        &self,
        source: &SourceProfile,
        database: &str,
        collection: &str,
        plan: &StampPlan,
        window: &Window,
    ) -> Result<u64>;

    /// Streams the documents counted by [`SourceConnector::count_window`]
    async fn stream_window(
        &self,
        source: &SourceProfile,
        database: &str,
        collection: &str,
        plan: &StampPlan,
        window: &Window,
    ) -> Result<DocumentStream>;
}

/// Write side of replication
#[async_trait]
pub trait TargetConnector: Send + Sync {
    /// Checks that the credentials work
    ///
    /// # Errors
    ///
    /// Returns `TidewaterError::BadRequest` when the target is unreachable
    async fn ping(&self, target: &TargetProfile) -> Result<()>;

    /// Creates the dataset, the main table and the staging table if missing
    async fn ensure_tables(&self, target: &TargetProfile, tables: &TableRefs) -> Result<()>;

    /// Appends an NDJSON file of staged rows to `table`
    async fn load_ndjson(
        &self,
        target: &TargetProfile,
        dataset: &str,
        table: &str,
        path: &Path,
    ) -> Result<()>;

    /// Appends to the main table every staged row that is new or changed
    async fn consolidate(&self, target: &TargetProfile, tables: &TableRefs) -> Result<()>;

    async fn table_exists(&self, target: &TargetProfile, dataset: &str, table: &str)
        -> Result<bool>;

    /// Deletes `table`; a missing table is not an error
    async fn drop_table(&self, target: &TargetProfile, dataset: &str, table: &str) -> Result<()>;
}

/// Liveness check of a configured worker
#[async_trait]
pub trait WorkerProbe: Send + Sync {
    async fn is_alive(&self, endpoint: &WorkerEndpoint) -> bool;
}
