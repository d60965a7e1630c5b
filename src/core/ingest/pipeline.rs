//! One extraction run of a task
//!
//! count → ensure tables → stream to NDJSON → load into staging → consolidate
//! → drop staging. An empty window stops after the count and never touches
//! the target.

use crate::adapters::connectors::{SourceConnector, TargetConnector};
use crate::core::ingest::naming::TableRefs;
use crate::core::ingest::row::StagedRow;
use crate::core::ingest::staging::StagingFile;
use crate::core::stamp::StampPlan;
use crate::domain::errors::BigQueryError;
use crate::domain::profile::{SourceProfile, TargetProfile};
use crate::domain::task::{ExportTask, Window};
use crate::domain::Result;
use chrono::Utc;
use futures::TryStreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Settings of the ingestion pipeline
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub temp_dir: PathBuf,
    pub dataset_prefix: String,
    pub cleanup_attempts: u32,
    pub cleanup_delay: Duration,
}

/// Inputs of one run
pub struct IngestJob<'a> {
    pub task: &'a ExportTask,
    pub source: &'a SourceProfile,
    pub target: &'a TargetProfile,
    pub plan: &'a StampPlan,
    pub window: &'a Window,
}

pub struct Ingestor {
    source: Arc<dyn SourceConnector>,
    target: Arc<dyn TargetConnector>,
    settings: IngestSettings,
}

impl Ingestor {
    pub fn new(
        source: Arc<dyn SourceConnector>,
        target: Arc<dyn TargetConnector>,
        settings: IngestSettings,
    ) -> Self {
        Self {
            source,
            target,
            settings,
        }
    }

    /// Runs the pipeline and returns the number of rows staged
    ///
    /// # Errors
    ///
    /// Any source, file or target failure aborts the run; the staging table
    /// may be left behind and is reused by the next attempt.
    pub async fn ingest(&self, job: IngestJob<'_>) -> Result<u64> {
        let key = &job.task.key;
        let database = key.export.database.as_str();
        let collection = key.collection.as_str();

        let expected = self
            .source
            .count_window(job.source, database, collection, job.plan, job.window)
            .await?;
        if expected == 0 {
            tracing::info!(task = %key, "No documents in window");
            return Ok(0);
        }

        let tables = TableRefs::for_task(&self.settings.dataset_prefix, key);
        self.target.ensure_tables(job.target, &tables).await?;

        let mut file = StagingFile::create(&self.settings.temp_dir).await?;
        let mut documents = self
            .source
            .stream_window(job.source, database, collection, job.plan, job.window)
            .await?;
        while let Some(doc) = documents.try_next().await? {
            file.append(&StagedRow::from_document(doc, Utc::now())?)
                .await?;
        }
        let rows = file.rows();
        let path = file.finish().await?;
        tracing::debug!(task = %key, expected, rows, "Staged documents");

        self.target
            .load_ndjson(job.target, &tables.dataset, &tables.staging, &path)
            .await?;
        drop(path);

        self.target.consolidate(job.target, &tables).await?;
        self.drop_staging(job.target, &tables).await?;

        tracing::info!(
            task = %key,
            rows,
            dataset = %tables.dataset,
            table = %tables.main,
            "Consolidated window"
        );
        Ok(rows)
    }

    /// Deletes the staging table and waits until it is really gone
    async fn drop_staging(&self, target: &TargetProfile, tables: &TableRefs) -> Result<()> {
        for attempt in 1..=self.settings.cleanup_attempts {
            self.target
                .drop_table(target, &tables.dataset, &tables.staging)
                .await?;
            if !self
                .target
                .table_exists(target, &tables.dataset, &tables.staging)
                .await?
            {
                return Ok(());
            }
            tracing::debug!(attempt, table = %tables.staging, "Staging table still visible");
            tokio::time::sleep(self.settings.cleanup_delay).await;
        }
        Err(BigQueryError::CleanupFailed(format!("{}.{}", tables.dataset, tables.staging)).into())
    }
}
