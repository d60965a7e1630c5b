//! NDJSON staging file
//!
//! Rows are buffered into a named temporary file before the load job. The
//! file is removed when the returned [`TempPath`] is dropped, whether or not
//! the load succeeded.

use crate::core::ingest::row::StagedRow;
use crate::domain::{Result, TidewaterError};
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

pub struct StagingFile {
    writer: BufWriter<File>,
    path: TempPath,
    rows: u64,
}

impl StagingFile {
    /// Creates an empty staging file in `dir`
    ///
    /// # Errors
    ///
    /// Returns `TidewaterError::Io` if the file cannot be created
    pub async fn create(dir: &Path) -> Result<Self> {
        let dir: PathBuf = dir.to_path_buf();
        let named = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix("tidewater-")
                .suffix(".ndjson")
                .tempfile_in(dir)
        })
        .await
        .map_err(|e| TidewaterError::Internal(format!("staging file task failed: {e}")))??;
        let (file, path) = named.into_parts();
        Ok(Self {
            writer: BufWriter::new(File::from_std(file)),
            path,
            rows: 0,
        })
    }

    pub async fn append(&mut self, row: &StagedRow) -> Result<()> {
        let mut line = serde_json::to_vec(row)?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Flushes the buffer and hands over the path for loading
    pub async fn finish(mut self) -> Result<TempPath> {
        self.writer.flush().await?;
        self.writer.into_inner().sync_all().await?;
        Ok(self.path)
    }
}
