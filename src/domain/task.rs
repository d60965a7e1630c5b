//! Export task record and extraction window
//!
//! A task replicates one collection of an export. The window it records is the
//! `(begin, end]` interval of change stamps extracted by its last claim; the
//! next run for the same collection resumes from the end of the latest
//! terminated window.

use crate::domain::ids::{TaskKey, WorkerName};
use crate::domain::status::Status;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Half-open extraction interval `(begin, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    /// Window resuming after `last_end`, or from the epoch when nothing ran yet
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use tidewater::domain::task::Window;
    ///
    /// let now = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
    /// let window = Window::resume(None, now);
    /// assert_eq!(window.begin.timestamp(), 0);
    /// assert_eq!(window.end, now);
    /// ```
    pub fn resume(last_end: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        let begin = last_end.unwrap_or_else(epoch);
        Self {
            begin,
            end: now.max(begin),
        }
    }

    /// Begin is exclusive, end inclusive
    pub fn contains(&self, stamp: DateTime<Utc>) -> bool {
        stamp > self.begin && stamp <= self.end
    }
}

fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(0, 0).single().unwrap_or_default()
}

/// Persisted export task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportTask {
    #[serde(flatten)]
    pub key: TaskKey,
    pub status: Status,
    pub worker: Option<WorkerName>,
    pub error: Option<String>,
    /// Rows ingested by the last successful run
    pub count: u64,
    pub window: Option<Window>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExportTask {
    /// A new unassigned task in `created` status
    pub fn created(key: TaskKey) -> Self {
        ExportTaskBuilder::new(key).build()
    }

    /// Created and not yet claimed by any worker
    pub fn is_schedulable(&self) -> bool {
        self.status == Status::Created && self.worker.is_none()
    }

    /// Whether this task keeps `worker` busy
    pub fn occupies(&self, worker: &WorkerName) -> bool {
        self.status.is_active() && self.worker.as_ref() == Some(worker)
    }
}

/// Builder for [`ExportTask`], mostly used to seed stores in tests
pub struct ExportTaskBuilder {
    key: TaskKey,
    status: Status,
    worker: Option<WorkerName>,
    error: Option<String>,
    count: u64,
    window: Option<Window>,
}

impl ExportTaskBuilder {
    pub fn new(key: TaskKey) -> Self {
        Self {
            key,
            status: Status::Created,
            worker: None,
            error: None,
            count: 0,
            window: None,
        }
    }

    pub fn status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn worker(mut self, worker: WorkerName) -> Self {
        self.worker = Some(worker);
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }

    pub fn window(mut self, window: Window) -> Self {
        self.window = Some(window);
        self
    }

    pub fn build(self) -> ExportTask {
        let now = Utc::now();
        ExportTask {
            key: self.key,
            status: self.status,
            worker: self.worker,
            error: self.error,
            count: self.count,
            window: self.window,
            created_at: now,
            updated_at: now,
        }
    }
}
