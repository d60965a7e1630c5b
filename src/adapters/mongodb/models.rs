//! Stored document shapes
//!
//! Domain records convert into these before they hit MongoDB so that dates
//! are native BSON dates and the derived `active` flag used by the partial
//! unique indexes is always in sync with `status`.

use crate::domain::export::Export;
use crate::domain::ids::{ExportKey, TaskKey, WorkerName};
use crate::domain::status::Status;
use crate::domain::task::{ExportTask, Window};
use crate::domain::{Result, StoreError};
use chrono::{DateTime, TimeZone, Utc};
use mongodb::bson::DateTime as BsonDateTime;
use serde::{Deserialize, Serialize};

pub fn to_bson_date(value: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_millis(value.timestamp_millis())
}

pub fn from_bson_date(value: BsonDateTime) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(value.timestamp_millis())
        .single()
        .unwrap_or_default()
}

fn invalid(e: impl std::fmt::Display) -> crate::domain::TidewaterError {
    StoreError::InvalidDocument(e.to_string()).into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDocument {
    pub transaction: String,
    pub source: String,
    pub target: String,
    pub database: String,
    pub status: Status,
    #[serde(default)]
    pub active: bool,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

impl From<&Export> for ExportDocument {
    fn from(export: &Export) -> Self {
        Self {
            transaction: export.key.transaction.to_string(),
            source: export.key.source.clone(),
            target: export.key.target.clone(),
            database: export.key.database.clone(),
            status: export.status,
            active: export.status.is_active(),
            created_at: to_bson_date(export.created_at),
            updated_at: to_bson_date(export.updated_at),
        }
    }
}

impl TryFrom<ExportDocument> for Export {
    type Error = crate::domain::TidewaterError;

    fn try_from(doc: ExportDocument) -> Result<Self> {
        let key = ExportKey::new(&doc.transaction, &doc.source, &doc.target, &doc.database)
            .map_err(invalid)?;
        Ok(Export {
            key,
            status: doc.status,
            created_at: from_bson_date(doc.created_at),
            updated_at: from_bson_date(doc.updated_at),
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WindowDocument {
    pub begin: BsonDateTime,
    pub end: BsonDateTime,
}

impl From<Window> for WindowDocument {
    fn from(window: Window) -> Self {
        Self {
            begin: to_bson_date(window.begin),
            end: to_bson_date(window.end),
        }
    }
}

impl From<WindowDocument> for Window {
    fn from(doc: WindowDocument) -> Self {
        Window {
            begin: from_bson_date(doc.begin),
            end: from_bson_date(doc.end),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDocument {
    pub transaction: String,
    pub source: String,
    pub target: String,
    pub database: String,
    pub collection: String,
    pub status: Status,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub worker: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub window: Option<WindowDocument>,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

impl From<&ExportTask> for TaskDocument {
    fn from(task: &ExportTask) -> Self {
        let export = &task.key.export;
        Self {
            transaction: export.transaction.to_string(),
            source: export.source.clone(),
            target: export.target.clone(),
            database: export.database.clone(),
            collection: task.key.collection.clone(),
            status: task.status,
            active: task.status.is_active(),
            worker: task.worker.as_ref().map(|w| w.as_str().to_string()),
            error: task.error.clone(),
            count: i64::try_from(task.count).unwrap_or(i64::MAX),
            window: task.window.map(WindowDocument::from),
            created_at: to_bson_date(task.created_at),
            updated_at: to_bson_date(task.updated_at),
        }
    }
}

impl TryFrom<TaskDocument> for ExportTask {
    type Error = crate::domain::TidewaterError;

    fn try_from(doc: TaskDocument) -> Result<Self> {
        let key = TaskKey::new(
            &doc.transaction,
            &doc.source,
            &doc.target,
            &doc.database,
            &doc.collection,
        )
        .map_err(invalid)?;
        let worker = doc.worker.map(WorkerName::new).transpose().map_err(invalid)?;
        Ok(ExportTask {
            key,
            status: doc.status,
            worker,
            error: doc.error,
            count: u64::try_from(doc.count).unwrap_or_default(),
            window: doc.window.map(Window::from),
            created_at: from_bson_date(doc.created_at),
            updated_at: from_bson_date(doc.updated_at),
        })
    }
}
