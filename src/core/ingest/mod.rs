//! Ingestion and consolidation
//!
//! Documents are staged as `(id STRING, insertedAt TIMESTAMP, data STRING,
//! hash STRING)` rows in a transaction-scoped staging table, then merged into
//! the collection's durable main table.

pub mod consolidate;
pub mod naming;
pub mod pipeline;
pub mod row;
pub mod staging;

pub use consolidate::{merge_sql, select_new_rows};
pub use naming::{sanitize, TableRefs};
pub use pipeline::{IngestJob, IngestSettings, Ingestor};
pub use row::StagedRow;
pub use staging::StagingFile;
