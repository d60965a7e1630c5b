//! Domain models and types for Tidewater.
//!
//! The domain layer provides:
//! - **Identifiers and keys** ([`Transaction`], [`WorkerName`], [`ExportKey`], [`TaskKey`])
//! - **Records** ([`Export`], [`ExportTask`], [`SourceProfile`], [`TargetProfile`])
//! - **Lifecycle** ([`Status`], [`Transition`]) shared by exports and tasks
//! - **Queries** ([`ExportFilter`], [`TaskFilter`], [`TaskUpdate`]) understood by every store
//! - **Error types** ([`TidewaterError`], [`StoreError`], [`BigQueryError`])
//!
//! Keys validate their input on construction, so a value of type
//! [`ExportKey`] always carries a UUID transaction and non-blank names:
//!
//! ```rust
//! use tidewater::domain::ExportKey;
//!
//! assert!(ExportKey::new("not-a-uuid", "s1", "tg1", "db1").is_err());
//! let key = ExportKey::generate("s1", "tg1", "db1").unwrap();
//! assert_eq!(key.task("orders").unwrap().collection, "orders");
//! ```

pub mod errors;
pub mod export;
pub mod ids;
pub mod profile;
pub mod query;
pub mod response;
pub mod result;
pub mod status;
pub mod task;

pub use errors::{BigQueryError, StoreError, TidewaterError};
pub use export::Export;
pub use ids::{ExportKey, TaskKey, Transaction, WorkerName};
pub use profile::{SourceProfile, StampFields, StampOverrides, TargetProfile};
pub use query::{ExportFilter, TaskFilter, TaskUpdate, WorkerMatch};
pub use response::{ListMetadata, ListResponse, TransactionResponse};
pub use result::Result;
pub use status::{Lifecycle, Status, Transition, Verdict};
pub use task::{ExportTask, ExportTaskBuilder, Window};
