//! Export lifecycle
//!
//! [`ExportMachine`] owns the compare-and-swap of export statuses;
//! [`ExportService`] layers the manager commands (profile checks, task
//! cascades, preconditions) on top of it.

pub mod machine;
pub mod service;

pub use machine::ExportMachine;
pub use service::ExportService;
