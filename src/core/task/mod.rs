//! Export task lifecycle
//!
//! [`TaskMachine`] applies single and bulk transitions through the store's
//! compare-and-swap; [`TaskService`] adds fan-out, claiming and queries.

pub mod machine;
pub mod service;

pub use machine::TaskMachine;
pub use service::TaskService;
