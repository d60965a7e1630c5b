//! Task execution (worker role)

pub mod executor;
pub mod retry;

pub use executor::{Executor, Outcome, WorkerSettings};
pub use retry::RetryPolicy;
