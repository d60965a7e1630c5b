//! Worker liveness probes used by the scheduler

pub mod probe;

pub use probe::{AlwaysAlive, HttpProbe};
