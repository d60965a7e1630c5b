//! Task scheduling (voter role)
//!
//! A polling loop that hands created tasks to free workers and advances
//! exports once their tasks moved on. The worker choice is delegated to a
//! [`SelectionPolicy`] so tests can make it deterministic.

pub mod directory;
pub mod selection;
pub mod voter;

pub use directory::{WorkerDirectory, WorkerEndpoint};
pub use selection::{policy_for, FirstSelection, RandomSelection, SelectionPolicy};
pub use voter::{TickReport, Voter};
