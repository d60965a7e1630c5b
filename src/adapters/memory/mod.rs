//! In-process backends
//!
//! Used by the test suite and by a monolith started with
//! `storage.backend = "memory"`.

pub mod sink;
pub mod source;
pub mod store;

pub use sink::MemorySink;
pub use source::MemorySource;
pub use store::MemoryStore;
