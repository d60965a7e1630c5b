//! MongoDB adapter
//!
//! MongoDB plays two roles: the shared orchestration store ([`MongoStore`])
//! and the replication source ([`MongoSource`]).

pub mod client;
pub mod filter;
pub mod models;
pub mod source;
pub mod store;

pub use client::MongoClient;
pub use source::MongoSource;
pub use store::MongoStore;
