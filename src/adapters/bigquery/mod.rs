//! BigQuery adapter
//!
//! Tokens come from the target profile's service-account key through
//! `gcp_auth`; every API call goes through `reqwest`.

pub mod auth;
pub mod client;
pub mod connector;

pub use auth::{ServiceAccountTokenSource, StaticTokenSource, TokenSource};
pub use client::BigQueryClient;
pub use connector::BigQueryConnector;
