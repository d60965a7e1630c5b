//! Domain error types
//!
//! This module defines the error hierarchy for Tidewater. Orchestration errors
//! (bad input, missing records, illegal transitions) are kept apart from the
//! infrastructure errors raised by the store and the columnar sink, and none of
//! them expose third-party types.

use crate::domain::status::Status;
use thiserror::Error;

/// Main Tidewater error type
///
/// Every fallible operation of the engine returns this type. The first four
/// variants are client errors (see [`TidewaterError::is_client_error`]); the
/// rest describe infrastructure failures.
#[derive(Debug, Error)]
pub enum TidewaterError {
    /// Malformed input, failed precondition or unreachable connection
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A referenced export, task or profile does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The persisted status does not allow the requested transition
    #[error(
        "Invalid state change from '{old}' to '{new}' (valid from: {})",
        join_statuses(.valid_from)
    )]
    InvalidStateChange {
        old: Status,
        new: Status,
        valid_from: Vec<Status>,
    },

    /// The operation is not served by the configured process role
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A write that should have landed did not
    #[error("Internal error: {0}")]
    Internal(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Orchestration store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Replication source errors
    #[error("Source error: {0}")]
    Source(String),

    /// BigQuery errors
    #[error("BigQuery error: {0}")]
    BigQuery(#[from] BigQueryError),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),
}

impl TidewaterError {
    /// Wraps a failed connectivity probe into a client error
    ///
    /// # Arguments
    ///
    /// * `what` - Human readable name of the endpoint, e.g. `source 's1'`
    /// * `cause` - The underlying failure
    pub fn unreachable(what: &str, cause: impl std::fmt::Display) -> Self {
        TidewaterError::BadRequest(format!("{what} is unreachable: {cause}"))
    }

    /// Returns true for errors caused by the caller rather than the system
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            TidewaterError::BadRequest(_)
                | TidewaterError::NotFound(_)
                | TidewaterError::InvalidStateChange { .. }
                | TidewaterError::UnsupportedOperation(_)
        )
    }
}

fn join_statuses(statuses: &[Status]) -> String {
    statuses
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Orchestration store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection to the store failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query or aggregation failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Insert, update or delete failed
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// Index creation failed
    #[error("Index creation failed: {0}")]
    IndexFailed(String),

    /// A stored document could not be decoded
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
}

/// BigQuery REST and job errors
#[derive(Debug, Error)]
pub enum BigQueryError {
    /// Service-account token could not be obtained
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The REST API answered with a non-success status
    #[error("Request failed with status {status}: {message}")]
    RequestFailed { status: u16, message: String },

    /// The request never reached the API
    #[error("Transport error: {0}")]
    Transport(String),

    /// A load or query job finished with an error result
    #[error("Job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    /// A job did not reach DONE in time
    #[error("Job {0} timed out")]
    Timeout(String),

    /// Response body could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Staging table survived every deletion attempt
    #[error("Table {0} still exists after cleanup")]
    CleanupFailed(String),
}

impl From<std::io::Error> for TidewaterError {
    fn from(err: std::io::Error) -> Self {
        TidewaterError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TidewaterError {
    fn from(err: serde_json::Error) -> Self {
        TidewaterError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for TidewaterError {
    fn from(err: toml::de::Error) -> Self {
        TidewaterError::Configuration(format!("TOML parse error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tidewater_error_display() {
        let err = TidewaterError::Configuration("Invalid config".to_string());
        assert_eq!(err.to_string(), "Configuration error: Invalid config");
    }

    #[test]
    fn test_invalid_state_change_display() {
        let err = TidewaterError::InvalidStateChange {
            old: Status::Stopped,
            new: Status::Created,
            valid_from: vec![Status::Error],
        };
        assert_eq!(
            err.to_string(),
            "Invalid state change from 'stopped' to 'created' (valid from: error)"
        );
    }

    #[test]
    fn test_client_errors() {
        assert!(TidewaterError::BadRequest("x".into()).is_client_error());
        assert!(TidewaterError::NotFound("x".into()).is_client_error());
        assert!(TidewaterError::UnsupportedOperation("x".into()).is_client_error());
        assert!(!TidewaterError::Internal("x".into()).is_client_error());
        assert!(!TidewaterError::Store(StoreError::WriteFailed("x".into())).is_client_error());
    }

    #[test]
    fn test_unreachable_is_bad_request() {
        let err = TidewaterError::unreachable("source 's1'", "connection refused");
        assert!(matches!(err, TidewaterError::BadRequest(_)));
        assert_eq!(
            err.to_string(),
            "Bad request: source 's1' is unreachable: connection refused"
        );
    }

    #[test]
    fn test_store_error_conversion() {
        let err: TidewaterError = StoreError::QueryFailed("timeout".to_string()).into();
        assert!(matches!(err, TidewaterError::Store(_)));
    }

    #[test]
    fn test_bigquery_error_conversion() {
        let err: TidewaterError = BigQueryError::RequestFailed {
            status: 403,
            message: "denied".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "BigQuery error: Request failed with status 403: denied"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: TidewaterError = io_err.into();
        assert!(matches!(err, TidewaterError::Io(_)));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: TidewaterError = json_err.into();
        assert!(matches!(err, TidewaterError::Serialization(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let err: TidewaterError = toml_err.into();
        assert!(matches!(err, TidewaterError::Configuration(_)));
        assert!(err.to_string().contains("TOML parse error"));
    }
}
