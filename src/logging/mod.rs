//! Logging and observability
//!
//! Structured logging through `tracing`, plus a few macros that keep the
//! field names of recurring events (state transitions, retries, swallowed
//! errors) consistent across the scheduler, the worker and the services.
//!
//! ```no_run
//! use tidewater::logging::init_logging;
//! use tidewater::config::LoggingConfig;
//!
//! let _guard = init_logging("info", &LoggingConfig::default()).expect("logging");
//! tracing::info!(worker = "w1", "Worker started");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log a landed state transition
///
/// # Example
///
/// ```no_run
/// use tidewater::log_transition;
///
/// log_transition!("task", "6f1c1c1e-8f57-4bd5-a6a9-1e0b3f0f2f41/db1.orders", "created", "running");
/// ```
#[macro_export]
macro_rules! log_transition {
    ($kind:expr, $key:expr, $from:expr, $to:expr) => {
        tracing::info!(
            kind = $kind,
            key = %$key,
            from = %$from,
            to = %$to,
            "State transition"
        );
    };
}

/// Log an error with context
///
/// # Example
///
/// ```no_run
/// use tidewater::log_error_with_context;
/// use tidewater::domain::TidewaterError;
///
/// let error = TidewaterError::Internal("write did not land".to_string());
/// log_error_with_context!(&error, "Failed to record task error");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        );
    };
}

/// Log a retry attempt
///
/// # Example
///
/// ```no_run
/// use tidewater::log_retry_attempt;
///
/// log_retry_attempt!(2, 5, "load job timed out");
/// ```
#[macro_export]
macro_rules! log_retry_attempt {
    ($attempt:expr, $max_attempts:expr, $reason:expr) => {
        tracing::warn!(
            attempt = $attempt,
            max_attempts = $max_attempts,
            reason = %$reason,
            "Retrying operation"
        );
    };
}
