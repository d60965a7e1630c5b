//! CLI command implementations
//!
//! Every command prints its response as JSON on stdout and returns the
//! process exit code: 0 on success, 2 for client errors (bad input, unknown
//! records, illegal transitions, wrong role) and 5 for everything else.

pub mod export;
pub mod init;
pub mod profile;
pub mod run;
pub mod task;
pub mod validate;

use crate::config::load_config;
use crate::core::engine::Engine;
use crate::domain::{Result, TidewaterError};
use serde::Serialize;

/// Exit code for successful commands
pub const EXIT_OK: i32 = 0;
/// Exit code for errors caused by the caller
pub const EXIT_CLIENT_ERROR: i32 = 2;
/// Exit code for infrastructure failures
pub const EXIT_FATAL: i32 = 5;

pub fn exit_code(error: &TidewaterError) -> i32 {
    if error.is_client_error() {
        EXIT_CLIENT_ERROR
    } else {
        EXIT_FATAL
    }
}

/// Loads the configuration, connects the engine and seeds configured profiles
pub(crate) async fn open_engine(config_path: &str) -> Result<Engine> {
    let config = load_config(config_path)?;
    let engine = Engine::from_config(config).await?;
    engine.seed_profiles().await?;
    Ok(engine)
}

/// Prints `result` as JSON, or the error on stderr, and maps it to an exit code
pub(crate) fn respond<T: Serialize>(result: Result<T>) -> anyhow::Result<i32> {
    match result {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(EXIT_OK)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Command rejected");
            eprintln!("Error: {e}");
            Ok(exit_code(&e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::status::Status;
    use crate::domain::StoreError;

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&TidewaterError::NotFound("x".into())), 2);
        assert_eq!(
            exit_code(&TidewaterError::InvalidStateChange {
                old: Status::Running,
                new: Status::Created,
                valid_from: vec![Status::Error],
            }),
            2
        );
        assert_eq!(
            exit_code(&TidewaterError::Store(StoreError::QueryFailed("x".into()))),
            5
        );
    }

    #[test]
    fn test_respond_maps_errors() {
        let code = respond::<()>(Err(TidewaterError::UnsupportedOperation("x".into()))).unwrap();
        assert_eq!(code, EXIT_CLIENT_ERROR);
        assert_eq!(respond(Ok(serde_json::json!({"ok": true}))).unwrap(), EXIT_OK);
    }
}
