//! Integration tests for logging functionality

use tempfile::TempDir;
use tidewater::config::LoggingConfig;
use tidewater::domain::ids::ExportKey;
use tidewater::domain::status::Status;
use tidewater::domain::TidewaterError;
use tidewater::logging::init_logging;

#[test]
fn test_logging_config_default() {
    let config = LoggingConfig::default();
    assert!(config.local_enabled);
    assert_eq!(config.local_rotation, "daily");
    assert_eq!(config.local_max_size_mb, 100);
}

#[test]
fn test_console_only_disables_files() {
    let config = LoggingConfig::console_only();
    assert!(!config.local_enabled);
    assert_eq!(config.local_rotation, LoggingConfig::default().local_rotation);
}

// The global subscriber can only be installed once per process, so this is the
// only test in this file that initializes logging.
#[test]
fn test_init_creates_log_directory_and_accepts_macros() {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("logs");
    let config = LoggingConfig {
        local_enabled: true,
        local_path: log_path.to_string_lossy().to_string(),
        local_rotation: "daily".to_string(),
        local_max_size_mb: 10,
    };
    assert!(!log_path.exists());

    let guard = init_logging("debug", &config).unwrap();
    assert!(log_path.is_dir());

    let key = ExportKey::generate("s1", "tg1", "db1").unwrap();
    tidewater::log_transition!("export", key, Status::Created, Status::Running);
    tidewater::log_retry_attempt!(1, 5, "load job timed out");
    let error = TidewaterError::Internal("write did not land".to_string());
    tidewater::log_error_with_context!(&error, "Failed to record task error");

    drop(guard);
}

#[test]
fn test_unknown_level_is_rejected() {
    let result = init_logging("verbose", &LoggingConfig::console_only());
    assert!(matches!(result, Err(TidewaterError::Configuration(_))));
}
