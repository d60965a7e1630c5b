//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::{Role, SelectionKind, StorageBackend, TidewaterConfig};
use crate::config::secret_string;
use crate::domain::errors::TidewaterError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into TidewaterConfig
/// 4. Applies environment variable overrides (TIDEWATER_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns `TidewaterError::Configuration` if the file is missing or
/// unreadable, a referenced variable is unset, parsing fails or validation
/// rejects a value.
///
/// # Examples
///
/// ```no_run
/// use tidewater::config::loader::load_config;
///
/// let config = load_config("tidewater.toml").expect("Failed to load config");
/// println!("role: {}", config.application.role.as_str());
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<TidewaterConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(TidewaterError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        TidewaterError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    parse_config(&contents)
}

/// Parses configuration text with the same pipeline as [`load_config`]
///
/// # Errors
///
/// See [`load_config`].
pub fn parse_config(contents: &str) -> Result<TidewaterConfig> {
    let contents = substitute_env_vars(contents)?;

    let mut config: TidewaterConfig = toml::from_str(&contents)
        .map_err(|e| TidewaterError::Configuration(format!("Failed to parse TOML: {}", e)))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        TidewaterError::Configuration(format!("Configuration validation failed: {}", e))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are copied untouched.
///
/// # Errors
///
/// Returns an error listing every referenced variable that is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| TidewaterError::Internal(format!("invalid substitution pattern: {e}")))?;
    let mut result = String::with_capacity(input.len());
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let processed = re.replace_all(line, |cap: &regex::Captures<'_>| {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                    String::new()
                }
            }
        });
        result.push_str(&processed);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(TidewaterError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env(name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
            TidewaterError::Configuration(format!("Invalid value '{raw}' for {name}"))
        }),
    }
}

/// Applies environment variable overrides using the TIDEWATER_* prefix
///
/// Variables follow the pattern `TIDEWATER_<SECTION>_<KEY>`, for example
/// `TIDEWATER_STORAGE_URL` or `TIDEWATER_WORKER_NAME`.
///
/// # Errors
///
/// Returns an error when a numeric or enumerated override cannot be parsed
fn apply_env_overrides(config: &mut TidewaterConfig) -> Result<()> {
    if let Some(val) = env("TIDEWATER_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Some(val) = env("TIDEWATER_APPLICATION_ROLE") {
        config.application.role = match val.to_lowercase().as_str() {
            "manager" => Role::Manager,
            "voter" => Role::Voter,
            "worker" => Role::Worker,
            "monolith" => Role::Monolith,
            other => {
                return Err(TidewaterError::Configuration(format!(
                    "Invalid TIDEWATER_APPLICATION_ROLE '{other}'. Must be one of: manager, voter, worker, monolith"
                )))
            }
        };
    }

    if let Some(val) = env("TIDEWATER_STORAGE_BACKEND") {
        config.storage.backend = match val.to_lowercase().as_str() {
            "mongodb" => StorageBackend::MongoDB,
            "memory" => StorageBackend::Memory,
            other => {
                return Err(TidewaterError::Configuration(format!(
                    "Invalid TIDEWATER_STORAGE_BACKEND '{other}'. Must be one of: mongodb, memory"
                )))
            }
        };
    }
    if let Some(val) = env("TIDEWATER_STORAGE_URL") {
        config.storage.url = secret_string(val);
    }
    if let Some(val) = env("TIDEWATER_STORAGE_DATABASE") {
        config.storage.database = val;
    }

    if let Some(val) = env("TIDEWATER_TARGET_DATASET_PREFIX") {
        config.target.dataset_prefix = val;
    }
    if let Some(val) = env("TIDEWATER_TARGET_API_BASE_URL") {
        config.target.api_base_url = val;
    }
    if let Some(val) = env("TIDEWATER_TARGET_LOCATION") {
        config.target.location = Some(val);
    }

    if let Some(ms) = env_parsed("TIDEWATER_SCHEDULER_TICK_INTERVAL_MS")? {
        config.scheduler.tick_interval_ms = ms;
    }
    if let Some(val) = env("TIDEWATER_SCHEDULER_SELECTION") {
        config.scheduler.selection = match val.to_lowercase().as_str() {
            "random" => SelectionKind::Random,
            "first" => SelectionKind::First,
            other => {
                return Err(TidewaterError::Configuration(format!(
                    "Invalid TIDEWATER_SCHEDULER_SELECTION '{other}'. Must be one of: random, first"
                )))
            }
        };
    }

    if let Some(val) = env("TIDEWATER_WORKER_NAME") {
        config.worker.name = val;
    }
    if let Some(ms) = env_parsed("TIDEWATER_WORKER_TICK_INTERVAL_MS")? {
        config.worker.tick_interval_ms = ms;
    }
    if let Some(val) = env("TIDEWATER_WORKER_TEMP_DIR") {
        config.worker.temp_dir = Some(val);
    }
    if let Some(attempts) = env_parsed("TIDEWATER_WORKER_RETRY_MAX_ATTEMPTS")? {
        config.worker.retry.max_attempts = attempts;
    }
    if let Some(ms) = env_parsed("TIDEWATER_WORKER_RETRY_BASE_DELAY_MS")? {
        config.worker.retry.base_delay_ms = ms;
    }

    if let Some(enabled) = env_parsed("TIDEWATER_LOGGING_LOCAL_ENABLED")? {
        config.logging.local_enabled = enabled;
    }
    if let Some(val) = env("TIDEWATER_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_substitute_env_vars() {
        std::env::set_var("TIDEWATER_TEST_SUBST", "test_value");
        let input = "url = \"${TIDEWATER_TEST_SUBST}\"";
        let result = substitute_env_vars(input).unwrap();
        assert_eq!(result, "url = \"test_value\"\n");
        std::env::remove_var("TIDEWATER_TEST_SUBST");
    }

    #[test]
    fn test_substitute_env_vars_missing() {
        std::env::remove_var("TIDEWATER_TEST_MISSING");
        let input = "url = \"${TIDEWATER_TEST_MISSING}\"";
        let err = substitute_env_vars(input).unwrap_err();
        assert!(err.to_string().contains("TIDEWATER_TEST_MISSING"));
    }

    #[test]
    fn test_substitute_skips_comments() {
        std::env::remove_var("TIDEWATER_TEST_COMMENTED");
        let input = "# url = \"${TIDEWATER_TEST_COMMENTED}\"";
        assert!(substitute_env_vars(input).is_ok());
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent-tidewater.toml");
        assert!(matches!(result, Err(TidewaterError::Configuration(_))));
    }

    #[test]
    fn test_load_config_valid() {
        let toml_content = r#"
[application]
log_level = "debug"
role = "manager"

[storage]
url = "mongodb://orchestrator:27017"
database = "tidewater_test"

[[sources]]
name = "s1"
url = "mongodb://source:27017"
ignore = ["audit_*"]

[[targets]]
name = "tg1"
credentials = '{"project_id": "analytics"}'
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.application.role, Role::Manager);
        assert_eq!(config.storage.database, "tidewater_test");
        assert_eq!(
            config.storage.url.expose_secret().as_ref(),
            "mongodb://orchestrator:27017"
        );
        assert_eq!(config.sources[0].ignore, vec!["audit_*".to_string()]);
        assert_eq!(config.targets[0].name, "tg1");
    }

    #[test]
    fn test_invalid_profile_is_rejected() {
        let result = parse_config(
            r#"
[application]

[[targets]]
name = "tg1"
credentials = "not json"
"#,
        );
        let err = result.unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
    }
}
