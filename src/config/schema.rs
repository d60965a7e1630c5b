//! Configuration schema types
//!
//! This module defines the configuration structure for Tidewater. Every section
//! except `[application]` is optional and falls back to its `Default`.

use crate::config::{secret_string, SecretString};
use crate::domain::profile::{SourceProfile, TargetProfile};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Process role
///
/// A manager answers commands, a voter schedules, a worker executes tasks and a
/// monolith does all three in one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Manager,
    Voter,
    Worker,
    #[default]
    Monolith,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Manager => "manager",
            Role::Voter => "voter",
            Role::Worker => "worker",
            Role::Monolith => "monolith",
        }
    }
}

/// Orchestration store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// MongoDB collections shared by every process
    #[default]
    MongoDB,
    /// Process-local store, only meaningful for a monolith
    Memory,
}

/// Worker selection policy used by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SelectionKind {
    #[default]
    Random,
    First,
}

/// Main Tidewater configuration
///
/// This is the root configuration structure that maps to the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TidewaterConfig {
    /// Application-level settings
    pub application: ApplicationConfig,

    /// Where exports, tasks and profiles are persisted
    #[serde(default)]
    pub storage: StorageConfig,

    /// Defaults applied to every MongoDB source
    #[serde(default)]
    pub source: SourceConfig,

    /// BigQuery settings shared by every target
    #[serde(default)]
    pub target: TargetConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Settings of the local worker (worker and monolith roles)
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Workers the scheduler may assign tasks to
    #[serde(default)]
    pub workers: Vec<WorkerEndpointConfig>,

    /// Source profiles registered at startup
    #[serde(default)]
    pub sources: Vec<SourceProfile>,

    /// Target profiles registered at startup
    #[serde(default)]
    pub targets: Vec<TargetProfile>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TidewaterConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.storage.validate(self.application.role)?;
        self.source.validate()?;
        self.target.validate()?;
        self.scheduler.validate()?;
        self.worker.validate(self.application.role)?;

        let mut names = HashSet::new();
        for endpoint in &self.workers {
            endpoint.validate()?;
            if !names.insert(endpoint.name.as_str()) {
                return Err(format!("Duplicate worker name '{}'", endpoint.name));
            }
        }
        if self.application.role == Role::Voter && self.workers.is_empty() {
            return Err("role 'voter' requires at least one [[workers]] entry".to_string());
        }

        for profile in &self.sources {
            profile.validate().map_err(|e| e.to_string())?;
        }
        for profile in &self.targets {
            profile.validate().map_err(|e| e.to_string())?;
        }

        self.logging.validate()?;
        Ok(())
    }

    /// Workers known to the scheduler
    ///
    /// A monolith without `[[workers]]` schedules onto its own worker.
    pub fn worker_endpoints(&self) -> Vec<WorkerEndpointConfig> {
        if self.workers.is_empty() && self.application.role == Role::Monolith {
            return vec![WorkerEndpointConfig {
                name: self.worker.name.clone(),
                url: None,
                probe_timeout_ms: default_probe_timeout_ms(),
            }];
        }
        self.workers.clone()
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub role: Role,
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

/// Orchestration store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// MongoDB connection string
    #[serde(default = "default_storage_url")]
    pub url: SecretString,

    #[serde(default = "default_storage_database")]
    pub database: String,

    #[serde(default = "default_exports_collection")]
    pub exports_collection: String,

    #[serde(default = "default_tasks_collection")]
    pub tasks_collection: String,

    #[serde(default = "default_sources_collection")]
    pub sources_collection: String,

    #[serde(default = "default_targets_collection")]
    pub targets_collection: String,
}

impl StorageConfig {
    fn validate(&self, role: Role) -> Result<(), String> {
        if self.backend == StorageBackend::Memory && role != Role::Monolith {
            return Err(format!(
                "storage.backend 'memory' cannot be shared across processes; role '{}' requires 'mongodb'",
                role.as_str()
            ));
        }
        if self.backend == StorageBackend::MongoDB {
            let url = self.url.expose_secret();
            if !(url.as_ref().starts_with("mongodb://") || url.as_ref().starts_with("mongodb+srv://"))
            {
                return Err(
                    "storage.url must start with mongodb:// or mongodb+srv://".to_string(),
                );
            }
        }
        if self.database.trim().is_empty() {
            return Err("storage.database cannot be empty".to_string());
        }
        let collections = [
            &self.exports_collection,
            &self.tasks_collection,
            &self.sources_collection,
            &self.targets_collection,
        ];
        if collections.iter().any(|c| c.trim().is_empty()) {
            return Err("storage collection names cannot be empty".to_string());
        }
        Ok(())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            url: default_storage_url(),
            database: default_storage_database(),
            exports_collection: default_exports_collection(),
            tasks_collection: default_tasks_collection(),
            sources_collection: default_sources_collection(),
            targets_collection: default_targets_collection(),
        }
    }
}

/// Source-wide defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Collection patterns never replicated, on top of each profile's list
    #[serde(default = "default_ignored_collections")]
    pub ignored_collections: Vec<String>,

    /// Server selection timeout used by connectivity probes
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default)]
    pub stamps: StampDefaults,
}

impl SourceConfig {
    fn validate(&self) -> Result<(), String> {
        if self.connect_timeout_ms == 0 {
            return Err("source.connect_timeout_ms must be > 0".to_string());
        }
        self.stamps.validate()
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            ignored_collections: default_ignored_collections(),
            connect_timeout_ms: default_connect_timeout_ms(),
            stamps: StampDefaults::default(),
        }
    }
}

/// Change-stamp candidate fields tried after the profile overrides
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StampDefaults {
    #[serde(default = "default_update_fields")]
    pub update_fields: Vec<String>,

    #[serde(default = "default_insert_fields")]
    pub insert_fields: Vec<String>,
}

impl StampDefaults {
    fn validate(&self) -> Result<(), String> {
        let all = self.update_fields.iter().chain(&self.insert_fields);
        for field in all {
            if field.trim().is_empty() || field.starts_with('$') {
                return Err(format!("Invalid stamp field '{field}'"));
            }
        }
        Ok(())
    }
}

impl Default for StampDefaults {
    fn default() -> Self {
        Self {
            update_fields: default_update_fields(),
            insert_fields: default_insert_fields(),
        }
    }
}

/// BigQuery configuration shared by every target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Prefix of the dataset created per source database
    #[serde(default = "default_dataset_prefix")]
    pub dataset_prefix: String,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_upload_base_url")]
    pub upload_base_url: String,

    /// Dataset location (e.g. "EU"); BigQuery's default when unset
    #[serde(default)]
    pub location: Option<String>,

    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    #[serde(default = "default_job_poll_interval_ms")]
    pub job_poll_interval_ms: u64,

    #[serde(default = "default_job_timeout_seconds")]
    pub job_timeout_seconds: u64,

    /// Attempts at confirming the staging table is gone
    #[serde(default = "default_cleanup_attempts")]
    pub cleanup_attempts: u32,

    #[serde(default = "default_cleanup_delay_ms")]
    pub cleanup_delay_ms: u64,
}

impl TargetConfig {
    fn validate(&self) -> Result<(), String> {
        if self.dataset_prefix.is_empty()
            || !self
                .dataset_prefix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(format!(
                "Invalid target.dataset_prefix '{}'. Use lowercase letters, digits and '_'",
                self.dataset_prefix
            ));
        }
        for url in [&self.api_base_url, &self.upload_base_url] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!("Invalid BigQuery endpoint '{url}'"));
            }
        }
        if self.job_poll_interval_ms == 0 || self.job_timeout_seconds == 0 {
            return Err("target job polling settings must be > 0".to_string());
        }
        if self.cleanup_attempts == 0 {
            return Err("target.cleanup_attempts must be > 0".to_string());
        }
        Ok(())
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            dataset_prefix: default_dataset_prefix(),
            api_base_url: default_api_base_url(),
            upload_base_url: default_upload_base_url(),
            location: None,
            request_timeout_seconds: default_request_timeout_seconds(),
            job_poll_interval_ms: default_job_poll_interval_ms(),
            job_timeout_seconds: default_job_timeout_seconds(),
            cleanup_attempts: default_cleanup_attempts(),
            cleanup_delay_ms: default_cleanup_delay_ms(),
        }
    }
}

/// Scheduler (voter) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    #[serde(default)]
    pub selection: SelectionKind,
}

impl SchedulerConfig {
    fn validate(&self) -> Result<(), String> {
        if self.tick_interval_ms < 100 {
            return Err("scheduler.tick_interval_ms must be >= 100".to_string());
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            selection: SelectionKind::default(),
        }
    }
}

/// Local worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Name this process claims tasks under
    #[serde(default = "default_worker_name")]
    pub name: String,

    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Directory for NDJSON staging files; the system temp dir when unset
    #[serde(default)]
    pub temp_dir: Option<String>,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl WorkerConfig {
    fn validate(&self, role: Role) -> Result<(), String> {
        if matches!(role, Role::Worker | Role::Monolith) && self.name.trim().is_empty() {
            return Err("worker.name cannot be empty".to_string());
        }
        if self.tick_interval_ms < 100 {
            return Err("worker.tick_interval_ms must be >= 100".to_string());
        }
        self.retry.validate()
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: default_worker_name(),
            tick_interval_ms: default_tick_interval_ms(),
            temp_dir: None,
            retry: RetryConfig::default(),
        }
    }
}

/// Bounded retry of one task execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pause after the first failed attempt; it doubles after each further failure
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl RetryConfig {
    fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 || self.max_attempts > 10 {
            return Err("worker.retry.max_attempts must be between 1 and 10".to_string());
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

/// A worker the scheduler may assign tasks to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerEndpointConfig {
    pub name: String,

    /// Base URL answering `GET /health`; the worker is assumed alive without one
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl WorkerEndpointConfig {
    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("[[workers]] name cannot be empty".to_string());
        }
        if let Some(url) = &self.url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!(
                    "Invalid url '{}' for worker '{}'",
                    url, self.name
                ));
            }
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Write JSON logs to rolling files
    #[serde(default = "default_true")]
    pub local_enabled: bool,

    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// "daily" or "size"
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,

    #[serde(default = "default_local_max_size_mb")]
    pub local_max_size_mb: usize,
}

impl LoggingConfig {
    /// Console-only logging, used by short-lived CLI commands
    pub fn console_only() -> Self {
        Self {
            local_enabled: false,
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<(), String> {
        let valid_rotations = ["daily", "size"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }

        if self.local_max_size_mb == 0 {
            return Err("logging.local_max_size_mb must be > 0".to_string());
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: true,
            local_path: default_local_path(),
            local_rotation: default_local_rotation(),
            local_max_size_mb: default_local_max_size_mb(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_storage_url() -> SecretString {
    secret_string("mongodb://localhost:27017".to_string())
}

fn default_storage_database() -> String {
    "tidewater".to_string()
}

fn default_exports_collection() -> String {
    "exports".to_string()
}

fn default_tasks_collection() -> String {
    "export_tasks".to_string()
}

fn default_sources_collection() -> String {
    "sources".to_string()
}

fn default_targets_collection() -> String {
    "targets".to_string()
}

fn default_ignored_collections() -> Vec<String> {
    vec!["system.*".to_string()]
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_update_fields() -> Vec<String> {
    ["updatedAt", "updated_at", "updateDate", "lastModified"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_insert_fields() -> Vec<String> {
    ["createdAt", "created_at", "createDate", "insertedAt"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_dataset_prefix() -> String {
    "raw_mongodb_".to_string()
}

fn default_api_base_url() -> String {
    "https://bigquery.googleapis.com/bigquery/v2".to_string()
}

fn default_upload_base_url() -> String {
    "https://bigquery.googleapis.com/upload/bigquery/v2".to_string()
}

fn default_request_timeout_seconds() -> u64 {
    60
}

fn default_job_poll_interval_ms() -> u64 {
    1000
}

fn default_job_timeout_seconds() -> u64 {
    600
}

fn default_cleanup_attempts() -> u32 {
    5
}

fn default_cleanup_delay_ms() -> u64 {
    500
}

fn default_tick_interval_ms() -> u64 {
    5000
}

fn default_worker_name() -> String {
    "worker-1".to_string()
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    2000
}

fn default_probe_timeout_ms() -> u64 {
    2000
}

fn default_local_path() -> String {
    "/var/log/tidewater".to_string()
}

fn default_local_rotation() -> String {
    "daily".to_string()
}

fn default_local_max_size_mb() -> usize {
    100
}
