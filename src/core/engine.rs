//! Engine - wiring of stores, connectors and services for one process
//!
//! The engine owns every long-lived handle a process needs and hands out the
//! services its role is allowed to use. Nothing is looked up at runtime; all
//! dependencies are passed in through [`EngineParts`] or built from
//! configuration by [`Engine::from_config`].

use crate::adapters::bigquery::BigQueryConnector;
use crate::adapters::connectors::{SourceConnector, TargetConnector, WorkerProbe};
use crate::adapters::database::{create_stores, ProfileStore, Stores};
use crate::adapters::mongodb::MongoSource;
use crate::adapters::workers::HttpProbe;
use crate::config::{Role, TidewaterConfig};
use crate::core::export::{ExportMachine, ExportService};
use crate::core::ingest::{IngestSettings, Ingestor};
use crate::core::scheduler::{policy_for, Voter, WorkerDirectory};
use crate::core::stamp::StampResolver;
use crate::core::task::{TaskMachine, TaskService};
use crate::core::worker::{Executor, RetryPolicy, WorkerSettings};
use crate::domain::ids::WorkerName;
use crate::domain::profile::{SourceProfile, SourceSummary, TargetProfile, TargetSummary};
use crate::domain::{Result, TidewaterError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Externally built dependencies of an [`Engine`]
pub struct EngineParts {
    pub stores: Stores,
    pub source: Arc<dyn SourceConnector>,
    pub target: Arc<dyn TargetConnector>,
    pub probe: Arc<dyn WorkerProbe>,
}

pub struct Engine {
    config: TidewaterConfig,
    profiles: Arc<dyn ProfileStore>,
    exports: Arc<ExportService>,
    tasks: Arc<TaskService>,
    source: Arc<dyn SourceConnector>,
    target: Arc<dyn TargetConnector>,
    probe: Arc<dyn WorkerProbe>,
}

impl Engine {
    /// Connects the configured store and builds the production connectors
    ///
    /// # Errors
    ///
    /// Returns an error if the orchestration store cannot be reached
    pub async fn from_config(config: TidewaterConfig) -> Result<Self> {
        let stores = create_stores(&config.storage).await?;
        let parts = EngineParts {
            stores,
            source: Arc::new(MongoSource::new(Duration::from_millis(
                config.source.connect_timeout_ms,
            ))),
            target: Arc::new(BigQueryConnector::new(config.target.clone())),
            probe: Arc::new(HttpProbe::new()),
        };
        Ok(Self::with_parts(config, parts))
    }

    pub fn with_parts(config: TidewaterConfig, parts: EngineParts) -> Self {
        let export_machine = Arc::new(ExportMachine::new(parts.stores.exports));
        let tasks = Arc::new(TaskService::new(
            TaskMachine::new(parts.stores.tasks),
            export_machine.clone(),
            parts.source.clone(),
            config.source.ignored_collections.clone(),
        ));
        let exports = Arc::new(ExportService::new(
            export_machine,
            tasks.clone(),
            parts.stores.profiles.clone(),
            parts.source.clone(),
            parts.target.clone(),
        ));

        tracing::debug!(role = config.application.role.as_str(), "Engine assembled");
        Self {
            config,
            profiles: parts.stores.profiles,
            exports,
            tasks,
            source: parts.source,
            target: parts.target,
            probe: parts.probe,
        }
    }

    pub fn role(&self) -> Role {
        self.config.application.role
    }

    pub fn config(&self) -> &TidewaterConfig {
        &self.config
    }

    fn require(&self, operation: &str, roles: &[Role]) -> Result<()> {
        let role = self.role();
        if role == Role::Monolith || roles.contains(&role) {
            return Ok(());
        }
        Err(TidewaterError::UnsupportedOperation(format!(
            "{operation} is not available in role '{}'",
            role.as_str()
        )))
    }

    /// Export commands (manager)
    pub fn exports(&self) -> Result<&ExportService> {
        self.require("export commands", &[Role::Manager])?;
        Ok(&self.exports)
    }

    /// Task queries (manager)
    pub fn tasks(&self) -> Result<&TaskService> {
        self.require("task commands", &[Role::Manager])?;
        Ok(&self.tasks)
    }

    /// Validates, probes and saves a source profile
    pub async fn add_source(&self, profile: SourceProfile) -> Result<SourceSummary> {
        self.require("source registration", &[Role::Manager])?;
        profile.validate()?;
        self.source
            .ping(&profile)
            .await
            .map_err(|e| TidewaterError::unreachable(&format!("source '{}'", profile.name), e))?;
        self.profiles.save_source(&profile).await?;
        tracing::info!(source = %profile.name, "Source registered");
        Ok(profile.summary())
    }

    /// Validates, probes and saves a target profile
    pub async fn add_target(&self, profile: TargetProfile) -> Result<TargetSummary> {
        self.require("target registration", &[Role::Manager])?;
        profile.validate()?;
        self.target
            .ping(&profile)
            .await
            .map_err(|e| TidewaterError::unreachable(&format!("target '{}'", profile.name), e))?;
        self.profiles.save_target(&profile).await?;
        tracing::info!(target = %profile.name, "Target registered");
        Ok(profile.summary())
    }

    pub async fn list_sources(&self) -> Result<Vec<SourceSummary>> {
        self.require("source listing", &[Role::Manager])?;
        let profiles = self.profiles.list_sources().await?;
        Ok(profiles.iter().map(SourceProfile::summary).collect())
    }

    pub async fn list_targets(&self) -> Result<Vec<TargetSummary>> {
        self.require("target listing", &[Role::Manager])?;
        let profiles = self.profiles.list_targets().await?;
        Ok(profiles.iter().map(TargetProfile::summary).collect())
    }

    /// Saves the profiles listed in configuration
    ///
    /// Profiles are stored without a connectivity probe so that a process can
    /// start while a source is down; export creation probes them anyway.
    pub async fn seed_profiles(&self) -> Result<usize> {
        for profile in &self.config.sources {
            profile.validate()?;
            self.profiles.save_source(profile).await?;
        }
        for profile in &self.config.targets {
            profile.validate()?;
            self.profiles.save_target(profile).await?;
        }
        let seeded = self.config.sources.len() + self.config.targets.len();
        if seeded > 0 {
            tracing::info!(profiles = seeded, "Seeded profiles from configuration");
        }
        Ok(seeded)
    }

    /// Scheduler loop over the configured workers
    pub fn voter(&self) -> Result<Voter> {
        self.require("the voter loop", &[Role::Voter])?;
        let directory =
            WorkerDirectory::from_config(&self.config.worker_endpoints(), self.probe.clone())?;
        Ok(Voter::new(
            self.tasks.clone(),
            self.exports.clone(),
            directory,
            policy_for(self.config.scheduler.selection),
            Duration::from_millis(self.config.scheduler.tick_interval_ms),
        ))
    }

    /// Worker loop claiming tasks as `name`, or as the configured worker name
    pub fn executor(&self, name: Option<&str>) -> Result<Executor> {
        self.require("the worker loop", &[Role::Worker])?;
        let worker = &self.config.worker;
        let settings = WorkerSettings {
            name: WorkerName::new(name.unwrap_or(&worker.name))?,
            tick_interval: Duration::from_millis(worker.tick_interval_ms),
            retry: RetryPolicy::from_config(&worker.retry),
        };
        let ingest = IngestSettings {
            temp_dir: worker
                .temp_dir
                .as_ref()
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            dataset_prefix: self.config.target.dataset_prefix.clone(),
            cleanup_attempts: self.config.target.cleanup_attempts,
            cleanup_delay: Duration::from_millis(self.config.target.cleanup_delay_ms),
        };
        Ok(Executor::new(
            settings,
            self.tasks.clone(),
            self.profiles.clone(),
            Ingestor::new(self.source.clone(), self.target.clone(), ingest),
            StampResolver::new(self.config.source.stamps.clone()),
        ))
    }
}
