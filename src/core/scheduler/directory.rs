//! Configured workers and their availability

use crate::adapters::connectors::WorkerProbe;
use crate::config::WorkerEndpointConfig;
use crate::domain::ids::WorkerName;
use crate::domain::Result;
use std::sync::Arc;
use std::time::Duration;

/// A worker the scheduler may hand tasks to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerEndpoint {
    pub name: WorkerName,
    /// Base URL of the health endpoint; no URL means always alive
    pub url: Option<String>,
    pub timeout: Duration,
}

impl WorkerEndpoint {
    pub fn from_config(config: &WorkerEndpointConfig) -> Result<Self> {
        Ok(Self {
            name: WorkerName::new(&config.name)?,
            url: config.url.clone(),
            timeout: Duration::from_millis(config.probe_timeout_ms),
        })
    }
}

/// Static worker list plus the probe used to check it
pub struct WorkerDirectory {
    endpoints: Vec<WorkerEndpoint>,
    probe: Arc<dyn WorkerProbe>,
}

impl WorkerDirectory {
    pub fn new(endpoints: Vec<WorkerEndpoint>, probe: Arc<dyn WorkerProbe>) -> Self {
        Self { endpoints, probe }
    }

    pub fn from_config(configs: &[WorkerEndpointConfig], probe: Arc<dyn WorkerProbe>) -> Result<Self> {
        let endpoints = configs
            .iter()
            .map(WorkerEndpoint::from_config)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(endpoints, probe))
    }

    pub fn endpoints(&self) -> &[WorkerEndpoint] {
        &self.endpoints
    }

    /// Configured workers that are not busy and answer their probe
    ///
    /// Keeps configuration order.
    pub async fn free_workers(&self, busy: &[WorkerName]) -> Vec<WorkerEndpoint> {
        let mut free = Vec::new();
        for endpoint in self.endpoints.iter().filter(|e| !busy.contains(&e.name)) {
            if endpoint.url.is_some() && !self.probe.is_alive(endpoint).await {
                tracing::warn!(worker = %endpoint.name, "Worker failed its health probe");
                continue;
            }
            free.push(endpoint.clone());
        }
        free
    }
}
