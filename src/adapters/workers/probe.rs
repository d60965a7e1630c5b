//! HTTP health probe of worker processes

use crate::adapters::connectors::WorkerProbe;
use crate::core::scheduler::WorkerEndpoint;
use async_trait::async_trait;
use reqwest::Client;

/// `GET {url}/health` answered with a 2xx status means alive
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkerProbe for HttpProbe {
    async fn is_alive(&self, endpoint: &WorkerEndpoint) -> bool {
        let Some(base) = &endpoint.url else {
            return true;
        };
        let url = format!("{}/health", base.trim_end_matches('/'));
        match self.client.get(&url).timeout(endpoint.timeout).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                tracing::debug!(worker = %endpoint.name, status = %resp.status(), "Health probe refused");
                false
            }
            Err(e) => {
                tracing::debug!(worker = %endpoint.name, error = %e, "Health probe failed");
                false
            }
        }
    }
}

/// Probe that reports every worker alive
///
/// Used when all workers run inside this process.
pub struct AlwaysAlive;

#[async_trait]
impl WorkerProbe for AlwaysAlive {
    async fn is_alive(&self, _endpoint: &WorkerEndpoint) -> bool {
        true
    }
}
