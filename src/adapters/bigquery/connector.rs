//! [`TargetConnector`] backed by the BigQuery REST API

use crate::adapters::bigquery::auth::{project_id, ServiceAccountTokenSource, TokenSource};
use crate::adapters::bigquery::client::BigQueryClient;
use crate::adapters::connectors::TargetConnector;
use crate::config::TargetConfig;
use crate::core::ingest::row::row_hash;
use crate::core::ingest::{merge_sql, TableRefs};
use crate::domain::profile::TargetProfile;
use crate::domain::Result;
use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Keeps one client per target profile, rebuilt when its key changes
pub struct BigQueryConnector {
    config: TargetConfig,
    token_override: Option<Arc<dyn TokenSource>>,
    clients: Mutex<HashMap<String, (String, Arc<BigQueryClient>)>>,
}

impl BigQueryConnector {
    pub fn new(config: TargetConfig) -> Self {
        Self {
            config,
            token_override: None,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Uses `tokens` for every target instead of minting service-account tokens
    pub fn with_token_source(config: TargetConfig, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            token_override: Some(tokens),
            ..Self::new(config)
        }
    }

    async fn client(&self, target: &TargetProfile) -> Result<Arc<BigQueryClient>> {
        let credentials = target.credentials.expose_secret().as_ref();
        let fingerprint = row_hash(credentials);

        let mut clients = self.clients.lock().await;
        if let Some((cached, client)) = clients.get(&target.name) {
            if *cached == fingerprint {
                return Ok(Arc::clone(client));
            }
        }

        let project = project_id(credentials)?;
        let tokens: Arc<dyn TokenSource> = match &self.token_override {
            Some(tokens) => Arc::clone(tokens),
            None => Arc::new(ServiceAccountTokenSource::from_json(credentials)?),
        };
        let client = Arc::new(BigQueryClient::new(&self.config, project, tokens)?);
        tracing::debug!(target = %target.name, project = %client.project(), "BigQuery client ready");
        clients.insert(target.name.clone(), (fingerprint, Arc::clone(&client)));
        Ok(client)
    }
}

#[async_trait]
impl TargetConnector for BigQueryConnector {
    async fn ping(&self, target: &TargetProfile) -> Result<()> {
        self.client(target).await?.ping().await?;
        Ok(())
    }

    async fn ensure_tables(&self, target: &TargetProfile, tables: &TableRefs) -> Result<()> {
        let client = self.client(target).await?;
        client.ensure_dataset(&tables.dataset).await?;
        client.ensure_table(&tables.dataset, &tables.main).await?;
        client.ensure_table(&tables.dataset, &tables.staging).await?;
        Ok(())
    }

    async fn load_ndjson(
        &self,
        target: &TargetProfile,
        dataset: &str,
        table: &str,
        path: &Path,
    ) -> Result<()> {
        let rows = tokio::fs::read(path).await?;
        self.client(target)
            .await?
            .load_ndjson(dataset, table, rows)
            .await?;
        Ok(())
    }

    async fn consolidate(&self, target: &TargetProfile, tables: &TableRefs) -> Result<()> {
        let client = self.client(target).await?;
        client.query(&merge_sql(client.project(), tables)).await?;
        Ok(())
    }

    async fn table_exists(&self, target: &TargetProfile, dataset: &str, table: &str) -> Result<bool> {
        Ok(self.client(target).await?.table_exists(dataset, table).await?)
    }

    async fn drop_table(&self, target: &TargetProfile, dataset: &str, table: &str) -> Result<()> {
        self.client(target).await?.delete_table(dataset, table).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::bigquery::auth::StaticTokenSource;
    use crate::config::secret_string;
    use crate::domain::TidewaterError;
    use mockito::{Matcher, Server};

    fn target(project: &str) -> TargetProfile {
        TargetProfile {
            name: "tg1".to_string(),
            credentials: secret_string(format!(r#"{{"project_id":"{project}"}}"#)),
        }
    }

    fn connector(server: &Server) -> BigQueryConnector {
        let config = TargetConfig {
            api_base_url: server.url(),
            upload_base_url: server.url(),
            job_poll_interval_ms: 10,
            ..TargetConfig::default()
        };
        BigQueryConnector::with_token_source(config, Arc::new(StaticTokenSource::new("tok")))
    }

    #[tokio::test]
    async fn test_ensure_tables_creates_dataset_main_and_staging() {
        let mut server = Server::new_async().await;
        let dataset = server
            .mock("POST", "/projects/proj/datasets")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        let tables = server
            .mock("POST", "/projects/proj/datasets/ds/tables")
            .with_status(409)
            .expect(2)
            .create_async()
            .await;

        let refs = TableRefs {
            dataset: "ds".to_string(),
            main: "orders".to_string(),
            staging: "orders_t_temp".to_string(),
        };
        connector(&server)
            .ensure_tables(&target("proj"), &refs)
            .await
            .unwrap();
        dataset.assert_async().await;
        tables.assert_async().await;
    }

    #[tokio::test]
    async fn test_consolidate_runs_merge_against_project() {
        let mut server = Server::new_async().await;
        let query = server
            .mock("POST", "/projects/proj/jobs")
            .match_body(Matcher::Regex("INSERT INTO `proj\\.ds\\.orders`".into()))
            .with_status(200)
            .with_body(r#"{"jobReference":{"jobId":"q1"},"status":{"state":"DONE"}}"#)
            .create_async()
            .await;

        let refs = TableRefs {
            dataset: "ds".to_string(),
            main: "orders".to_string(),
            staging: "orders_t_temp".to_string(),
        };
        connector(&server)
            .consolidate(&target("proj"), &refs)
            .await
            .unwrap();
        query.assert_async().await;
    }

    #[tokio::test]
    async fn test_ping_failure_is_a_bigquery_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/projects/proj/datasets")
            .match_query(Matcher::Any)
            .with_status(401)
            .create_async()
            .await;

        let err = connector(&server).ping(&target("proj")).await.unwrap_err();
        assert!(matches!(err, TidewaterError::BigQuery(_)));
    }

    #[tokio::test]
    async fn test_credentials_without_project_are_rejected() {
        let server = Server::new_async().await;
        let profile = TargetProfile {
            name: "tg1".to_string(),
            credentials: secret_string("{}".to_string()),
        };
        assert!(connector(&server).ping(&profile).await.is_err());
    }
}
