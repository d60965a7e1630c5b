//! MongoDB replication source
//!
//! Documents leave the source as relaxed extended JSON, so ObjectIds arrive as
//! `{"$oid": ...}` and dates as `{"$date": ...}`.

use crate::adapters::connectors::{DocumentStream, SourceConnector};
use crate::adapters::mongodb::client::connect;
use crate::adapters::mongodb::filter::window_filter;
use crate::core::stamp::StampPlan;
use crate::domain::profile::SourceProfile;
use crate::domain::task::Window;
use crate::domain::{Result, TidewaterError};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::FindOptions;
use mongodb::Client;
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

fn source_error(context: &str, e: impl std::fmt::Display) -> TidewaterError {
    TidewaterError::Source(format!("{context}: {e}"))
}

/// Source connector keeping one client per source profile
pub struct MongoSource {
    clients: Mutex<HashMap<String, (String, Client)>>,
    connect_timeout: Duration,
}

impl MongoSource {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            connect_timeout,
        }
    }

    /// Cached client of `source`, rebuilt when its url changed
    async fn client(&self, source: &SourceProfile) -> Result<Client> {
        let url = source.url.expose_secret().as_ref().to_string();
        let mut clients = self.clients.lock().await;
        if let Some((cached_url, client)) = clients.get(&source.name) {
            if *cached_url == url {
                return Ok(client.clone());
            }
        }
        let client = connect(&url, Some(self.connect_timeout))
            .await
            .map_err(|e| source_error(&format!("source '{}'", source.name), e))?;
        clients.insert(source.name.clone(), (url, client.clone()));
        Ok(client)
    }
}

#[async_trait]
impl SourceConnector for MongoSource {
    async fn ping(&self, source: &SourceProfile) -> Result<()> {
        let client = self.client(source).await?;
        client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| source_error(&format!("ping of source '{}'", source.name), e))?;
        Ok(())
    }

    async fn list_collections(&self, source: &SourceProfile, database: &str) -> Result<Vec<String>> {
        let client = self.client(source).await?;
        client
            .database(database)
            .list_collection_names(None)
            .await
            .map_err(|e| source_error(&format!("listing collections of {database}"), e))
    }

    async fn count_window(
        &self,
        source: &SourceProfile,
        database: &str,
        collection: &str,
        plan: &StampPlan,
        window: &Window,
    ) -> Result<u64> {
        let client = self.client(source).await?;
        client
            .database(database)
            .collection::<Document>(collection)
            .count_documents(window_filter(plan, window), None)
            .await
            .map_err(|e| source_error(&format!("count of {database}.{collection}"), e))
    }

    async fn stream_window(
        &self,
        source: &SourceProfile,
        database: &str,
        collection: &str,
        plan: &StampPlan,
        window: &Window,
    ) -> Result<DocumentStream> {
        let client = self.client(source).await?;
        let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();
        let context = format!("read of {database}.{collection}");
        let cursor = client
            .database(database)
            .collection::<Document>(collection)
            .find(window_filter(plan, window), options)
            .await
            .map_err(|e| source_error(&context, e))?;

        Ok(cursor
            .map_err(move |e| source_error(&context, e))
            .map_ok(|doc| Bson::Document(doc).into_relaxed_extjson())
            .boxed())
    }
}
