//! MongoDB client for the orchestration store

use crate::config::StorageConfig;
use crate::domain::{Result, StoreError};
use mongodb::bson::doc;
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Collection, Database, IndexModel};
use secrecy::ExposeSecret;
use std::time::Duration;

/// Connection to the database holding exports, tasks and profiles
pub struct MongoClient {
    database: Database,
    config: StorageConfig,
}

impl MongoClient {
    /// Connect and verify the connection with a `ping`
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ConnectionFailed` if the URL does not parse or the
    /// server does not answer.
    pub async fn new(config: StorageConfig) -> Result<Self> {
        let client = connect(config.url.expose_secret().as_ref(), None).await?;
        let database = client.database(&config.database);
        database
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| StoreError::ConnectionFailed(format!("ping failed: {e}")))?;

        tracing::info!(database = %config.database, "Connected to orchestration store");
        Ok(Self { database, config })
    }

    pub fn collection<T>(&self, name: &str) -> Collection<T> {
        self.database.collection(name)
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Create the indexes backing the uniqueness rules
    ///
    /// * exports: unique `transaction`, unique active (source, target, database)
    /// * tasks: unique (transaction, collection), unique active
    ///   (source, target, database, collection)
    /// * profiles: unique `name`
    pub async fn ensure_indexes(&self) -> Result<()> {
        let exports = self.collection::<mongodb::bson::Document>(&self.config.exports_collection);
        create_index(&exports, doc! { "transaction": 1 }, "transaction_unique", false).await?;
        create_index(
            &exports,
            doc! { "source": 1, "target": 1, "database": 1 },
            "active_triple_unique",
            true,
        )
        .await?;

        let tasks = self.collection::<mongodb::bson::Document>(&self.config.tasks_collection);
        create_index(
            &tasks,
            doc! { "transaction": 1, "collection": 1 },
            "transaction_collection_unique",
            false,
        )
        .await?;
        create_index(
            &tasks,
            doc! { "source": 1, "target": 1, "database": 1, "collection": 1 },
            "active_collection_unique",
            true,
        )
        .await?;

        for name in [&self.config.sources_collection, &self.config.targets_collection] {
            let profiles = self.collection::<mongodb::bson::Document>(name);
            create_index(&profiles, doc! { "name": 1 }, "name_unique", false).await?;
        }

        tracing::debug!("Store indexes ensured");
        Ok(())
    }
}

/// Builds a client with optional connect and server-selection timeouts
pub async fn connect(url: &str, timeout: Option<Duration>) -> Result<Client> {
    let mut options = ClientOptions::parse(url)
        .await
        .map_err(|e| StoreError::ConnectionFailed(format!("invalid MongoDB url: {e}")))?;
    options.app_name = Some("tidewater".to_string());
    if let Some(timeout) = timeout {
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);
    }
    Client::with_options(options)
        .map_err(|e| StoreError::ConnectionFailed(format!("failed to create client: {e}")).into())
}

async fn create_index(
    collection: &Collection<mongodb::bson::Document>,
    keys: mongodb::bson::Document,
    name: &str,
    active_only: bool,
) -> Result<()> {
    let mut options = IndexOptions::builder()
        .name(name.to_string())
        .unique(true)
        .build();
    if active_only {
        options.partial_filter_expression = Some(doc! { "active": true });
    }
    let model = IndexModel::builder().keys(keys).options(options).build();
    collection
        .create_index(model, None)
        .await
        .map_err(|e| StoreError::IndexFailed(format!("{name}: {e}")))?;
    Ok(())
}

/// Duplicate key violation of a unique index
pub fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};
    match error.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == 11000,
        ErrorKind::Command(e) => e.code == 11000,
        _ => false,
    }
}
