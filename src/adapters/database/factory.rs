//! Orchestration store factory
//!
//! This module builds the store trait objects named by `[storage]`.

use crate::adapters::database::traits::{ExportStore, ProfileStore, TaskStore};
use crate::adapters::memory::MemoryStore;
use crate::adapters::mongodb::{MongoClient, MongoStore};
use crate::config::schema::{StorageBackend, StorageConfig};
use crate::domain::Result;
use std::sync::Arc;

/// The three store seams, usually backed by one object
#[derive(Clone)]
pub struct Stores {
    pub exports: Arc<dyn ExportStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub profiles: Arc<dyn ProfileStore>,
}

impl Stores {
    /// Uses one object for all three seams
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: ExportStore + TaskStore + ProfileStore + 'static,
    {
        Self {
            exports: store.clone(),
            tasks: store.clone(),
            profiles: store,
        }
    }
}

/// Create the stores described by `config`
///
/// A MongoDB backend is connected and its indexes are created before the
/// stores are handed out.
///
/// # Errors
///
/// Returns an error if the store cannot be reached or its indexes cannot be
/// created
pub async fn create_stores(config: &StorageConfig) -> Result<Stores> {
    match config.backend {
        StorageBackend::MongoDB => {
            tracing::info!(database = %config.database, "Creating MongoDB orchestration store");
            let client = Arc::new(MongoClient::new(config.clone()).await?);
            client.ensure_indexes().await?;
            Ok(Stores::shared(Arc::new(MongoStore::new(client))))
        }
        StorageBackend::Memory => {
            tracing::info!("Creating in-memory orchestration store");
            Ok(Stores::shared(Arc::new(MemoryStore::new())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend() {
        let config = StorageConfig {
            backend: StorageBackend::Memory,
            ..StorageConfig::default()
        };
        let stores = create_stores(&config).await.unwrap();
        assert!(stores.profiles.list_sources().await.unwrap().is_empty());
    }
}
