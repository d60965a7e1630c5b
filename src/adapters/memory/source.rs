//! In-memory replication source

use crate::adapters::connectors::{DocumentStream, SourceConnector};
use crate::core::stamp::StampPlan;
use crate::domain::profile::SourceProfile;
use crate::domain::task::Window;
use crate::domain::{Result, TidewaterError};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

type Collections = BTreeMap<String, Vec<Value>>;

struct State {
    databases: BTreeMap<String, Collections>,
    reachable: bool,
    failing_counts: usize,
}

/// Source whose databases are plain vectors of extended-JSON documents
///
/// The same data is served whatever source profile is asked for.
pub struct MemorySource {
    state: Mutex<State>,
}

impl Default for MemorySource {
    fn default() -> Self {
        Self {
            state: Mutex::new(State {
                databases: BTreeMap::new(),
                reachable: true,
                failing_counts: 0,
            }),
        }
    }
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds empty `collections` to `database`
    pub fn add_database(&self, database: &str, collections: &[&str]) {
        let mut state = self.lock();
        let db = state.databases.entry(database.to_string()).or_default();
        for name in collections {
            db.entry((*name).to_string()).or_default();
        }
    }

    pub fn insert_documents(&self, database: &str, collection: &str, documents: Vec<Value>) {
        self.lock()
            .databases
            .entry(database.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default()
            .extend(documents);
    }

    /// Replaces the document whose `_id` equals that of `document`
    pub fn replace_document(&self, database: &str, collection: &str, document: Value) {
        let mut state = self.lock();
        let docs = state
            .databases
            .entry(database.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default();
        match docs.iter_mut().find(|d| d.get("_id") == document.get("_id")) {
            Some(existing) => *existing = document,
            None => docs.push(document),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    /// Makes the next `times` window counts fail
    pub fn fail_next_counts(&self, times: usize) {
        self.lock().failing_counts = times;
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn window_documents(
        &self,
        database: &str,
        collection: &str,
        plan: &StampPlan,
        window: &Window,
    ) -> Result<Vec<Value>> {
        let state = self.lock();
        if !state.reachable {
            return Err(TidewaterError::Source("connection refused".to_string()));
        }
        let docs = state
            .databases
            .get(database)
            .and_then(|db| db.get(collection))
            .ok_or_else(|| {
                TidewaterError::Source(format!("collection {database}.{collection} not found"))
            })?;
        Ok(docs
            .iter()
            .filter(|doc| plan.in_window(doc, window))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SourceConnector for MemorySource {
    async fn ping(&self, _source: &SourceProfile) -> Result<()> {
        if self.lock().reachable {
            Ok(())
        } else {
            Err(TidewaterError::Source("connection refused".to_string()))
        }
    }

    async fn list_collections(&self, _source: &SourceProfile, database: &str) -> Result<Vec<String>> {
        let state = self.lock();
        Ok(state
            .databases
            .get(database)
            .map(|db| db.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn count_window(
        &self,
        _source: &SourceProfile,
        database: &str,
        collection: &str,
        plan: &StampPlan,
        window: &Window,
    ) -> Result<u64> {
        {
            let mut state = self.lock();
            if state.failing_counts > 0 {
                state.failing_counts -= 1;
                return Err(TidewaterError::Source("count interrupted".to_string()));
            }
        }
        Ok(self.window_documents(database, collection, plan, window)?.len() as u64)
    }

    async fn stream_window(
        &self,
        _source: &SourceProfile,
        database: &str,
        collection: &str,
        plan: &StampPlan,
        window: &Window,
    ) -> Result<DocumentStream> {
        let docs = self.window_documents(database, collection, plan, window)?;
        Ok(futures::stream::iter(docs.into_iter().map(Ok)).boxed())
    }
}
