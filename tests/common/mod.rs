//! Shared fixture for the integration tests
//!
//! Builds a monolith engine over the in-memory store, source and sink.

#![allow(dead_code)]

use std::sync::Arc;
use tidewater::adapters::database::Stores;
use tidewater::adapters::memory::{MemorySink, MemorySource, MemoryStore};
use tidewater::adapters::workers::AlwaysAlive;
use tidewater::config::{parse_config, secret_string};
use tidewater::core::engine::{Engine, EngineParts};
use tidewater::domain::ids::ExportKey;
use tidewater::domain::profile::{SourceProfile, StampOverrides, TargetProfile};

pub const TXN: &str = "6f1c1c1e-8f57-4bd5-a6a9-1e0b3f0f2f41";
pub const TXN_2: &str = "0b6f0c52-42c4-4a1a-a1d4-3a1f3f7d7b10";

const BASE_CONFIG: &str = r#"
[application]
role = "monolith"
log_level = "debug"

[storage]
backend = "memory"

[scheduler]
tick_interval_ms = 100
selection = "first"

[worker]
name = "w1"
tick_interval_ms = 100

[worker.retry]
max_attempts = 2
base_delay_ms = 0

[target]
cleanup_delay_ms = 0

[logging]
local_enabled = false
"#;

pub struct Harness {
    pub engine: Engine,
    pub store: Arc<MemoryStore>,
    pub source: Arc<MemorySource>,
    pub sink: Arc<MemorySink>,
}

/// Monolith scheduling onto its own worker `w1`
pub async fn harness() -> Harness {
    harness_with(BASE_CONFIG).await
}

/// Monolith whose scheduler knows `workers`, picked in the listed order
pub async fn harness_with_workers(workers: &[&str]) -> Harness {
    let mut config = BASE_CONFIG.to_string();
    for name in workers {
        config.push_str(&format!("\n[[workers]]\nname = \"{name}\"\n"));
    }
    harness_with(&config).await
}

async fn harness_with(config: &str) -> Harness {
    let config = parse_config(config).unwrap();
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(MemorySource::new());
    let sink = Arc::new(MemorySink::new());
    let engine = Engine::with_parts(
        config,
        EngineParts {
            stores: Stores::shared(store.clone()),
            source: source.clone(),
            target: sink.clone(),
            probe: Arc::new(AlwaysAlive),
        },
    );

    engine
        .add_source(SourceProfile {
            name: "s1".to_string(),
            url: secret_string("mongodb://localhost:27017".to_string()),
            ignore: Vec::new(),
            stamps: StampOverrides::default(),
        })
        .await
        .unwrap();
    engine
        .add_target(TargetProfile {
            name: "tg1".to_string(),
            credentials: secret_string(r#"{"project_id":"analytics"}"#.to_string()),
        })
        .await
        .unwrap();

    Harness {
        engine,
        store,
        source,
        sink,
    }
}

pub fn key(transaction: &str) -> ExportKey {
    ExportKey::new(transaction, "s1", "tg1", "db1").unwrap()
}
