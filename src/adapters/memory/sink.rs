//! In-memory columnar sink
//!
//! Tables are vectors of [`StagedRow`]; consolidation applies the same row
//! selection as the BigQuery statement.

use crate::adapters::connectors::TargetConnector;
use crate::core::ingest::{select_new_rows, StagedRow, TableRefs};
use crate::domain::errors::BigQueryError;
use crate::domain::profile::TargetProfile;
use crate::domain::{Result, TidewaterError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

type TableId = (String, String);

struct State {
    tables: BTreeMap<TableId, Vec<StagedRow>>,
    reachable: bool,
    failing_loads: usize,
    loads: usize,
}

pub struct MemorySink {
    state: Mutex<State>,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self {
            state: Mutex::new(State {
                tables: BTreeMap::new(),
                reachable: true,
                failing_loads: 0,
                loads: 0,
            }),
        }
    }
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    /// Makes the next `times` loads fail
    pub fn fail_next_loads(&self, times: usize) {
        self.lock().failing_loads = times;
    }

    /// Number of load jobs that succeeded
    pub fn loads(&self) -> usize {
        self.lock().loads
    }

    pub fn rows(&self, dataset: &str, table: &str) -> Vec<StagedRow> {
        self.lock()
            .tables
            .get(&table_id(dataset, table))
            .cloned()
            .unwrap_or_default()
    }

    /// Every table as `dataset.table`
    pub fn table_names(&self) -> Vec<String> {
        self.lock()
            .tables
            .keys()
            .map(|(dataset, table)| format!("{dataset}.{table}"))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn table_id(dataset: &str, table: &str) -> TableId {
    (dataset.to_string(), table.to_string())
}

fn missing(dataset: &str, table: &str) -> TidewaterError {
    BigQueryError::RequestFailed {
        status: 404,
        message: format!("Not found: Table {dataset}.{table}"),
    }
    .into()
}

#[async_trait]
impl TargetConnector for MemorySink {
    async fn ping(&self, _target: &TargetProfile) -> Result<()> {
        if self.lock().reachable {
            Ok(())
        } else {
            Err(BigQueryError::Transport("connection refused".to_string()).into())
        }
    }

    async fn ensure_tables(&self, _target: &TargetProfile, tables: &TableRefs) -> Result<()> {
        let mut state = self.lock();
        for table in [&tables.main, &tables.staging] {
            state
                .tables
                .entry(table_id(&tables.dataset, table))
                .or_default();
        }
        Ok(())
    }

    async fn load_ndjson(
        &self,
        _target: &TargetProfile,
        dataset: &str,
        table: &str,
        path: &Path,
    ) -> Result<()> {
        {
            let mut state = self.lock();
            if state.failing_loads > 0 {
                state.failing_loads -= 1;
                return Err(BigQueryError::JobFailed {
                    job_id: "memory-load".to_string(),
                    message: "load interrupted".to_string(),
                }
                .into());
            }
        }

        let content = tokio::fs::read_to_string(path).await?;
        let rows = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str::<StagedRow>)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut state = self.lock();
        let rows_in_table = state
            .tables
            .get_mut(&table_id(dataset, table))
            .ok_or_else(|| missing(dataset, table))?;
        rows_in_table.extend(rows);
        state.loads += 1;
        Ok(())
    }

    async fn consolidate(&self, _target: &TargetProfile, tables: &TableRefs) -> Result<()> {
        let mut state = self.lock();
        let staging = state
            .tables
            .get(&table_id(&tables.dataset, &tables.staging))
            .ok_or_else(|| missing(&tables.dataset, &tables.staging))?;
        let main_id = table_id(&tables.dataset, &tables.main);
        let main = state
            .tables
            .get(&main_id)
            .ok_or_else(|| missing(&tables.dataset, &tables.main))?;
        let fresh = select_new_rows(staging, main);
        if let Some(main) = state.tables.get_mut(&main_id) {
            main.extend(fresh);
        }
        Ok(())
    }

    async fn table_exists(&self, _target: &TargetProfile, dataset: &str, table: &str) -> Result<bool> {
        Ok(self.lock().tables.contains_key(&table_id(dataset, table)))
    }

    async fn drop_table(&self, _target: &TargetProfile, dataset: &str, table: &str) -> Result<()> {
        self.lock().tables.remove(&table_id(dataset, table));
        Ok(())
    }
}
