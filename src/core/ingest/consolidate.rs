//! Staging to main consolidation
//!
//! The main table is append-only. A staged row is appended when its id is not
//! in main yet or when its hash differs from the hash of main's latest row for
//! that id; within staging only the latest row per id counts. Re-running an
//! overlapping window therefore never duplicates unchanged documents, and a
//! changed document shows up as a new row dated by its insertion.

use crate::core::ingest::naming::TableRefs;
use crate::core::ingest::row::StagedRow;
use std::collections::HashMap;

/// BigQuery statement performing the consolidation
pub fn merge_sql(project: &str, tables: &TableRefs) -> String {
    let main = format!("`{}.{}.{}`", project, tables.dataset, tables.main);
    let staging = format!("`{}.{}.{}`", project, tables.dataset, tables.staging);
    format!(
        "INSERT INTO {main} (id, insertedAt, data, hash)
SELECT s.id, s.insertedAt, s.data, s.hash
FROM (
  SELECT id, insertedAt, data, hash FROM {staging}
  WHERE TRUE
  QUALIFY ROW_NUMBER() OVER (PARTITION BY id ORDER BY insertedAt DESC) = 1
) AS s
LEFT JOIN (
  SELECT id, hash FROM {main}
  WHERE TRUE
  QUALIFY ROW_NUMBER() OVER (PARTITION BY id ORDER BY insertedAt DESC) = 1
) AS m
ON s.id = m.id
WHERE m.id IS NULL OR m.hash != s.hash"
    )
}

/// Rows of `staging` the consolidation appends to `main`
///
/// Output follows the order in which ids first appear in staging.
pub fn select_new_rows(staging: &[StagedRow], main: &[StagedRow]) -> Vec<StagedRow> {
    let main_latest = latest_by_id(main);
    let staged_latest = latest_by_id(staging);

    let mut seen = std::collections::HashSet::new();
    staging
        .iter()
        .filter(|row| seen.insert(row.id.as_str()))
        .filter_map(|row| staged_latest.get(row.id.as_str()).copied())
        .filter(|row| {
            main_latest
                .get(row.id.as_str())
                .map_or(true, |existing| existing.hash != row.hash)
        })
        .cloned()
        .collect()
}

fn latest_by_id(rows: &[StagedRow]) -> HashMap<&str, &StagedRow> {
    let mut latest: HashMap<&str, &StagedRow> = HashMap::new();
    for row in rows {
        match latest.get(row.id.as_str()) {
            Some(current) if current.inserted_at > row.inserted_at => {}
            _ => {
                latest.insert(row.id.as_str(), row);
            }
        }
    }
    latest
}
