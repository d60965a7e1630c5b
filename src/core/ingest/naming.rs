//! BigQuery dataset and table names

use crate::domain::ids::TaskKey;

/// Lowercases `name` and maps every character outside `[a-z0-9_]` to `_`
///
/// # Examples
///
/// ```
/// use tidewater::core::ingest::sanitize;
///
/// assert_eq!(sanitize("Sales-DB.eu west"), "sales_db_eu_west");
/// ```
pub fn sanitize(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Tables touched by one task run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRefs {
    pub dataset: String,
    /// Durable, append-only table of the collection
    pub main: String,
    /// Transaction-scoped table dropped after consolidation
    pub staging: String,
}

impl TableRefs {
    pub fn for_task(dataset_prefix: &str, key: &TaskKey) -> Self {
        let export = &key.export;
        Self {
            dataset: sanitize(&format!("{}{}", dataset_prefix, export.database)),
            main: sanitize(&key.collection),
            staging: sanitize(&format!(
                "{}_{}_temp",
                key.collection, export.transaction
            )),
        }
    }
}
