//! Staged row format
//!
//! Every extracted document becomes one `(id, insertedAt, data, hash)` row.
//! `data` is the canonical JSON of the sanitized document (object keys sorted
//! at every depth) and `hash` is the MD5 of exactly that string, so the same
//! payload always yields the same pair.

use crate::domain::{Result, TidewaterError};
use chrono::{DateTime, NaiveDateTime, Utc};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Replacement for empty object keys, which BigQuery JSON paths cannot address
pub const EMPTY_KEY: &str = "__empty__";

/// One row of the staging and main tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedRow {
    pub id: String,
    #[serde(rename = "insertedAt", with = "bigquery_timestamp")]
    pub inserted_at: DateTime<Utc>,
    pub data: String,
    pub hash: String,
}

impl StagedRow {
    /// Sanitizes, canonicalizes and hashes `doc`
    ///
    /// # Errors
    ///
    /// Returns `TidewaterError::Source` when the document has no `_id`
    pub fn from_document(doc: Value, inserted_at: DateTime<Utc>) -> Result<Self> {
        let id = document_id(&doc)?;
        let data = serde_json::to_string(&canonicalize(&sanitize_document(doc)))?;
        let hash = row_hash(&data);
        Ok(Self {
            id,
            inserted_at,
            data,
            hash,
        })
    }
}

/// Renames empty keys to [`EMPTY_KEY`], recursively
pub fn sanitize_document(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut clean = Map::with_capacity(map.len());
            for (key, inner) in map {
                let key = if key.is_empty() {
                    EMPTY_KEY.to_string()
                } else {
                    key
                };
                clean.insert(key, sanitize_document(inner));
            }
            Value::Object(clean)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_document).collect()),
        other => other,
    }
}

/// Sorts object keys at every depth
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            Value::Object(sorted.into_iter().map(|(k, v)| (k.clone(), v)).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Lowercase hex MD5 of `data`
pub fn row_hash(data: &str) -> String {
    let digest = Md5::digest(data.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// String form of the document's `_id`
///
/// ObjectIds are reduced to their hex string; other scalar ids are used as is
/// and compound ids as their canonical JSON.
///
/// # Errors
///
/// Returns `TidewaterError::Source` when `_id` is missing or null
pub fn document_id(doc: &Value) -> Result<String> {
    match doc.get("_id") {
        None | Some(Value::Null) => Err(TidewaterError::Source(
            "document without _id".to_string(),
        )),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Object(map)) if map.len() == 1 && map.contains_key("$oid") => map
            .get("$oid")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| TidewaterError::Source("malformed ObjectId".to_string())),
        Some(other) => Ok(serde_json::to_string(&canonicalize(other))?),
    }
}

mod bigquery_timestamp {
    use super::*;
    use serde::{Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

    pub fn serialize<S: Serializer>(
        value: &DateTime<Utc>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}
