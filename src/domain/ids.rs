//! Domain identifier types
//!
//! Newtype wrappers and key structs that identify exports, tasks and workers.
//! Every constructor trims its input and rejects blanks so that keys read from
//! the CLI or the store compare equal regardless of stray whitespace.

use crate::domain::errors::TidewaterError;
use crate::domain::result::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

fn required(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(TidewaterError::BadRequest(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

/// Run identifier of an export
///
/// # Examples
///
/// ```
/// use tidewater::domain::ids::Transaction;
///
/// let txn = Transaction::new(" 6f1c1c1e-8f57-4bd5-a6a9-1e0b3f0f2f41 ").unwrap();
/// assert_eq!(txn.as_str(), "6f1c1c1e-8f57-4bd5-a6a9-1e0b3f0f2f41");
/// assert!(Transaction::new("t1").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transaction(String);

impl Transaction {
    /// Creates a transaction from a UUID string
    ///
    /// # Errors
    ///
    /// Returns `TidewaterError::BadRequest` if the value is blank or not a UUID
    pub fn new(id: impl AsRef<str>) -> Result<Self> {
        let id = required("transaction", id.as_ref())?;
        Uuid::parse_str(&id).map_err(|_| {
            TidewaterError::BadRequest(format!("transaction '{id}' is not a valid UUID"))
        })?;
        Ok(Self(id.to_lowercase()))
    }

    /// Generates a fresh random transaction
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Transaction {
    type Err = TidewaterError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl AsRef<str> for Transaction {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Name of a configured worker
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerName(String);

impl WorkerName {
    pub fn new(name: impl AsRef<str>) -> Result<Self> {
        Ok(Self(required("worker", name.as_ref())?))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WorkerName {
    type Err = TidewaterError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Identity of an export: one replication run of a source database into a target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExportKey {
    pub transaction: Transaction,
    pub source: String,
    pub target: String,
    pub database: String,
}

impl ExportKey {
    /// Builds a key from raw input
    ///
    /// # Errors
    ///
    /// Returns `TidewaterError::BadRequest` if any field is blank or the
    /// transaction is not a UUID
    pub fn new(transaction: &str, source: &str, target: &str, database: &str) -> Result<Self> {
        Ok(Self {
            transaction: Transaction::new(transaction)?,
            source: required("source", source)?,
            target: required("target", target)?,
            database: required("database", database)?,
        })
    }

    /// Builds a key for a new run with a generated transaction
    pub fn generate(source: &str, target: &str, database: &str) -> Result<Self> {
        Ok(Self {
            transaction: Transaction::generate(),
            source: required("source", source)?,
            target: required("target", target)?,
            database: required("database", database)?,
        })
    }

    /// Key of the task replicating `collection` within this export
    pub fn task(&self, collection: &str) -> Result<TaskKey> {
        Ok(TaskKey {
            export: self.clone(),
            collection: required("collection", collection)?,
        })
    }
}

impl fmt::Display for ExportKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} -> {}, database {})",
            self.transaction, self.source, self.target, self.database
        )
    }
}

/// Identity of an export task: one collection within an export
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskKey {
    #[serde(flatten)]
    pub export: ExportKey,
    pub collection: String,
}

impl TaskKey {
    pub fn new(
        transaction: &str,
        source: &str,
        target: &str,
        database: &str,
        collection: &str,
    ) -> Result<Self> {
        ExportKey::new(transaction, source, target, database)?.task(collection)
    }

    pub fn transaction(&self) -> &Transaction {
        &self.export.transaction
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}.{}",
            self.export.transaction, self.export.database, self.collection
        )
    }
}
