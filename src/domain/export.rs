//! Export record
//!
//! An export is one replication run of a source database into a target. Its
//! status moves only through `core::export::ExportMachine`.

use crate::domain::ids::ExportKey;
use crate::domain::status::Status;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted export
///
/// # Examples
///
/// ```
/// use tidewater::domain::export::Export;
/// use tidewater::domain::ids::ExportKey;
/// use tidewater::domain::status::Status;
///
/// let key = ExportKey::generate("s1", "tg1", "db1").unwrap();
/// let export = Export::created(key);
/// assert_eq!(export.status, Status::Created);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Export {
    #[serde(flatten)]
    pub key: ExportKey,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Export {
    /// A new export in `created` status
    pub fn created(key: ExportKey) -> Self {
        let now = Utc::now();
        Self {
            key,
            status: Status::Created,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when this export occupies the active slot of its triple
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Whether `other` replicates the same source database into the same target
    pub fn same_triple(&self, other: &ExportKey) -> bool {
        self.key.source == other.source
            && self.key.target == other.target
            && self.key.database == other.database
    }
}
