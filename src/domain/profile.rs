//! Source and target profiles
//!
//! Profiles are the named connection settings an export refers to. They are
//! registered through the CLI or seeded from configuration and must answer a
//! connectivity probe before they are saved.

use crate::config::SecretString;
use crate::domain::errors::TidewaterError;
use crate::domain::result::Result;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Change-stamp field overrides
///
/// Unset fields fall back to the configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StampFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert_field: Option<String>,
}

/// Stamp overrides of a source, optionally refined per collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StampOverrides {
    #[serde(flatten)]
    pub fields: StampFields,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub collections: BTreeMap<String, StampFields>,
}

impl StampOverrides {
    /// Effective overrides for `collection`; per-collection values win
    pub fn for_collection(&self, collection: &str) -> StampFields {
        let specific = self.collections.get(collection);
        StampFields {
            update_field: specific
                .and_then(|s| s.update_field.clone())
                .or_else(|| self.fields.update_field.clone()),
            insert_field: specific
                .and_then(|s| s.insert_field.clone())
                .or_else(|| self.fields.insert_field.clone()),
        }
    }
}

/// Named MongoDB source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceProfile {
    pub name: String,
    pub url: SecretString,
    /// Collection name patterns excluded from fan-out (`*` wildcards allowed)
    #[serde(default)]
    pub ignore: Vec<String>,
    #[serde(default)]
    pub stamps: StampOverrides,
}

impl SourceProfile {
    /// # Errors
    ///
    /// Returns `TidewaterError::BadRequest` for a blank name or url
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(TidewaterError::BadRequest(
                "source name is required".to_string(),
            ));
        }
        if self.url.expose_secret().is_empty() {
            return Err(TidewaterError::BadRequest(format!(
                "source '{}' has no url",
                self.name
            )));
        }
        Ok(())
    }

    /// Listing view without the connection string
    pub fn summary(&self) -> SourceSummary {
        SourceSummary {
            name: self.name.clone(),
            ignore: self.ignore.clone(),
            stamps: self.stamps.clone(),
        }
    }
}

/// Named BigQuery target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetProfile {
    pub name: String,
    /// Service-account key JSON
    pub credentials: SecretString,
}

impl TargetProfile {
    /// # Errors
    ///
    /// Returns `TidewaterError::BadRequest` for a blank name or credentials
    /// that are not a JSON object
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(TidewaterError::BadRequest(
                "target name is required".to_string(),
            ));
        }
        let parsed: serde_json::Value =
            serde_json::from_str(self.credentials.expose_secret().as_ref()).map_err(|e| {
                TidewaterError::BadRequest(format!(
                    "target '{}' credentials are not valid JSON: {e}",
                    self.name
                ))
            })?;
        if !parsed.is_object() {
            return Err(TidewaterError::BadRequest(format!(
                "target '{}' credentials must be a JSON object",
                self.name
            )));
        }
        Ok(())
    }

    /// Listing view without the credentials
    pub fn summary(&self) -> TargetSummary {
        TargetSummary {
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceSummary {
    pub name: String,
    pub ignore: Vec<String>,
    pub stamps: StampOverrides,
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetSummary {
    pub name: String,
}
