//! Export state machine
//!
//! Applies the transition table of [`Transition`] to persisted exports. Every
//! transition re-reads the export, checks the table and then performs one
//! compare-and-swap filtered by the status it just read.

use crate::adapters::database::traits::ExportStore;
use crate::domain::export::Export;
use crate::domain::ids::ExportKey;
use crate::domain::status::{Lifecycle, Transition, Verdict};
use crate::domain::{Result, TidewaterError};
use crate::log_transition;
use std::sync::Arc;

pub struct ExportMachine {
    store: Arc<dyn ExportStore>,
}

impl ExportMachine {
    pub fn new(store: Arc<dyn ExportStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ExportStore> {
        &self.store
    }

    /// Loads an export
    ///
    /// # Errors
    ///
    /// Returns `TidewaterError::NotFound` if no export has this key
    pub async fn get(&self, key: &ExportKey) -> Result<Export> {
        self.store
            .find_export(key)
            .await?
            .ok_or_else(|| TidewaterError::NotFound(format!("export {key}")))
    }

    /// Checks `transition` against the persisted status without writing
    pub async fn check(&self, key: &ExportKey, transition: Transition) -> Result<Export> {
        let current = self.get(key).await?;
        transition.evaluate(current.status, Lifecycle::Export)?;
        Ok(current)
    }

    /// Applies `transition`
    ///
    /// A repeated `start` or `finish` returns the export unchanged.
    ///
    /// # Errors
    ///
    /// Returns `TidewaterError::InvalidStateChange` when the persisted status
    /// does not allow the transition, including when a concurrent writer
    /// changed it between the read and the swap.
    pub async fn transition(&self, key: &ExportKey, transition: Transition) -> Result<Export> {
        let current = self.get(key).await?;
        if transition.evaluate(current.status, Lifecycle::Export)? == Verdict::AlreadyApplied {
            tracing::debug!(export = %key.transaction, %transition, "Transition already applied");
            return Ok(current);
        }

        let swapped = self
            .store
            .update_export_status(key, current.status, transition.target())
            .await?;
        match swapped {
            Some(updated) => {
                log_transition!("export", key.transaction, current.status, updated.status);
                Ok(updated)
            }
            None => {
                let latest = self.get(key).await?;
                match transition.evaluate(latest.status, Lifecycle::Export) {
                    Ok(Verdict::AlreadyApplied) => Ok(latest),
                    _ => Err(transition.rejection(latest.status)),
                }
            }
        }
    }
}
