//! Compensating actions for multi-record writes
//!
//! The store offers no multi-document transactions. Operations that write
//! several records register an inverse for each completed step; if a later
//! step fails the inverses run in reverse order. A failing inverse is logged
//! and the remaining ones still run.

use crate::domain::Result;
use futures::future::BoxFuture;

type Compensation = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

/// Ordered list of compensations
///
/// # Examples
///
/// ```
/// use tidewater::core::saga::Saga;
/// use futures::FutureExt;
///
/// # #[tokio::main]
/// # async fn main() {
/// let mut saga = Saga::new("example");
/// saga.record("undo step one", || async { Ok(()) }.boxed());
/// assert_eq!(saga.len(), 1);
/// assert_eq!(saga.compensate().await, 0);
/// # }
/// ```
pub struct Saga {
    name: &'static str,
    steps: Vec<(String, Compensation)>,
}

impl Saga {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            steps: Vec::new(),
        }
    }

    /// Registers the inverse of a step that just completed
    pub fn record<F>(&mut self, description: impl Into<String>, undo: F)
    where
        F: FnOnce() -> BoxFuture<'static, Result<()>> + Send + 'static,
    {
        self.steps.push((description.into(), Box::new(undo)));
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Forgets every compensation once the operation succeeded
    pub fn commit(mut self) {
        self.steps.clear();
    }

    /// Runs the compensations last-in first-out
    ///
    /// # Returns
    ///
    /// The number of compensations that failed.
    pub async fn compensate(mut self) -> usize {
        let mut failures = 0;
        while let Some((description, undo)) = self.steps.pop() {
            match undo().await {
                Ok(()) => {
                    tracing::debug!(saga = self.name, step = %description, "Compensated");
                }
                Err(e) => {
                    failures += 1;
                    tracing::error!(
                        saga = self.name,
                        step = %description,
                        error = %e,
                        "Compensation failed"
                    );
                }
            }
        }
        failures
    }
}
