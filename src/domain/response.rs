//! Response shapes returned by exported operations
//!
//! Mutations answer with the affected transaction; queries answer with a count
//! and the matching records.

use crate::domain::ids::Transaction;
use serde::Serialize;

/// Result of a mutating export operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionResponse {
    pub transaction: Transaction,
}

impl From<Transaction> for TransactionResponse {
    fn from(transaction: Transaction) -> Self {
        Self { transaction }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListMetadata {
    pub count: u64,
}

/// Result of a listing query
#[derive(Debug, Clone, Serialize)]
pub struct ListResponse<T> {
    pub metadata: ListMetadata,
    pub results: Vec<T>,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(results: Vec<T>) -> Self {
        Self {
            metadata: ListMetadata {
                count: results.len() as u64,
            },
            results,
        }
    }
}
