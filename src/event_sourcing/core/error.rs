use thiserror::Error;
use uuid::Uuid;

use crate::utils::IsTransient;

/// Failures of the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Concurrency conflict on {entity_type} {id}: expected version {expected}")]
    ConcurrencyConflict {
        entity_type: String,
        id: Uuid,
        expected: i64,
    },

    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: Uuid },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::ConcurrencyConflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl IsTransient for StoreError {
    /// Only a lost OCC race is worth replaying; everything else will fail the
    /// same way again.
    fn is_transient(&self) -> bool {
        self.is_conflict()
    }
}
