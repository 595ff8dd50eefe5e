use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::event_sourcing::core::StoreError;

// ============================================================================
// Storage Rows
// ============================================================================

/// Materialized state of one entity.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SnapshotRow {
    pub id: Uuid,
    pub entity_type: String,
    pub state: Value,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

/// One committed event. Unique on (entity_id, version).
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct EventRow {
    pub id: Uuid,
    pub entity_id: Uuid,
    pub entity_type: String,
    pub event_type: String,
    pub payload: Value,
    pub occurred_at: DateTime<Utc>,
    pub version: i64,
}

/// Pending (or retained) external delivery of one event.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct OutboxRow {
    pub id: i64,
    pub event_id: Uuid,
    pub entity_id: Uuid,
    pub entity_type: String,
    pub event_type: String,
    pub payload: Value,
    pub occurred_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Outbox row the relay could not decode.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct DeadLetterRow {
    pub outbox_id: i64,
    pub event_id: Uuid,
    pub entity_id: Uuid,
    pub entity_type: String,
    pub event_type: String,
    pub payload: Value,
    pub occurred_at: DateTime<Utc>,
    pub reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}

impl DeadLetterRow {
    pub fn from_outbox(row: &OutboxRow, reason: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            outbox_id: row.id,
            event_id: row.event_id,
            entity_id: row.entity_id,
            entity_type: row.entity_type.clone(),
            event_type: row.event_type.clone(),
            payload: row.payload.clone(),
            occurred_at: row.occurred_at,
            reason: reason.into(),
            dead_lettered_at: at,
        }
    }
}

// ============================================================================
// Database & Transaction Scope
// ============================================================================
//
// Every write happens inside a `Transaction`. Dropping a transaction without
// committing discards its writes, which is what makes cancelling a store or
// relay future safe.
//
// ============================================================================

#[async_trait]
pub trait Database: Send + Sync + 'static {
    type Tx: Transaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    /// Committed events of one entity in ascending version order.
    async fn fetch_events(&self, entity_id: Uuid) -> Result<Vec<EventRow>, StoreError>;
}

/// A unit of work. Reads observe the transaction's own writes.
#[async_trait]
pub trait Transaction: Send {
    async fn fetch_snapshot(&mut self, storage: &str, id: Uuid) -> Result<Option<SnapshotRow>, StoreError>;

    /// Fails with `ConcurrencyConflict` if a snapshot with this id exists.
    async fn insert_snapshot(&mut self, storage: &str, row: &SnapshotRow) -> Result<(), StoreError>;

    /// Conditional update; returns the number of rows affected (0 or 1).
    async fn update_snapshot(
        &mut self,
        storage: &str,
        id: Uuid,
        state: &Value,
        expected_version: i64,
        new_version: i64,
    ) -> Result<u64, StoreError>;

    /// Returns `false` when (entity_id, version) is already present.
    async fn insert_event(&mut self, row: &EventRow) -> Result<bool, StoreError>;

    async fn insert_outbox(&mut self, event: &EventRow) -> Result<(), StoreError>;

    /// Undelivered rows, oldest first.
    async fn fetch_outbox_batch(&mut self, limit: usize) -> Result<Vec<OutboxRow>, StoreError>;

    async fn delete_outbox(&mut self, ids: &[i64]) -> Result<(), StoreError>;

    async fn mark_outbox_delivered(&mut self, ids: &[i64], at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn insert_dead_letter(&mut self, row: &DeadLetterRow) -> Result<(), StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}
