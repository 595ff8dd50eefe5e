use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::database::{Database, DeadLetterRow, EventRow, OutboxRow, SnapshotRow, Transaction};
use crate::event_sourcing::core::StoreError;

// ============================================================================
// In-Memory Backend
// ============================================================================
//
// Each transaction works on a private copy of the tables taken at `begin`.
// Commit re-validates every conditional write against the committed tables
// and applies them atomically, so concurrent writers behave like they do
// under PostgreSQL: exactly one wins per version.
//
// ============================================================================

#[derive(Debug, Clone, Default)]
struct Tables {
    snapshots: HashMap<(String, Uuid), SnapshotRow>,
    events: BTreeMap<(Uuid, i64), EventRow>,
    outbox: BTreeMap<i64, OutboxRow>,
    dead_letters: BTreeMap<i64, DeadLetterRow>,
    next_outbox_id: i64,
}

impl Tables {
    fn allocate_outbox_id(&mut self) -> i64 {
        self.next_outbox_id += 1;
        self.next_outbox_id
    }
}

#[derive(Debug, Clone)]
enum Op {
    InsertSnapshot { storage: String, row: SnapshotRow },
    UpdateSnapshot { storage: String, id: Uuid, state: Value, expected: i64, new: i64 },
    InsertEvent(EventRow),
    InsertOutbox(EventRow),
    DeleteOutbox(Vec<i64>),
    MarkDelivered(Vec<i64>, DateTime<Utc>),
    InsertDeadLetter(DeadLetterRow),
}

/// Failure forced onto the next commit.
#[derive(Debug, Clone)]
pub enum InjectedFailure {
    Conflict,
    Storage(String),
}

#[derive(Debug, Default)]
struct Shared {
    tables: Tables,
    injected: VecDeque<InjectedFailure>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryDatabase {
    shared: Arc<Mutex<Shared>>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next commit fail with `failure` and write nothing.
    pub async fn inject_commit_failure(&self, failure: InjectedFailure) {
        self.shared.lock().await.injected.push_back(failure);
    }

    pub async fn snapshot(&self, storage: &str, id: Uuid) -> Option<SnapshotRow> {
        let shared = self.shared.lock().await;
        shared.tables.snapshots.get(&(storage.to_string(), id)).cloned()
    }

    pub async fn events_for(&self, entity_id: Uuid) -> Vec<EventRow> {
        let shared = self.shared.lock().await;
        shared
            .tables
            .events
            .range((entity_id, i64::MIN)..=(entity_id, i64::MAX))
            .map(|(_, row)| row.clone())
            .collect()
    }

    /// Every outbox row, delivered or not, by id.
    pub async fn outbox_rows(&self) -> Vec<OutboxRow> {
        self.shared.lock().await.tables.outbox.values().cloned().collect()
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetterRow> {
        self.shared.lock().await.tables.dead_letters.values().cloned().collect()
    }

    /// Put a raw row into the outbox, bypassing the aggregate store.
    pub async fn seed_outbox(
        &self,
        event_type: &str,
        payload: Value,
        occurred_at: DateTime<Utc>,
    ) -> OutboxRow {
        let mut shared = self.shared.lock().await;
        let id = shared.tables.allocate_outbox_id();
        let row = OutboxRow {
            id,
            event_id: Uuid::now_v7(),
            entity_id: Uuid::new_v4(),
            entity_type: "unknown".to_string(),
            event_type: event_type.to_string(),
            payload,
            occurred_at,
            delivered_at: None,
        };
        shared.tables.outbox.insert(id, row.clone());
        row
    }
}

#[async_trait]
impl Database for InMemoryDatabase {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let view = self.shared.lock().await.tables.clone();
        Ok(InMemoryTransaction {
            shared: Arc::clone(&self.shared),
            view,
            ops: Vec::new(),
        })
    }

    async fn fetch_events(&self, entity_id: Uuid) -> Result<Vec<EventRow>, StoreError> {
        Ok(self.events_for(entity_id).await)
    }
}

pub struct InMemoryTransaction {
    shared: Arc<Mutex<Shared>>,
    view: Tables,
    ops: Vec<Op>,
}

fn conflict(storage: &str, id: Uuid, expected: i64) -> StoreError {
    StoreError::ConcurrencyConflict {
        entity_type: storage.to_string(),
        id,
        expected,
    }
}

impl InMemoryTransaction {
    fn validate(&self, committed: &Tables) -> Result<(), StoreError> {
        for op in &self.ops {
            match op {
                Op::InsertSnapshot { storage, row } => {
                    if committed.snapshots.contains_key(&(storage.clone(), row.id)) {
                        return Err(conflict(storage, row.id, 0));
                    }
                }
                Op::UpdateSnapshot { storage, id, expected, .. } => {
                    let current = committed
                        .snapshots
                        .get(&(storage.clone(), *id))
                        .map(|row| row.version);
                    if current != Some(*expected) {
                        return Err(conflict(storage, *id, *expected));
                    }
                }
                Op::InsertEvent(row) => {
                    if committed.events.contains_key(&(row.entity_id, row.version)) {
                        return Err(conflict(&row.entity_type, row.entity_id, row.version - 1));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn apply(ops: Vec<Op>, tables: &mut Tables) {
        for op in ops {
            match op {
                Op::InsertSnapshot { storage, row } => {
                    tables.snapshots.insert((storage, row.id), row);
                }
                Op::UpdateSnapshot { storage, id, state, new, .. } => {
                    if let Some(row) = tables.snapshots.get_mut(&(storage, id)) {
                        row.state = state;
                        row.version = new;
                    }
                }
                Op::InsertEvent(row) => {
                    tables.events.insert((row.entity_id, row.version), row);
                }
                Op::InsertOutbox(event) => {
                    let id = tables.allocate_outbox_id();
                    tables.outbox.insert(id, outbox_row(id, &event));
                }
                Op::DeleteOutbox(ids) => {
                    for id in ids {
                        tables.outbox.remove(&id);
                    }
                }
                Op::MarkDelivered(ids, at) => {
                    for id in ids {
                        if let Some(row) = tables.outbox.get_mut(&id) {
                            row.delivered_at = Some(at);
                        }
                    }
                }
                Op::InsertDeadLetter(row) => {
                    tables.dead_letters.entry(row.outbox_id).or_insert(row);
                }
            }
        }
    }
}

fn outbox_row(id: i64, event: &EventRow) -> OutboxRow {
    OutboxRow {
        id,
        event_id: event.id,
        entity_id: event.entity_id,
        entity_type: event.entity_type.clone(),
        event_type: event.event_type.clone(),
        payload: event.payload.clone(),
        occurred_at: event.occurred_at,
        delivered_at: None,
    }
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn fetch_snapshot(&mut self, storage: &str, id: Uuid) -> Result<Option<SnapshotRow>, StoreError> {
        Ok(self.view.snapshots.get(&(storage.to_string(), id)).cloned())
    }

    async fn insert_snapshot(&mut self, storage: &str, row: &SnapshotRow) -> Result<(), StoreError> {
        let key = (storage.to_string(), row.id);
        if self.view.snapshots.contains_key(&key) {
            return Err(conflict(storage, row.id, 0));
        }
        self.view.snapshots.insert(key, row.clone());
        self.ops.push(Op::InsertSnapshot {
            storage: storage.to_string(),
            row: row.clone(),
        });
        Ok(())
    }

    async fn update_snapshot(
        &mut self,
        storage: &str,
        id: Uuid,
        state: &Value,
        expected_version: i64,
        new_version: i64,
    ) -> Result<u64, StoreError> {
        match self.view.snapshots.get_mut(&(storage.to_string(), id)) {
            Some(row) if row.version == expected_version => {
                row.state = state.clone();
                row.version = new_version;
                self.ops.push(Op::UpdateSnapshot {
                    storage: storage.to_string(),
                    id,
                    state: state.clone(),
                    expected: expected_version,
                    new: new_version,
                });
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn insert_event(&mut self, row: &EventRow) -> Result<bool, StoreError> {
        let key = (row.entity_id, row.version);
        if self.view.events.contains_key(&key) {
            return Ok(false);
        }
        self.view.events.insert(key, row.clone());
        self.ops.push(Op::InsertEvent(row.clone()));
        Ok(true)
    }

    async fn insert_outbox(&mut self, event: &EventRow) -> Result<(), StoreError> {
        let local_id = self.view.allocate_outbox_id();
        self.view.outbox.insert(local_id, outbox_row(local_id, event));
        self.ops.push(Op::InsertOutbox(event.clone()));
        Ok(())
    }

    async fn fetch_outbox_batch(&mut self, limit: usize) -> Result<Vec<OutboxRow>, StoreError> {
        let mut pending: Vec<OutboxRow> = self
            .view
            .outbox
            .values()
            .filter(|row| row.delivered_at.is_none())
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.occurred_at.cmp(&b.occurred_at).then(a.id.cmp(&b.id)));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn delete_outbox(&mut self, ids: &[i64]) -> Result<(), StoreError> {
        for id in ids {
            self.view.outbox.remove(id);
        }
        self.ops.push(Op::DeleteOutbox(ids.to_vec()));
        Ok(())
    }

    async fn mark_outbox_delivered(&mut self, ids: &[i64], at: DateTime<Utc>) -> Result<(), StoreError> {
        for id in ids {
            if let Some(row) = self.view.outbox.get_mut(id) {
                row.delivered_at = Some(at);
            }
        }
        self.ops.push(Op::MarkDelivered(ids.to_vec(), at));
        Ok(())
    }

    async fn insert_dead_letter(&mut self, row: &DeadLetterRow) -> Result<(), StoreError> {
        self.view.dead_letters.entry(row.outbox_id).or_insert_with(|| row.clone());
        self.ops.push(Op::InsertDeadLetter(row.clone()));
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        let mut shared = self.shared.lock().await;

        if let Some(failure) = shared.injected.pop_front() {
            return Err(match failure {
                InjectedFailure::Conflict => conflict("injected", Uuid::nil(), 0),
                InjectedFailure::Storage(message) => StoreError::Storage(message),
            });
        }

        self.validate(&shared.tables)?;
        Self::apply(self.ops, &mut shared.tables);
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}
