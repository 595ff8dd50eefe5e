use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::database::{Database, EventRow, Transaction};
use crate::event_sourcing::core::{DecodeError, DomainEvent, Entity, StoreError, StoredEvent};

// ============================================================================
// Event Log - Append-Only History
// ============================================================================
//
// Responsibilities:
// 1. Append events at consecutive versions inside a caller-held transaction
// 2. Skip versions that already exist, so a retried append is harmless
// 3. Read a stream back in version order and rebuild an entity from it
//
// ============================================================================

pub struct EventLog<D: Database> {
    db: Arc<D>,
}

impl<D: Database> Clone for EventLog<D> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
        }
    }
}

impl<D: Database> EventLog<D> {
    pub fn new(db: Arc<D>) -> Self {
        Self { db }
    }

    /// Insert `events` at `expected_version + 1 ..`, skipping versions that
    /// already exist. Returns the rows actually inserted.
    pub async fn append<E: DomainEvent>(
        &self,
        tx: &mut D::Tx,
        entity_type: &str,
        entity_id: Uuid,
        events: &[E],
        expected_version: i64,
    ) -> Result<Vec<EventRow>, StoreError> {
        let mut inserted = Vec::with_capacity(events.len());

        for (offset, event) in events.iter().enumerate() {
            let tag = event.event_type();
            if !E::registry().contains(tag) {
                return Err(StoreError::UnknownEventType(tag.to_string()));
            }

            let row = EventRow {
                id: Uuid::now_v7(),
                entity_id,
                entity_type: entity_type.to_string(),
                event_type: tag.to_string(),
                payload: event.encode()?,
                occurred_at: event.occurred_at(),
                version: expected_version + offset as i64 + 1,
            };

            if tx.insert_event(&row).await? {
                inserted.push(row);
            } else {
                debug!(
                    entity_id = %entity_id,
                    version = row.version,
                    event_type = tag,
                    "Event already recorded, skipping"
                );
            }
        }

        Ok(inserted)
    }

    /// Committed events of one entity, oldest first. Tags this build does
    /// not know are skipped.
    pub async fn load_stream<E: DomainEvent>(&self, entity_id: Uuid) -> Result<Vec<StoredEvent<E>>, StoreError> {
        let (stream, _) = self.decode_stream(entity_id).await?;
        Ok(stream)
    }

    /// Decoded events plus the highest stored version, skipped rows included.
    async fn decode_stream<E: DomainEvent>(
        &self,
        entity_id: Uuid,
    ) -> Result<(Vec<StoredEvent<E>>, Option<i64>), StoreError> {
        let rows = self.db.fetch_events(entity_id).await?;
        let head = rows.iter().map(|row| row.version).max();
        let mut stream = Vec::with_capacity(rows.len());

        for row in rows {
            match E::registry().decode(&row.event_type, &row.payload) {
                Ok(event) => stream.push(StoredEvent {
                    event_id: row.id,
                    entity_id: row.entity_id,
                    entity_type: row.entity_type,
                    event_type: row.event_type,
                    version: row.version,
                    occurred_at: row.occurred_at,
                    event,
                }),
                Err(DecodeError::UnknownType(tag)) => {
                    warn!(
                        entity_id = %entity_id,
                        version = row.version,
                        event_type = %tag,
                        "Skipping event with unknown type"
                    );
                }
                Err(DecodeError::Malformed { source, .. }) => return Err(StoreError::Serialization(source)),
            }
        }

        Ok((stream, head))
    }

    /// Rebuild an entity from its full history.
    ///
    /// The version is the last committed one, even when trailing events were
    /// skipped, so a replayed entity saves against the same version as a
    /// loaded one.
    pub async fn replay<A: Entity>(&self, entity_id: Uuid) -> Result<A, StoreError> {
        let (stream, head) = self.decode_stream::<A::Event>(entity_id).await?;
        let (Some(first), Some(head)) = (stream.first(), head) else {
            return Err(StoreError::NotFound {
                entity_type: A::type_name().to_string(),
                id: entity_id,
            });
        };

        let mut entity = A::default();
        for stored in &stream {
            entity.apply(&stored.event);
        }
        entity.set_version(head);

        if entity.created_at() == DateTime::<Utc>::default() {
            entity.set_created_at(first.occurred_at);
        }

        Ok(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_sourcing::store::in_memory::InMemoryDatabase;
    use crate::event_sourcing::testing::{Ledger, LedgerEvent};
    use serde_json::json;

    #[tokio::test]
    async fn test_append_assigns_consecutive_versions() {
        let db = Arc::new(InMemoryDatabase::new());
        let log = EventLog::new(db.clone());
        let mut ledger = Ledger::open("ops");
        ledger.credit(5);

        let mut tx = db.begin().await.unwrap();
        let inserted = log
            .append(&mut tx, "ledger", ledger.id, ledger.uncommitted_events(), 0)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let versions: Vec<i64> = inserted.iter().map(|r| r.version).collect();
        assert_eq!(versions, vec![1, 2]);
        assert_eq!(db.events_for(ledger.id).await.len(), 2);
    }

    #[tokio::test]
    async fn test_append_retry_inserts_nothing_new() {
        let db = Arc::new(InMemoryDatabase::new());
        let log = EventLog::new(db.clone());
        let ledger = Ledger::open("ops");

        for expected_new in [1, 0] {
            let mut tx = db.begin().await.unwrap();
            let inserted = log
                .append(&mut tx, "ledger", ledger.id, ledger.uncommitted_events(), 0)
                .await
                .unwrap();
            tx.commit().await.unwrap();
            assert_eq!(inserted.len(), expected_new);
        }

        assert_eq!(db.events_for(ledger.id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_append_rejects_unregistered_tag() {
        let db = Arc::new(InMemoryDatabase::new());
        let log = EventLog::new(db.clone());
        let mut ledger = Ledger::open("ops");
        let bogus = match &ledger.uncommitted_events()[0] {
            LedgerEvent::Opened(e) => LedgerEvent::Unregistered(crate::event_sourcing::testing::LedgerCredited {
                amount: 1,
                occurred_at: e.occurred_at,
            }),
            _ => unreachable!(),
        };
        ledger.record(bogus);

        let mut tx = db.begin().await.unwrap();
        let err = log
            .append(&mut tx, "ledger", ledger.id, ledger.uncommitted_events(), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownEventType(tag) if tag == "ledger-unregistered"));
    }

    #[tokio::test]
    async fn test_replay_skips_unknown_tags() {
        let db = Arc::new(InMemoryDatabase::new());
        let log = EventLog::new(db.clone());
        let mut ledger = Ledger::open("ops");
        ledger.credit(10);

        let mut tx = db.begin().await.unwrap();
        log.append(&mut tx, "ledger", ledger.id, ledger.uncommitted_events(), 0)
            .await
            .unwrap();
        tx.insert_event(&EventRow {
            id: Uuid::now_v7(),
            entity_id: ledger.id,
            entity_type: "ledger".into(),
            event_type: "ledger-audited".into(),
            payload: json!({ "auditor": "x" }),
            occurred_at: Utc::now(),
            version: 3,
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let stream = log.load_stream::<LedgerEvent>(ledger.id).await.unwrap();
        assert_eq!(stream.len(), 2);

        let replayed: Ledger = log.replay(ledger.id).await.unwrap();
        assert_eq!(replayed.balance, 10);
        assert_eq!(replayed.owner, "ops");
        assert_eq!(replayed.version(), 3);
    }

    #[tokio::test]
    async fn test_replay_of_empty_stream_is_not_found() {
        let db = Arc::new(InMemoryDatabase::new());
        let log = EventLog::new(db);
        let err = log.replay::<Ledger>(Uuid::new_v4()).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
