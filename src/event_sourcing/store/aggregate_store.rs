use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::database::{Database, SnapshotRow, Transaction};
use super::event_log::EventLog;
use crate::event_sourcing::core::{DomainEvent, Entity, StoreError};
use crate::metrics::Metrics;

// ============================================================================
// Aggregate Store - Snapshot + Events + Outbox in One Transaction
// ============================================================================
//
// Save order inside the transaction:
// 1. Reject unregistered event tags
// 2. Insert the snapshot (new entity) or conditionally update it (OCC)
// 3. Append the queued events at the versions the snapshot now claims
// 4. Enqueue one outbox row per inserted event
// 5. Commit, and only then advance the in-memory entity
//
// The store never retries. A lost OCC race surfaces as
// `StoreError::ConcurrencyConflict` and the caller decides.
//
// ============================================================================

pub struct AggregateStore<D: Database> {
    db: Arc<D>,
    event_log: EventLog<D>,
    metrics: Option<Arc<Metrics>>,
}

impl<D: Database> AggregateStore<D> {
    pub fn new(db: Arc<D>) -> Self {
        let event_log = EventLog::new(Arc::clone(&db));
        Self {
            db,
            event_log,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn event_log(&self) -> &EventLog<D> {
        &self.event_log
    }

    pub fn database(&self) -> &Arc<D> {
        &self.db
    }

    /// Open a transaction scope for a load/mutate/save cycle.
    pub async fn begin(&self) -> Result<D::Tx, StoreError> {
        self.db.begin().await
    }

    /// Persist `entity` and its queued events, consuming the scope.
    ///
    /// Returns the new version. On error the scope is rolled back and the
    /// entity keeps its queue and version.
    pub async fn save<A: Entity>(&self, mut tx: D::Tx, entity: &mut A) -> Result<i64, StoreError> {
        let written = self.write(&mut tx, entity).await;
        let new_version = match written {
            Ok(version) => version,
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed after save error");
                }
                self.record_failure::<A>(&e);
                return Err(e);
            }
        };

        if let Err(e) = tx.commit().await {
            self.record_failure::<A>(&e);
            return Err(e);
        }

        let appended = entity.uncommitted_events().len();
        entity.set_version(new_version);
        entity.clear_uncommitted_events();

        if appended > 0 {
            if let Some(metrics) = &self.metrics {
                metrics.record_aggregate_saved(A::type_name());
            }
        }

        debug!(
            entity_type = A::type_name(),
            entity_id = %entity.id(),
            version = new_version,
            events = appended,
            "💾 Saved aggregate"
        );

        Ok(new_version)
    }

    async fn write<A: Entity>(&self, tx: &mut D::Tx, entity: &A) -> Result<i64, StoreError> {
        let events = entity.uncommitted_events();
        let registry = A::Event::registry();
        if let Some(unknown) = events.iter().find(|e| !registry.contains(e.event_type())) {
            return Err(StoreError::UnknownEventType(unknown.event_type().to_string()));
        }

        let prior = entity.version();
        if prior == 0 && events.is_empty() {
            // Nothing was ever recorded; there is no state to persist.
            return Ok(0);
        }

        let count = events.len() as i64;
        let new_version = prior + count;
        let state = serde_json::to_value(entity)?;

        if prior == 0 {
            let row = SnapshotRow {
                id: entity.id(),
                entity_type: A::type_name().to_string(),
                state,
                version: new_version,
                created_at: entity.created_at(),
            };
            tx.insert_snapshot(A::storage_name(), &row).await?;
        } else {
            let affected = tx
                .update_snapshot(A::storage_name(), entity.id(), &state, prior, new_version)
                .await?;
            if affected == 0 {
                return Err(StoreError::ConcurrencyConflict {
                    entity_type: A::type_name().to_string(),
                    id: entity.id(),
                    expected: prior,
                });
            }
        }

        let inserted = self
            .event_log
            .append(tx, A::type_name(), entity.id(), events, new_version - count)
            .await?;

        for row in &inserted {
            tx.insert_outbox(row).await?;
        }

        Ok(new_version)
    }

    /// Read the latest snapshot of `id` inside the scope.
    pub async fn load<A: Entity>(&self, tx: &mut D::Tx, id: Uuid) -> Result<A, StoreError> {
        let row = tx
            .fetch_snapshot(A::storage_name(), id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                entity_type: A::type_name().to_string(),
                id,
            })?;

        let mut entity: A = serde_json::from_value(row.state)?;
        entity.set_version(row.version);
        entity.set_created_at(row.created_at);
        Ok(entity)
    }

    pub async fn exists<A: Entity>(&self, tx: &mut D::Tx, id: Uuid) -> Result<bool, StoreError> {
        Ok(tx.fetch_snapshot(A::storage_name(), id).await?.is_some())
    }

    fn record_failure<A: Entity>(&self, error: &StoreError) {
        if let Some(metrics) = &self.metrics {
            if error.is_conflict() {
                metrics.record_save_conflict(A::type_name());
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
