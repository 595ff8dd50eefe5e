use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::event_sourcing::{Clock, Database, DeadLetterRow, DomainEvent, StoreError, SystemClock, Transaction};
use crate::messaging::{EventSink, OutboundEvent, PublishError};
use crate::metrics::Metrics;

// ============================================================================
// Outbox Relay - Polls the outbox table and publishes to the sink
// ============================================================================
//
// One tick:
// 1. Begin a transaction and lock up to `batch_size` undelivered rows
//    (oldest first, SKIP LOCKED on PostgreSQL)
// 2. Decode each row through the event registry; rows that cannot be decoded
//    are moved to the dead-letter table
// 3. Publish the decoded batch
// 4. Delete (or mark delivered) every drained row and commit
//
// Any failure rolls the transaction back, so the same rows are offered again
// on the next tick. Delivery is at-least-once; consumers dedupe on event_id.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Remove rows once the sink confirms
    Delete,
    /// Keep rows, stamped with `delivered_at`
    MarkDelivered,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub poll_interval: Duration,
    pub batch_size: usize,
    /// Upper bound for each step of a tick
    pub operation_timeout: Duration,
    pub delivery: DeliveryMode,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
            operation_timeout: Duration::from_secs(10),
            delivery: DeliveryMode::Delete,
        }
    }
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Storage failure: {0}")]
    Store(#[from] StoreError),

    #[error("Publish failed: {0}")]
    Publish(#[from] PublishError),

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
}

impl RelayError {
    fn label(&self) -> &'static str {
        match self {
            RelayError::Store(_) => "store",
            RelayError::Publish(_) => "publish",
            RelayError::Timeout { .. } => "timeout",
        }
    }

    /// Reason label when the sink itself failed, `None` for storage faults.
    fn publish_failure(&self) -> Option<&'static str> {
        match self {
            RelayError::Publish(e) => Some(e.kind()),
            RelayError::Timeout { operation: "publish", .. } => Some("timeout"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub fetched: usize,
    pub published: usize,
    pub dead_lettered: usize,
}

pub struct OutboxRelay<D, S, E>
where
    D: Database,
    S: EventSink<E>,
    E: DomainEvent,
{
    db: Arc<D>,
    sink: S,
    config: RelayConfig,
    clock: Arc<dyn Clock>,
    metrics: Option<Arc<Metrics>>,
    _events: PhantomData<fn() -> E>,
}

impl<D, S, E> OutboxRelay<D, S, E>
where
    D: Database,
    S: EventSink<E>,
    E: DomainEvent,
{
    pub fn new(db: Arc<D>, sink: S, config: RelayConfig) -> Self {
        Self {
            db,
            sink,
            config,
            clock: Arc::new(SystemClock),
            metrics: None,
            _events: PhantomData,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    async fn bounded<T, Fail, F>(&self, operation: &'static str, fut: F) -> Result<T, RelayError>
    where
        F: Future<Output = Result<T, Fail>>,
        Fail: Into<RelayError>,
    {
        let timeout = self.config.operation_timeout;
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(RelayError::Timeout { operation, timeout }),
        }
    }

    /// Drain at most one batch.
    pub async fn tick(&self) -> Result<TickReport, RelayError> {
        let started = Instant::now();
        let mut tx = self.bounded("begin", self.db.begin()).await?;

        let drained = self.drain(&mut tx).await;
        let outcome = match drained {
            Ok(report) if report.fetched == 0 => {
                if let Err(e) = self.bounded("rollback", tx.rollback()).await {
                    tracing::warn!(error = %e, "Rollback of empty relay tick failed");
                }
                return Ok(report);
            }
            Ok(report) => self.bounded("commit", tx.commit()).await.map(|_| report),
            Err(e) => {
                if let Err(rollback_err) = self.bounded("rollback", tx.rollback()).await {
                    tracing::warn!(error = %rollback_err, "Rollback after relay failure failed");
                }
                Err(e)
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.observe_tick(started.elapsed().as_secs_f64(), outcome.is_ok());
        }
        outcome
    }

    async fn drain(&self, tx: &mut D::Tx) -> Result<TickReport, RelayError> {
        let rows = self
            .bounded("fetch", tx.fetch_outbox_batch(self.config.batch_size))
            .await?;
        if rows.is_empty() {
            return Ok(TickReport::default());
        }

        let now = self.clock.now();
        let mut outbound = Vec::with_capacity(rows.len());
        let mut dead = Vec::new();

        for row in &rows {
            match E::registry().decode(&row.event_type, &row.payload) {
                Ok(event) => outbound.push(OutboundEvent {
                    outbox_id: row.id,
                    event_id: row.event_id,
                    entity_id: row.entity_id,
                    entity_type: row.entity_type.clone(),
                    event_type: row.event_type.clone(),
                    occurred_at: row.occurred_at,
                    event,
                }),
                Err(e) => {
                    tracing::warn!(
                        outbox_id = row.id,
                        event_id = %row.event_id,
                        event_type = %row.event_type,
                        error = %e,
                        "☠️ Dead-lettering undecodable outbox row"
                    );
                    dead.push(DeadLetterRow::from_outbox(row, e.to_string(), now));
                }
            }
        }

        if !outbound.is_empty() {
            self.bounded("publish", self.sink.publish(&outbound)).await?;
        }

        for letter in &dead {
            self.bounded("dead-letter", tx.insert_dead_letter(letter)).await?;
        }

        let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
        match self.config.delivery {
            DeliveryMode::Delete => self.bounded("delete", tx.delete_outbox(&ids)).await?,
            DeliveryMode::MarkDelivered => {
                self.bounded("mark-delivered", tx.mark_outbox_delivered(&ids, now))
                    .await?
            }
        }

        if let Some(metrics) = &self.metrics {
            for event in &outbound {
                metrics.record_published(&event.event_type);
            }
            for letter in &dead {
                metrics.record_dead_lettered(&letter.event_type);
            }
        }

        Ok(TickReport {
            fetched: rows.len(),
            published: outbound.len(),
            dead_lettered: dead.len(),
        })
    }

    /// Poll until `shutdown` flips to `true` (or its sender is dropped).
    ///
    /// An in-flight tick is abandoned on shutdown; dropping its transaction
    /// rolls it back so the rows stay pending for the next start.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            delivery = ?self.config.delivery,
            "🔄 Starting outbox relay"
        );

        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // `wait_for` also resolves (with an error) once the sender is gone.
        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait_for(|stop| *stop) => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                biased;
                _ = shutdown.wait_for(|stop| *stop) => {
                    tracing::warn!("Shutdown requested mid-tick, abandoning batch");
                    break;
                }
                outcome = self.tick() => self.log_outcome(outcome),
            }
        }

        if let Err(e) = self.sink.close().await {
            tracing::error!(error = %e, "Failed to close sink");
        }
        tracing::info!("🛑 Outbox relay stopped");
    }

    fn log_outcome(&self, outcome: Result<TickReport, RelayError>) {
        match outcome {
            Ok(report) if report.fetched > 0 => tracing::info!(
                fetched = report.fetched,
                published = report.published,
                dead_lettered = report.dead_lettered,
                "📬 Relayed outbox batch"
            ),
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "Relay tick failed, batch left pending");
                if let Some(metrics) = &self.metrics {
                    metrics.record_tick_failure(e.label());
                    if let Some(reason) = e.publish_failure() {
                        metrics.record_publish_failure(reason);
                    }
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_sourcing::testing::{Ledger, LedgerEvent};
    use crate::event_sourcing::{
        AggregateStore, EventRow, FixedClock, InMemoryDatabase, InMemoryTransaction, InjectedFailure,
        OutboxRow, SnapshotRow,
    };
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;
    use uuid::Uuid;

    /// Records every batch; fails the first `failures` calls.
    #[derive(Default)]
    struct RecordingSink {
        batches: Mutex<Vec<Vec<OutboundEvent<LedgerEvent>>>>,
        failures: AtomicUsize,
        closed: AtomicUsize,
    }

    impl RecordingSink {
        fn failing(times: usize) -> Self {
            Self {
                failures: AtomicUsize::new(times),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl EventSink<LedgerEvent> for Arc<RecordingSink> {
        async fn publish(&self, events: &[OutboundEvent<LedgerEvent>]) -> Result<(), PublishError> {
            self.batches.lock().await.push(events.to_vec());
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(PublishError::Unavailable("broker down".into()));
            }
            Ok(())
        }

        async fn close(&self) -> Result<(), PublishError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Never completes a publish.
    struct HangingSink;

    #[async_trait]
    impl EventSink<LedgerEvent> for HangingSink {
        async fn publish(&self, _events: &[OutboundEvent<LedgerEvent>]) -> Result<(), PublishError> {
            std::future::pending::<()>().await;
            Ok(())
        }

        async fn close(&self) -> Result<(), PublishError> {
            Ok(())
        }
    }

    /// In-memory database whose transactions never finish a rollback.
    struct StuckRollbackDb(InMemoryDatabase);

    struct StuckRollbackTx(InMemoryTransaction);

    #[async_trait]
    impl Database for StuckRollbackDb {
        type Tx = StuckRollbackTx;

        async fn begin(&self) -> Result<Self::Tx, StoreError> {
            Ok(StuckRollbackTx(self.0.begin().await?))
        }

        async fn fetch_events(
            &self,
            entity_id: Uuid,
        ) -> Result<Vec<EventRow>, StoreError> {
            self.0.fetch_events(entity_id).await
        }
    }

    #[async_trait]
    impl Transaction for StuckRollbackTx {
        async fn fetch_snapshot(
            &mut self,
            storage: &str,
            id: Uuid,
        ) -> Result<Option<SnapshotRow>, StoreError> {
            self.0.fetch_snapshot(storage, id).await
        }

        async fn insert_snapshot(
            &mut self,
            storage: &str,
            row: &SnapshotRow,
        ) -> Result<(), StoreError> {
            self.0.insert_snapshot(storage, row).await
        }

        async fn update_snapshot(
            &mut self,
            storage: &str,
            id: Uuid,
            state: &serde_json::Value,
            expected_version: i64,
            new_version: i64,
        ) -> Result<u64, StoreError> {
            self.0
                .update_snapshot(storage, id, state, expected_version, new_version)
                .await
        }

        async fn insert_event(&mut self, row: &EventRow) -> Result<bool, StoreError> {
            self.0.insert_event(row).await
        }

        async fn insert_outbox(&mut self, event: &EventRow) -> Result<(), StoreError> {
            self.0.insert_outbox(event).await
        }

        async fn fetch_outbox_batch(
            &mut self,
            limit: usize,
        ) -> Result<Vec<OutboxRow>, StoreError> {
            self.0.fetch_outbox_batch(limit).await
        }

        async fn delete_outbox(&mut self, ids: &[i64]) -> Result<(), StoreError> {
            self.0.delete_outbox(ids).await
        }

        async fn mark_outbox_delivered(
            &mut self,
            ids: &[i64],
            at: chrono::DateTime<Utc>,
        ) -> Result<(), StoreError> {
            self.0.mark_outbox_delivered(ids, at).await
        }

        async fn insert_dead_letter(&mut self, row: &DeadLetterRow) -> Result<(), StoreError> {
            self.0.insert_dead_letter(row).await
        }

        async fn commit(self) -> Result<(), StoreError> {
            self.0.commit().await
        }

        async fn rollback(self) -> Result<(), StoreError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn config(delivery: DeliveryMode) -> RelayConfig {
        RelayConfig {
            poll_interval: Duration::from_millis(20),
            batch_size: 10,
            operation_timeout: Duration::from_secs(5),
            delivery,
        }
    }

    async fn seed_ledger(db: &Arc<InMemoryDatabase>, credits: usize) -> Ledger {
        let store = AggregateStore::new(db.clone());
        let mut ledger = Ledger::open("ops");
        for i in 0..credits {
            ledger.credit(i as i64 + 1);
        }
        let tx = store.begin().await.unwrap();
        store.save(tx, &mut ledger).await.unwrap();
        ledger
    }

    #[tokio::test]
    async fn test_tick_publishes_and_deletes() {
        let db = Arc::new(InMemoryDatabase::new());
        let ledger = seed_ledger(&db, 2).await;
        let sink = Arc::new(RecordingSink::default());
        let relay = OutboxRelay::new(db.clone(), sink.clone(), config(DeliveryMode::Delete));

        let report = relay.tick().await.unwrap();
        assert_eq!(report, TickReport { fetched: 3, published: 3, dead_lettered: 0 });
        assert!(db.outbox_rows().await.is_empty());

        let batches = sink.batches.lock().await;
        let tags: Vec<&str> = batches[0].iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(tags, vec!["ledger-opened", "ledger-credited", "ledger-credited"]);
        assert!(batches[0].iter().all(|e| e.entity_id == ledger.id));
    }

    #[tokio::test]
    async fn test_failed_publish_leaves_rows_for_next_tick() {
        let db = Arc::new(InMemoryDatabase::new());
        seed_ledger(&db, 2).await;
        let sink = Arc::new(RecordingSink::failing(1));
        let relay = OutboxRelay::new(db.clone(), sink.clone(), config(DeliveryMode::Delete));

        let err = relay.tick().await.unwrap_err();
        assert!(matches!(err, RelayError::Publish(PublishError::Unavailable(_))));
        assert_eq!(db.outbox_rows().await.len(), 3);

        relay.tick().await.unwrap();
        assert!(db.outbox_rows().await.is_empty());

        let batches = sink.batches.lock().await;
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 3);
        assert_eq!(batches[0], batches[1]);
    }

    #[tokio::test]
    async fn test_batches_are_bounded_and_oldest_first() {
        let db = Arc::new(InMemoryDatabase::new());
        seed_ledger(&db, 14).await;
        let sink = Arc::new(RecordingSink::default());
        let relay = OutboxRelay::new(db.clone(), sink.clone(), config(DeliveryMode::Delete));

        assert_eq!(relay.tick().await.unwrap().fetched, 10);
        assert_eq!(relay.tick().await.unwrap().fetched, 5);
        assert_eq!(relay.tick().await.unwrap().fetched, 0);

        let batches = sink.batches.lock().await;
        let ids: Vec<i64> = batches.iter().flatten().map(|e| e.outbox_id).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
    }

    #[tokio::test]
    async fn test_poison_row_is_dead_lettered_without_blocking() {
        let db = Arc::new(InMemoryDatabase::new());
        let earlier = Utc::now() - chrono::Duration::seconds(60);
        let poison = db.seed_outbox("ledger-audited", json!({ "auditor": "x" }), earlier).await;
        let malformed = db.seed_outbox("ledger-credited", json!({ "amount": "lots" }), earlier).await;
        seed_ledger(&db, 0).await;

        let sink = Arc::new(RecordingSink::default());
        let relay = OutboxRelay::new(db.clone(), sink.clone(), config(DeliveryMode::Delete));

        let report = relay.tick().await.unwrap();
        assert_eq!(report, TickReport { fetched: 3, published: 1, dead_lettered: 2 });
        assert!(db.outbox_rows().await.is_empty());

        let letters = db.dead_letters().await;
        let ids: Vec<i64> = letters.iter().map(|l| l.outbox_id).collect();
        assert_eq!(ids, vec![poison.id, malformed.id]);
        assert!(letters[0].reason.contains("ledger-audited"));
    }

    #[tokio::test]
    async fn test_batch_of_only_poison_rows_is_still_drained() {
        let db = Arc::new(InMemoryDatabase::new());
        db.seed_outbox("ledger-audited", json!({}), Utc::now()).await;
        let sink = Arc::new(RecordingSink::default());
        let relay = OutboxRelay::new(db.clone(), sink.clone(), config(DeliveryMode::Delete));

        let report = relay.tick().await.unwrap();
        assert_eq!(report.dead_lettered, 1);
        assert!(sink.batches.lock().await.is_empty());
        assert!(db.outbox_rows().await.is_empty());
    }

    #[tokio::test]
    async fn test_mark_delivered_retains_rows_without_refetch() {
        let db = Arc::new(InMemoryDatabase::new());
        seed_ledger(&db, 1).await;
        let clock = Arc::new(FixedClock::at(Utc::now()));
        let sink = Arc::new(RecordingSink::default());
        let relay = OutboxRelay::new(db.clone(), sink.clone(), config(DeliveryMode::MarkDelivered))
            .with_clock(clock.clone());

        assert_eq!(relay.tick().await.unwrap().published, 2);
        assert_eq!(relay.tick().await.unwrap().fetched, 0);

        let rows = db.outbox_rows().await;
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.delivered_at == Some(clock.now())));
    }

    #[tokio::test]
    async fn test_failed_commit_republishes_same_rows() {
        let db = Arc::new(InMemoryDatabase::new());
        seed_ledger(&db, 0).await;
        let sink = Arc::new(RecordingSink::default());
        let relay = OutboxRelay::new(db.clone(), sink.clone(), config(DeliveryMode::Delete));

        db.inject_commit_failure(InjectedFailure::Storage("lost".into())).await;
        assert!(matches!(relay.tick().await, Err(RelayError::Store(_))));
        assert_eq!(db.outbox_rows().await.len(), 1);

        relay.tick().await.unwrap();
        assert_eq!(sink.batches.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_hanging_publish_times_out() {
        let db = Arc::new(InMemoryDatabase::new());
        seed_ledger(&db, 0).await;
        let mut cfg = config(DeliveryMode::Delete);
        cfg.operation_timeout = Duration::from_millis(50);
        let relay = OutboxRelay::new(db.clone(), HangingSink, cfg);

        let err = relay.tick().await.unwrap_err();
        assert!(matches!(err, RelayError::Timeout { operation: "publish", .. }));
        assert_eq!(db.outbox_rows().await.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_during_hanging_publish_leaves_rows_pending() {
        let db = Arc::new(InMemoryDatabase::new());
        seed_ledger(&db, 1).await;
        let relay = OutboxRelay::new(db.clone(), HangingSink, config(DeliveryMode::Delete));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(relay.run(rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("relay did not stop")
            .unwrap();

        assert_eq!(db.outbox_rows().await.len(), 2);
    }

    #[tokio::test]
    async fn test_run_drains_and_closes_sink() {
        let db = Arc::new(InMemoryDatabase::new());
        seed_ledger(&db, 2).await;
        let sink = Arc::new(RecordingSink::default());
        let relay = OutboxRelay::new(db.clone(), sink.clone(), config(DeliveryMode::Delete));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(relay.run(rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(db.outbox_rows().await.is_empty());
        assert_eq!(sink.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_relay_metrics_count_published_events() {
        let db = Arc::new(InMemoryDatabase::new());
        seed_ledger(&db, 1).await;
        let metrics = Arc::new(Metrics::new().unwrap());
        let relay = OutboxRelay::new(db.clone(), Arc::new(RecordingSink::default()), config(DeliveryMode::Delete))
            .with_metrics(metrics.clone());

        relay.tick().await.unwrap();
        assert_eq!(
            metrics
                .outbox_events_published
                .with_label_values(&["ledger-credited"])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn test_unchanged_shutdown_value_keeps_relay_running() {
        let db = Arc::new(InMemoryDatabase::new());
        let sink = Arc::new(RecordingSink::default());
        let relay = OutboxRelay::new(db.clone(), sink.clone(), config(DeliveryMode::Delete));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(relay.run(rx));

        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(false).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());
        assert_eq!(sink.closed.load(Ordering::SeqCst), 0);

        // Rows written after the no-op signal are still drained.
        seed_ledger(&db, 1).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(db.outbox_rows().await.is_empty());

        tx.send(true).unwrap();
        handle.await.unwrap();
        assert_eq!(sink.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropped_shutdown_sender_stops_relay() {
        let db = Arc::new(InMemoryDatabase::new());
        let sink = Arc::new(RecordingSink::default());
        let relay = OutboxRelay::new(db, sink.clone(), config(DeliveryMode::Delete));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(relay.run(rx));
        drop(tx);

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("relay did not stop")
            .unwrap();
        assert_eq!(sink.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_store_failure_is_not_counted_as_publish_failure() {
        let db = Arc::new(InMemoryDatabase::new());
        seed_ledger(&db, 0).await;
        let metrics = Arc::new(Metrics::new().unwrap());
        let sink = Arc::new(RecordingSink::failing(1));
        let relay = OutboxRelay::new(db.clone(), sink, config(DeliveryMode::Delete))
            .with_metrics(metrics.clone());

        let outcome = relay.tick().await;
        relay.log_outcome(outcome);

        db.inject_commit_failure(InjectedFailure::Storage("lost".into())).await;
        let outcome = relay.tick().await;
        relay.log_outcome(outcome);

        assert_eq!(metrics.outbox_tick_failures.with_label_values(&["publish"]).get(), 1);
        assert_eq!(metrics.outbox_tick_failures.with_label_values(&["store"]).get(), 1);
        assert_eq!(
            metrics
                .outbox_publish_failures
                .with_label_values(&["unavailable"])
                .get(),
            1
        );
        assert_eq!(metrics.outbox_publish_failures.with_label_values(&["store"]).get(), 0);
    }

    #[tokio::test]
    async fn test_hung_rollback_is_bounded_by_operation_timeout() {
        let inner = InMemoryDatabase::new();
        let store = AggregateStore::new(Arc::new(inner.clone()));
        let mut ledger = Ledger::open("ops");
        let tx = store.begin().await.unwrap();
        store.save(tx, &mut ledger).await.unwrap();

        let mut cfg = config(DeliveryMode::Delete);
        cfg.operation_timeout = Duration::from_millis(50);
        let relay = OutboxRelay::new(
            Arc::new(StuckRollbackDb(inner.clone())),
            Arc::new(RecordingSink::failing(1)),
            cfg,
        );

        let outcome = tokio::time::timeout(Duration::from_secs(2), relay.tick())
            .await
            .expect("tick stuck in rollback");
        assert!(matches!(outcome, Err(RelayError::Publish(_))));
        assert_eq!(inner.outbox_rows().await.len(), 1);

        // An empty outbox also rolls back, and must not hang either.
        let empty = OutboxRelay::<_, _, LedgerEvent>::new(
            Arc::new(StuckRollbackDb(InMemoryDatabase::new())),
            Arc::new(RecordingSink::default()),
            RelayConfig { operation_timeout: Duration::from_millis(50), ..config(DeliveryMode::Delete) },
        );
        let report = tokio::time::timeout(Duration::from_secs(2), empty.tick())
            .await
            .expect("empty tick stuck in rollback")
            .unwrap();
        assert_eq!(report, TickReport::default());
    }
}
