mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry};

pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Covers:
// - Outbox relay throughput, dead letters, publish and tick failures, tick latency
// - Aggregate saves and OCC conflicts per entity type
// - Retry attempts and outcomes
// - Circuit breaker state transitions
//
// Everything is registered on one Registry and scraped via /metrics.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Outbox relay
    pub outbox_events_published: IntCounterVec,
    pub outbox_events_dead_lettered: IntCounterVec,
    pub outbox_publish_failures: IntCounterVec,
    pub outbox_tick_failures: IntCounterVec,
    pub outbox_tick_duration: HistogramVec,

    // Aggregate store
    pub aggregate_saves: IntCounterVec,
    pub aggregate_save_conflicts: IntCounterVec,

    // Retry
    pub retry_attempts_total: IntCounterVec,
    pub retry_success: IntCounterVec,
    pub retry_failure: IntCounterVec,

    // Circuit breaker
    pub circuit_breaker_state: IntGauge,
    pub circuit_breaker_transitions: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let outbox_events_published = IntCounterVec::new(
            Opts::new("outbox_events_published_total", "Outbox events confirmed by the sink"),
            &["event_type"],
        )?;
        registry.register(Box::new(outbox_events_published.clone()))?;

        let outbox_events_dead_lettered = IntCounterVec::new(
            Opts::new("outbox_events_dead_lettered_total", "Undecodable outbox rows moved to dead letters"),
            &["event_type"],
        )?;
        registry.register(Box::new(outbox_events_dead_lettered.clone()))?;

        let outbox_publish_failures = IntCounterVec::new(
            Opts::new("outbox_publish_failures_total", "Batches the sink rejected or did not confirm in time"),
            &["reason"],
        )?;
        registry.register(Box::new(outbox_publish_failures.clone()))?;

        let outbox_tick_failures = IntCounterVec::new(
            Opts::new("outbox_tick_failures_total", "Relay ticks that failed and were rolled back"),
            &["stage"],
        )?;
        registry.register(Box::new(outbox_tick_failures.clone()))?;

        let outbox_tick_duration = HistogramVec::new(
            HistogramOpts::new("outbox_tick_duration_seconds", "Duration of one relay tick")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["outcome"],
        )?;
        registry.register(Box::new(outbox_tick_duration.clone()))?;

        let aggregate_saves = IntCounterVec::new(
            Opts::new("aggregate_saves_total", "Committed aggregate saves"),
            &["entity_type"],
        )?;
        registry.register(Box::new(aggregate_saves.clone()))?;

        let aggregate_save_conflicts = IntCounterVec::new(
            Opts::new("aggregate_save_conflicts_total", "Saves rejected by optimistic concurrency"),
            &["entity_type"],
        )?;
        registry.register(Box::new(aggregate_save_conflicts.clone()))?;

        let retry_attempts_total = IntCounterVec::new(
            Opts::new("retry_attempts_total", "Total retry attempts"),
            &["operation", "attempt"],
        )?;
        registry.register(Box::new(retry_attempts_total.clone()))?;

        let retry_success = IntCounterVec::new(
            Opts::new("retry_success_total", "Operations that eventually succeeded"),
            &["operation"],
        )?;
        registry.register(Box::new(retry_success.clone()))?;

        let retry_failure = IntCounterVec::new(
            Opts::new("retry_failure_total", "Operations that failed after all attempts"),
            &["operation"],
        )?;
        registry.register(Box::new(retry_failure.clone()))?;

        let circuit_breaker_state = IntGauge::new(
            "circuit_breaker_state",
            "Circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        let circuit_breaker_transitions = IntCounterVec::new(
            Opts::new("circuit_breaker_transitions_total", "Circuit breaker state transitions"),
            &["from_state", "to_state"],
        )?;
        registry.register(Box::new(circuit_breaker_transitions.clone()))?;

        Ok(Self {
            registry,
            outbox_events_published,
            outbox_events_dead_lettered,
            outbox_publish_failures,
            outbox_tick_failures,
            outbox_tick_duration,
            aggregate_saves,
            aggregate_save_conflicts,
            retry_attempts_total,
            retry_success,
            retry_failure,
            circuit_breaker_state,
            circuit_breaker_transitions,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_published(&self, event_type: &str) {
        self.outbox_events_published.with_label_values(&[event_type]).inc();
    }

    pub fn record_dead_lettered(&self, event_type: &str) {
        self.outbox_events_dead_lettered.with_label_values(&[event_type]).inc();
    }

    pub fn record_publish_failure(&self, reason: &str) {
        self.outbox_publish_failures.with_label_values(&[reason]).inc();
    }

    pub fn record_tick_failure(&self, stage: &str) {
        self.outbox_tick_failures.with_label_values(&[stage]).inc();
    }

    pub fn observe_tick(&self, duration_secs: f64, success: bool) {
        let outcome = if success { "ok" } else { "error" };
        self.outbox_tick_duration.with_label_values(&[outcome]).observe(duration_secs);
    }

    pub fn record_aggregate_saved(&self, entity_type: &str) {
        self.aggregate_saves.with_label_values(&[entity_type]).inc();
    }

    pub fn record_save_conflict(&self, entity_type: &str) {
        self.aggregate_save_conflicts.with_label_values(&[entity_type]).inc();
    }

    pub fn record_retry_attempt(&self, operation: &str, attempt: u32) {
        self.retry_attempts_total.with_label_values(&[operation, &attempt.to_string()]).inc();
    }

    pub fn record_retry_outcome(&self, operation: &str, success: bool) {
        if success {
            self.retry_success.with_label_values(&[operation]).inc();
        } else {
            self.retry_failure.with_label_values(&[operation]).inc();
        }
    }

    pub fn update_circuit_breaker_state(&self, state: u8) {
        self.circuit_breaker_state.set(state as i64);
    }

    pub fn record_circuit_breaker_transition(&self, from_state: &str, to_state: &str) {
        self.circuit_breaker_transitions.with_label_values(&[from_state, to_state]).inc();
    }
}
