//! Event-sourced aggregate persistence with a transactional outbox.
//!
//! Aggregates are saved as a snapshot, their new events, and one outbox row
//! per event, all in one transaction with optimistic concurrency on the
//! snapshot version. A background relay drains the outbox to Redpanda.

pub mod config;
pub mod domain;
pub mod event_sourcing;
pub mod messaging;
pub mod metrics;
pub mod relay;
pub mod utils;
