use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// One decoded outbox row on its way to the sink.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundEvent<E> {
    pub outbox_id: i64,
    pub event_id: Uuid,
    pub entity_id: Uuid,
    pub entity_type: String,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub event: E,
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Sink rejected event {event_id}: {reason}")]
    Rejected { event_id: Uuid, reason: String },

    #[error("Sink unavailable: {0}")]
    Unavailable(String),

    #[error("Publish not confirmed within {0:?}")]
    Timeout(Duration),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PublishError {
    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            PublishError::Rejected { .. } => "rejected",
            PublishError::Unavailable(_) => "unavailable",
            PublishError::Timeout(_) => "timeout",
            PublishError::Serialization(_) => "serialization",
        }
    }
}

/// External delivery target of the outbox relay.
///
/// `publish` returning `Ok` means every event in the batch was accepted; the
/// relay then drains the batch. Any error leaves the whole batch pending.
#[async_trait]
pub trait EventSink<E: Send + Sync>: Send + Sync {
    async fn publish(&self, events: &[OutboundEvent<E>]) -> Result<(), PublishError>;

    /// Flush and release resources. Called once when the relay stops.
    async fn close(&self) -> Result<(), PublishError>;
}
