use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;
use uuid::Uuid;

use super::registry::EventRegistry;

// ============================================================================
// Domain Event Trait
// ============================================================================
//
// Every entity kind owns a closed enum of its events. The enum knows the
// stable tag of each variant and how to encode the variant's payload; the
// registry knows how to turn a (tag, payload) pair back into the enum.
//
// ============================================================================

/// Event emitted by an entity.
///
/// The tag returned by `event_type` is persisted next to the payload and must
/// stay stable for the lifetime of the stored data.
pub trait DomainEvent: Clone + Debug + Send + Sync + 'static {
    /// Stable string tag, e.g. `survey-created`
    fn event_type(&self) -> &'static str;

    fn occurred_at(&self) -> DateTime<Utc>;

    /// Payload of the variant, without the tag
    fn encode(&self) -> Result<serde_json::Value, serde_json::Error>;

    /// Decoders for every tag of this event family
    fn registry() -> &'static EventRegistry<Self>
    where
        Self: Sized;
}

// ============================================================================
// Stored Event
// ============================================================================

/// Typed event read back from the event log, with its log metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent<E> {
    pub event_id: Uuid,
    pub entity_id: Uuid,
    pub entity_type: String,
    pub event_type: String,
    pub version: i64,
    pub occurred_at: DateTime<Utc>,
    pub event: E,
}

// ============================================================================
// Payload Helpers
// ============================================================================

pub fn encode_payload<P: Serialize>(payload: &P) -> Result<serde_json::Value, serde_json::Error> {
    serde_json::to_value(payload)
}

pub fn decode_payload<P: DeserializeOwned>(payload: &serde_json::Value) -> Result<P, serde_json::Error> {
    P::deserialize(payload)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
    struct Credited {
        amount: i64,
    }

    #[test]
    fn test_payload_encoding_has_no_tag() {
        let value = encode_payload(&Credited { amount: 7 }).unwrap();
        assert_eq!(value, serde_json::json!({ "amount": 7 }));

        let back: Credited = decode_payload(&value).unwrap();
        assert_eq!(back, Credited { amount: 7 });
    }

    #[test]
    fn test_decode_payload_rejects_wrong_shape() {
        let value = serde_json::json!({ "amount": "seven" });
        assert!(decode_payload::<Credited>(&value).is_err());
    }
}
