use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::event::decode_payload;

type Decoder<E> = Arc<dyn Fn(&Value) -> Result<E, serde_json::Error> + Send + Sync>;

/// Why a stored (tag, payload) pair could not become a typed event.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Unknown event type: {0}")]
    UnknownType(String),

    #[error("Malformed {event_type} payload: {source}")]
    Malformed {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Maps event-type tags to typed decoders.
///
/// Built once per event family (usually behind a `once_cell::sync::Lazy`)
/// and shared by replay, write-path validation and the outbox relay.
pub struct EventRegistry<E> {
    decoders: HashMap<&'static str, Decoder<E>>,
}

impl<E: 'static> EventRegistry<E> {
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Register `tag` as decoding into payload `P`, wrapped into `E`.
    pub fn register<P>(mut self, tag: &'static str, wrap: fn(P) -> E) -> Self
    where
        P: DeserializeOwned + 'static,
    {
        let decoder: Decoder<E> = Arc::new(move |payload| decode_payload::<P>(payload).map(wrap));
        self.decoders.insert(tag, decoder);
        self
    }

    /// Pull every decoder of another family into this one.
    pub fn extend_from<F: 'static>(mut self, other: &EventRegistry<F>, wrap: fn(F) -> E) -> Self {
        for (tag, decoder) in &other.decoders {
            let decoder = Arc::clone(decoder);
            let wrapped: Decoder<E> = Arc::new(move |payload| decoder(payload).map(wrap));
            self.decoders.insert(*tag, wrapped);
        }
        self
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.decoders.contains_key(tag)
    }

    pub fn decode(&self, tag: &str, payload: &Value) -> Result<E, DecodeError> {
        let decoder = self
            .decoders
            .get(tag)
            .ok_or_else(|| DecodeError::UnknownType(tag.to_string()))?;

        decoder(payload).map_err(|source| DecodeError::Malformed {
            event_type: tag.to_string(),
            source,
        })
    }

    pub fn tags(&self) -> Vec<&'static str> {
        let mut tags: Vec<_> = self.decoders.keys().copied().collect();
        tags.sort_unstable();
        tags
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }
}

impl<E: 'static> Default for EventRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> fmt::Debug for EventRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRegistry")
            .field("tags", &self.tags())
            .finish()
    }
}
