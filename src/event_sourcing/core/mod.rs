// ============================================================================
// Event Sourcing Core - Entity Contract & Event Abstractions
// ============================================================================
//
// Generic over the entity kind. Nothing in here knows about surveys.
//
// ============================================================================

pub mod clock;
pub mod entity;
pub mod error;
pub mod event;
pub mod registry;

pub use clock::{Clock, FixedClock, SystemClock};
pub use entity::{AggregateMeta, Entity};
pub use error::StoreError;
pub use event::{decode_payload, encode_payload, DomainEvent, StoredEvent};
pub use registry::{DecodeError, EventRegistry};
