// ============================================================================
// Outbox Relay
// ============================================================================
//
// Background drain of the transactional outbox into an `EventSink`.
//
// ============================================================================

pub mod outbox_relay;

pub use outbox_relay::{DeliveryMode, OutboxRelay, RelayConfig, RelayError, TickReport};
