// ============================================================================
// Event Sourcing Infrastructure
// ============================================================================
//
// Generic persistence for event-sourced entities: snapshot, event log and
// outbox written in one transaction. Domain code lives in src/domain/.
//
// ============================================================================

mod core;
mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use self::core::*;
pub use self::store::*;
