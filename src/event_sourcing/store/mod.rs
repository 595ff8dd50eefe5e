// ============================================================================
// Event Sourcing Store - Persistence Layer
// ============================================================================
//
// `Database`/`Transaction` are the storage seam. `AggregateStore` and
// `EventLog` are generic over any backend and any entity kind.
//
// ============================================================================

pub mod aggregate_store;
pub mod database;
pub mod event_log;
pub mod in_memory;
pub mod postgres;

pub use aggregate_store::AggregateStore;
pub use database::{Database, DeadLetterRow, EventRow, OutboxRow, SnapshotRow, Transaction};
pub use event_log::EventLog;
pub use in_memory::{InMemoryDatabase, InMemoryTransaction, InjectedFailure};
pub use postgres::{PgDatabase, PgTransaction, PostgresConfig};
