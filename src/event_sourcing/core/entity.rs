use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use super::event::DomainEvent;

// ============================================================================
// Aggregate Bookkeeping
// ============================================================================
//
// Version, creation time and the uncommitted queue are persistence concerns,
// not business state. Entities embed an `AggregateMeta` marked
// `#[serde(skip)]` so the snapshot only carries the business fields.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateMeta<E> {
    version: i64,
    created_at: DateTime<Utc>,
    uncommitted: Vec<E>,
}

impl<E> Default for AggregateMeta<E> {
    fn default() -> Self {
        Self {
            version: 0,
            created_at: DateTime::<Utc>::default(),
            uncommitted: Vec::new(),
        }
    }
}

// ============================================================================
// Entity Trait
// ============================================================================

/// A persistable unit of state identified by a stable id.
///
/// Live mutations go through `record`, which runs the same `apply` that
/// replay uses, so an entity rebuilt from its stream converges with the one
/// that produced it.
pub trait Entity: Serialize + DeserializeOwned + Default + Send + Sync + 'static {
    type Event: DomainEvent;

    /// Logical type name stored with every event, e.g. `survey`
    fn type_name() -> &'static str;

    /// Snapshot table, e.g. `surveys`
    fn storage_name() -> &'static str;

    fn id(&self) -> Uuid;

    fn meta(&self) -> &AggregateMeta<Self::Event>;

    fn meta_mut(&mut self) -> &mut AggregateMeta<Self::Event>;

    /// Fold one event into the state. Must not fail and must not queue.
    fn apply(&mut self, event: &Self::Event);

    fn version(&self) -> i64 {
        self.meta().version
    }

    fn set_version(&mut self, version: i64) {
        self.meta_mut().version = version;
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.meta().created_at
    }

    fn set_created_at(&mut self, created_at: DateTime<Utc>) {
        self.meta_mut().created_at = created_at;
    }

    fn uncommitted_events(&self) -> &[Self::Event] {
        &self.meta().uncommitted
    }

    fn clear_uncommitted_events(&mut self) {
        self.meta_mut().uncommitted.clear();
    }

    /// Apply `event` and queue it for the next save.
    fn record(&mut self, event: Self::Event) {
        self.apply(&event);
        self.meta_mut().uncommitted.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_sourcing::testing::{Ledger, LedgerEvent};

    #[test]
    fn test_record_applies_then_queues() {
        let mut ledger = Ledger::open("ops");
        ledger.credit(40);

        assert_eq!(ledger.balance, 40);
        assert_eq!(ledger.uncommitted_events().len(), 2);
        assert!(matches!(ledger.uncommitted_events()[1], LedgerEvent::Credited(_)));
        assert_eq!(ledger.version(), 0);
    }

    #[test]
    fn test_meta_is_not_part_of_snapshot() {
        let mut ledger = Ledger::open("ops");
        ledger.set_version(9);

        let state = serde_json::to_value(&ledger).unwrap();
        assert!(state.get("meta").is_none());

        let restored: Ledger = serde_json::from_value(state).unwrap();
        assert_eq!(restored.version(), 0);
        assert!(restored.uncommitted_events().is_empty());
        assert_eq!(restored.owner, "ops");
    }

    #[test]
    fn test_creation_event_sets_created_at() {
        let ledger = Ledger::open("ops");
        assert_ne!(ledger.created_at(), DateTime::<Utc>::default());
    }
}
