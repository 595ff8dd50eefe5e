//! Minimal entity used by the persistence tests.

use chrono::{DateTime, SubsecRound, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{encode_payload, AggregateMeta, DomainEvent, Entity, EventRegistry};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerOpened {
    pub ledger_id: Uuid,
    pub owner: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerCredited {
    pub amount: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEvent {
    Opened(LedgerOpened),
    Credited(LedgerCredited),
    /// Never registered; exercises the write-path tag check.
    Unregistered(LedgerCredited),
}

static LEDGER_REGISTRY: Lazy<EventRegistry<LedgerEvent>> = Lazy::new(|| {
    EventRegistry::new()
        .register("ledger-opened", LedgerEvent::Opened)
        .register("ledger-credited", LedgerEvent::Credited)
});

impl DomainEvent for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::Opened(_) => "ledger-opened",
            LedgerEvent::Credited(_) => "ledger-credited",
            LedgerEvent::Unregistered(_) => "ledger-unregistered",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::Opened(e) => e.occurred_at,
            LedgerEvent::Credited(e) | LedgerEvent::Unregistered(e) => e.occurred_at,
        }
    }

    fn encode(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            LedgerEvent::Opened(e) => encode_payload(e),
            LedgerEvent::Credited(e) | LedgerEvent::Unregistered(e) => encode_payload(e),
        }
    }

    fn registry() -> &'static EventRegistry<Self> {
        &LEDGER_REGISTRY
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    pub id: Uuid,
    pub owner: String,
    pub balance: i64,
    #[serde(skip)]
    meta: AggregateMeta<LedgerEvent>,
}

impl Ledger {
    pub fn open(owner: &str) -> Self {
        let mut ledger = Ledger::default();
        ledger.record(LedgerEvent::Opened(LedgerOpened {
            ledger_id: Uuid::new_v4(),
            owner: owner.to_string(),
            occurred_at: Utc::now().trunc_subsecs(6),
        }));
        ledger
    }

    pub fn credit(&mut self, amount: i64) {
        self.record(LedgerEvent::Credited(LedgerCredited {
            amount,
            occurred_at: Utc::now().trunc_subsecs(6),
        }));
    }
}

impl Entity for Ledger {
    type Event = LedgerEvent;

    fn type_name() -> &'static str {
        "ledger"
    }

    fn storage_name() -> &'static str {
        "ledgers"
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn meta(&self) -> &AggregateMeta<LedgerEvent> {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut AggregateMeta<LedgerEvent> {
        &mut self.meta
    }

    fn apply(&mut self, event: &LedgerEvent) {
        match event {
            LedgerEvent::Opened(e) => {
                self.id = e.ledger_id;
                self.owner = e.owner.clone();
                self.set_created_at(e.occurred_at);
            }
            LedgerEvent::Credited(e) | LedgerEvent::Unregistered(e) => self.balance += e.amount,
        }
    }
}
