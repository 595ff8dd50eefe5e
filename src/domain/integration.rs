use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;

use super::survey::{ResponseEvent, SurveyEvent};
use crate::event_sourcing::{DomainEvent, EventRegistry};

/// Every event the outbox may hold, whichever aggregate wrote it.
#[derive(Debug, Clone, PartialEq)]
pub enum IntegrationEvent {
    Survey(SurveyEvent),
    Response(ResponseEvent),
}

static INTEGRATION_EVENTS: Lazy<EventRegistry<IntegrationEvent>> = Lazy::new(|| {
    EventRegistry::new()
        .extend_from(SurveyEvent::registry(), IntegrationEvent::Survey)
        .extend_from(ResponseEvent::registry(), IntegrationEvent::Response)
});

impl DomainEvent for IntegrationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            IntegrationEvent::Survey(e) => e.event_type(),
            IntegrationEvent::Response(e) => e.event_type(),
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            IntegrationEvent::Survey(e) => e.occurred_at(),
            IntegrationEvent::Response(e) => e.occurred_at(),
        }
    }

    fn encode(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            IntegrationEvent::Survey(e) => e.encode(),
            IntegrationEvent::Response(e) => e.encode(),
        }
    }

    fn registry() -> &'static EventRegistry<Self> {
        &INTEGRATION_EVENTS
    }
}
