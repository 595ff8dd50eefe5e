use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::value_objects::Question;
use crate::event_sourcing::{encode_payload, DomainEvent, EventRegistry};

// ============================================================================
// Survey Events - Domain Events for the Survey Aggregate
// ============================================================================
//
// Tags are persisted with every row and are part of the wire contract with
// downstream consumers. Never rename one; add a new variant instead.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum SurveyEvent {
    Created(SurveyCreated),
    QuestionAdded(QuestionAdded),
    MaxParticipantsChanged(MaxParticipantsChanged),
    EndTimeChanged(SurveyEndTimeChanged),
    Released(SurveyReleased),
    SubmissionReceived(SubmissionReceived),
    Completed(SurveyCompleted),
    Locked(SurveyLocked),
}

static SURVEY_EVENTS: Lazy<EventRegistry<SurveyEvent>> = Lazy::new(|| {
    EventRegistry::new()
        .register(SurveyCreated::TYPE, SurveyEvent::Created)
        .register(QuestionAdded::TYPE, SurveyEvent::QuestionAdded)
        .register(MaxParticipantsChanged::TYPE, SurveyEvent::MaxParticipantsChanged)
        .register(SurveyEndTimeChanged::TYPE, SurveyEvent::EndTimeChanged)
        .register(SurveyReleased::TYPE, SurveyEvent::Released)
        .register(SubmissionReceived::TYPE, SurveyEvent::SubmissionReceived)
        .register(SurveyCompleted::TYPE, SurveyEvent::Completed)
        .register(SurveyLocked::TYPE, SurveyEvent::Locked)
});

impl DomainEvent for SurveyEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SurveyEvent::Created(_) => SurveyCreated::TYPE,
            SurveyEvent::QuestionAdded(_) => QuestionAdded::TYPE,
            SurveyEvent::MaxParticipantsChanged(_) => MaxParticipantsChanged::TYPE,
            SurveyEvent::EndTimeChanged(_) => SurveyEndTimeChanged::TYPE,
            SurveyEvent::Released(_) => SurveyReleased::TYPE,
            SurveyEvent::SubmissionReceived(_) => SubmissionReceived::TYPE,
            SurveyEvent::Completed(_) => SurveyCompleted::TYPE,
            SurveyEvent::Locked(_) => SurveyLocked::TYPE,
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SurveyEvent::Created(e) => e.created_at,
            SurveyEvent::QuestionAdded(e) => e.occurred_at,
            SurveyEvent::MaxParticipantsChanged(e) => e.occurred_at,
            SurveyEvent::EndTimeChanged(e) => e.occurred_at,
            SurveyEvent::Released(e) => e.occurred_at,
            SurveyEvent::SubmissionReceived(e) => e.occurred_at,
            SurveyEvent::Completed(e) => e.occurred_at,
            SurveyEvent::Locked(e) => e.occurred_at,
        }
    }

    fn encode(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            SurveyEvent::Created(e) => encode_payload(e),
            SurveyEvent::QuestionAdded(e) => encode_payload(e),
            SurveyEvent::MaxParticipantsChanged(e) => encode_payload(e),
            SurveyEvent::EndTimeChanged(e) => encode_payload(e),
            SurveyEvent::Released(e) => encode_payload(e),
            SurveyEvent::SubmissionReceived(e) => encode_payload(e),
            SurveyEvent::Completed(e) => encode_payload(e),
            SurveyEvent::Locked(e) => encode_payload(e),
        }
    }

    fn registry() -> &'static EventRegistry<Self> {
        &SURVEY_EVENTS
    }
}

// ============================================================================
// Individual Event Types
// ============================================================================

/// Survey Created - first event of every survey, always in draft
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SurveyCreated {
    pub survey_id: Uuid,
    pub tenant_id: String,
    pub title: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SurveyCreated {
    pub const TYPE: &'static str = "survey-created";
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct QuestionAdded {
    pub survey_id: Uuid,
    pub question: Question,
    pub occurred_at: DateTime<Utc>,
}

impl QuestionAdded {
    pub const TYPE: &'static str = "question-added";
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MaxParticipantsChanged {
    pub survey_id: Uuid,
    pub max_participants: u32,
    pub occurred_at: DateTime<Utc>,
}

impl MaxParticipantsChanged {
    pub const TYPE: &'static str = "max-participants-changed";
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SurveyEndTimeChanged {
    pub survey_id: Uuid,
    pub end_time: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

impl SurveyEndTimeChanged {
    pub const TYPE: &'static str = "survey-endtime-changed";
}

/// Survey Released - open for submissions
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SurveyReleased {
    pub survey_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

impl SurveyReleased {
    pub const TYPE: &'static str = "survey-released";
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SubmissionReceived {
    pub survey_id: Uuid,
    pub received_at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

impl SubmissionReceived {
    pub const TYPE: &'static str = "submission-received";
}

/// Survey Completed - participant limit reached
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SurveyCompleted {
    pub survey_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

impl SurveyCompleted {
    pub const TYPE: &'static str = "survey-completed";
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SurveyLocked {
    pub survey_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

impl SurveyLocked {
    pub const TYPE: &'static str = "survey-locked";
}
