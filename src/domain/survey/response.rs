use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::SurveyError;
use super::value_objects::{QuestionAnswer, ResponseStatus};
use crate::event_sourcing::{encode_payload, AggregateMeta, DomainEvent, Entity, EventRegistry};

// ============================================================================
// Response Events
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEvent {
    Created(SurveyResponseCreated),
    QuestionAnswered(QuestionAnswered),
    Submitted(ResponseSubmitted),
}

static RESPONSE_EVENTS: Lazy<EventRegistry<ResponseEvent>> = Lazy::new(|| {
    EventRegistry::new()
        .register(SurveyResponseCreated::TYPE, ResponseEvent::Created)
        .register(QuestionAnswered::TYPE, ResponseEvent::QuestionAnswered)
        .register(ResponseSubmitted::TYPE, ResponseEvent::Submitted)
});

impl DomainEvent for ResponseEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ResponseEvent::Created(_) => SurveyResponseCreated::TYPE,
            ResponseEvent::QuestionAnswered(_) => QuestionAnswered::TYPE,
            ResponseEvent::Submitted(_) => ResponseSubmitted::TYPE,
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ResponseEvent::Created(e) => e.created_at,
            ResponseEvent::QuestionAnswered(e) => e.occurred_at,
            ResponseEvent::Submitted(e) => e.occurred_at,
        }
    }

    fn encode(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            ResponseEvent::Created(e) => encode_payload(e),
            ResponseEvent::QuestionAnswered(e) => encode_payload(e),
            ResponseEvent::Submitted(e) => encode_payload(e),
        }
    }

    fn registry() -> &'static EventRegistry<Self> {
        &RESPONSE_EVENTS
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SurveyResponseCreated {
    pub response_id: Uuid,
    pub survey_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl SurveyResponseCreated {
    pub const TYPE: &'static str = "survey-response-created";
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct QuestionAnswered {
    pub response_id: Uuid,
    pub answer: QuestionAnswer,
    pub occurred_at: DateTime<Utc>,
}

impl QuestionAnswered {
    pub const TYPE: &'static str = "question-answered";
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ResponseSubmitted {
    pub response_id: Uuid,
    pub survey_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

impl ResponseSubmitted {
    pub const TYPE: &'static str = "response-submitted";
}

// ============================================================================
// Survey Response Aggregate
// ============================================================================

/// One participant's answers to a survey.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SurveyResponse {
    pub id: Uuid,
    pub survey_id: Uuid,
    pub answers: Vec<QuestionAnswer>,
    pub status: ResponseStatus,

    #[serde(skip)]
    meta: AggregateMeta<ResponseEvent>,
}

impl SurveyResponse {
    pub fn new(survey_id: Uuid, now: DateTime<Utc>) -> Self {
        let mut response = SurveyResponse::default();
        response.record(ResponseEvent::Created(SurveyResponseCreated {
            response_id: Uuid::now_v7(),
            survey_id,
            created_at: now,
        }));
        response
    }

    pub fn answer(&mut self, answer: QuestionAnswer, now: DateTime<Utc>) -> Result<(), SurveyError> {
        if self.status == ResponseStatus::Submitted {
            return Err(SurveyError::AlreadySubmitted);
        }
        if self.answers.iter().any(|a| a.question_id == answer.question_id) {
            return Err(SurveyError::AlreadyAnswered(answer.question_id));
        }

        self.record(ResponseEvent::QuestionAnswered(QuestionAnswered {
            response_id: self.id,
            answer,
            occurred_at: now,
        }));
        Ok(())
    }

    pub fn submit(&mut self, now: DateTime<Utc>) -> Result<(), SurveyError> {
        if self.status == ResponseStatus::Submitted {
            return Err(SurveyError::AlreadySubmitted);
        }

        self.record(ResponseEvent::Submitted(ResponseSubmitted {
            response_id: self.id,
            survey_id: self.survey_id,
            occurred_at: now,
        }));
        Ok(())
    }
}

impl Entity for SurveyResponse {
    type Event = ResponseEvent;

    fn type_name() -> &'static str {
        "survey_response"
    }

    fn storage_name() -> &'static str {
        "survey_responses"
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn meta(&self) -> &AggregateMeta<ResponseEvent> {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut AggregateMeta<ResponseEvent> {
        &mut self.meta
    }

    fn apply(&mut self, event: &ResponseEvent) {
        match event {
            ResponseEvent::Created(e) => {
                self.id = e.response_id;
                self.survey_id = e.survey_id;
                self.status = ResponseStatus::Draft;
                self.set_created_at(e.created_at);
            }
            ResponseEvent::QuestionAnswered(e) => self.answers.push(e.answer.clone()),
            ResponseEvent::Submitted(_) => self.status = ResponseStatus::Submitted,
        }
    }
}
