use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::SurveyError;
use super::events::*;
use super::value_objects::{Question, QuestionAnswer, QuestionType, SurveyStatus};
use crate::event_sourcing::{AggregateMeta, Entity};

/// Participants a survey must allow before it can be released.
pub const MIN_PARTICIPANTS: u32 = 3;

// ============================================================================
// Survey Aggregate - Domain Logic
// ============================================================================
//
// Mutators check the business rules, then `record` an event. State only ever
// changes inside `apply`, which is also what replay runs.
//
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Survey {
    // Identity
    pub id: Uuid,
    pub tenant_id: String,

    // Current State (derived from events)
    pub title: String,
    pub description: Option<String>,
    pub max_participants: u32,
    pub end_time: Option<DateTime<Utc>>,
    pub questions: Vec<Question>,
    pub status: SurveyStatus,
    pub submissions: Vec<DateTime<Utc>>,

    #[serde(skip)]
    meta: AggregateMeta<SurveyEvent>,
}

impl Survey {
    pub fn new(
        tenant_id: &str,
        title: &str,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, SurveyError> {
        if title.trim().is_empty() {
            return Err(SurveyError::EmptyTitle);
        }
        if tenant_id.trim().is_empty() {
            return Err(SurveyError::MissingTenant);
        }

        let mut survey = Survey::default();
        survey.record(SurveyEvent::Created(SurveyCreated {
            survey_id: Uuid::now_v7(),
            tenant_id: tenant_id.to_string(),
            title: title.to_string(),
            description,
            created_at: now,
        }));
        Ok(survey)
    }

    pub fn set_max_participants(&mut self, max: u32, now: DateTime<Utc>) -> Result<(), SurveyError> {
        if max < MIN_PARTICIPANTS {
            return Err(SurveyError::TooFewParticipants(max));
        }

        self.record(SurveyEvent::MaxParticipantsChanged(MaxParticipantsChanged {
            survey_id: self.id,
            max_participants: max,
            occurred_at: now,
        }));
        Ok(())
    }

    pub fn set_end_time(&mut self, end_time: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), SurveyError> {
        if end_time < now {
            return Err(SurveyError::EndTimeInPast);
        }

        self.record(SurveyEvent::EndTimeChanged(SurveyEndTimeChanged {
            survey_id: self.id,
            end_time,
            occurred_at: now,
        }));
        Ok(())
    }

    pub fn add_question(&mut self, question: Question, now: DateTime<Utc>) {
        self.record(SurveyEvent::QuestionAdded(QuestionAdded {
            survey_id: self.id,
            question,
            occurred_at: now,
        }));
    }

    pub fn release(&mut self, now: DateTime<Utc>) -> Result<(), SurveyError> {
        if self.max_participants == 0 {
            return Err(SurveyError::NoParticipantLimit);
        }
        match self.end_time {
            None => return Err(SurveyError::NoEndTime),
            Some(end) if end < now => return Err(SurveyError::EndTimeInPast),
            Some(_) => {}
        }

        self.record(SurveyEvent::Released(SurveyReleased {
            survey_id: self.id,
            occurred_at: now,
        }));
        Ok(())
    }

    /// Register one participant's submission. The submission that fills the
    /// last slot also completes the survey.
    pub fn submission_received(
        &mut self,
        received_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), SurveyError> {
        match self.status {
            SurveyStatus::Draft => return Err(SurveyError::NotReleased),
            SurveyStatus::Locked => return Err(SurveyError::Locked),
            SurveyStatus::Released | SurveyStatus::Completed => {}
        }
        if self.answers_received() >= self.max_participants {
            return Err(SurveyError::ParticipantLimitReached(self.max_participants));
        }
        if self.end_time.is_some_and(|end| end < received_at) {
            return Err(SurveyError::SurveyClosed);
        }

        self.record(SurveyEvent::SubmissionReceived(SubmissionReceived {
            survey_id: self.id,
            received_at,
            occurred_at: now,
        }));

        if self.answers_received() == self.max_participants {
            self.record(SurveyEvent::Completed(SurveyCompleted {
                survey_id: self.id,
                occurred_at: now,
            }));
        }
        Ok(())
    }

    pub fn lock(&mut self, now: DateTime<Utc>) {
        self.record(SurveyEvent::Locked(SurveyLocked {
            survey_id: self.id,
            occurred_at: now,
        }));
    }

    /// Check answers against the questions without touching state.
    pub fn validate_response(&self, answers: &[QuestionAnswer]) -> Result<(), SurveyError> {
        for answer in answers {
            let question = self
                .question(answer.question_id)
                .ok_or(SurveyError::QuestionNotFound(answer.question_id))?;

            if question.question_type == QuestionType::Single && answer.choices.len() > 1 {
                return Err(SurveyError::MultipleChoicesNotAllowed(question.id));
            }
            if let Some(option) = answer.choices.iter().find(|c| !question.has_option(**c)) {
                return Err(SurveyError::UnknownOption {
                    question: question.id,
                    option: *option,
                });
            }
        }
        Ok(())
    }

    pub fn question(&self, question_id: Uuid) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    pub fn answers_received(&self) -> u32 {
        self.submissions.len() as u32
    }
}

// ============================================================================
// Entity Implementation
// ============================================================================

impl Entity for Survey {
    type Event = SurveyEvent;

    fn type_name() -> &'static str {
        "survey"
    }

    fn storage_name() -> &'static str {
        "surveys"
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn meta(&self) -> &AggregateMeta<SurveyEvent> {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut AggregateMeta<SurveyEvent> {
        &mut self.meta
    }

    fn apply(&mut self, event: &SurveyEvent) {
        match event {
            SurveyEvent::Created(e) => {
                self.id = e.survey_id;
                self.tenant_id = e.tenant_id.clone();
                self.title = e.title.clone();
                self.description = e.description.clone();
                self.status = SurveyStatus::Draft;
                self.set_created_at(e.created_at);
            }
            SurveyEvent::QuestionAdded(e) => self.questions.push(e.question.clone()),
            SurveyEvent::MaxParticipantsChanged(e) => self.max_participants = e.max_participants,
            SurveyEvent::EndTimeChanged(e) => self.end_time = Some(e.end_time),
            SurveyEvent::Released(_) => self.status = SurveyStatus::Released,
            SurveyEvent::SubmissionReceived(e) => self.submissions.push(e.received_at),
            SurveyEvent::Completed(_) => self.status = SurveyStatus::Completed,
            SurveyEvent::Locked(_) => self.status = SurveyStatus::Locked,
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
