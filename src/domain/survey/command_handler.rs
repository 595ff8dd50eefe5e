use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use super::aggregate::Survey;
use super::commands::{CommandOutcome, SurveyCommand};
use super::errors::SurveyError;
use super::response::SurveyResponse;
use super::value_objects::{Question, QuestionAnswer};
use crate::event_sourcing::{AggregateStore, Clock, Database, StoreError, SystemClock, Transaction};
use crate::metrics::Metrics;
use crate::utils::{retry_on_transient, IsTransient, RetryConfig};

// ============================================================================
// Survey Command Handler
// ============================================================================
//
// Orchestrates: Command → load → mutate → save
//
// A lost optimistic-concurrency race replays the whole cycle against fresh
// state. Business rule violations are returned as-is.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Validation(#[from] SurveyError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IsTransient for CommandError {
    fn is_transient(&self) -> bool {
        match self {
            CommandError::Validation(_) => false,
            CommandError::Store(e) => e.is_transient(),
        }
    }
}

pub struct SurveyCommandHandler<D: Database> {
    store: Arc<AggregateStore<D>>,
    clock: Arc<dyn Clock>,
    retry: RetryConfig,
    metrics: Option<Arc<Metrics>>,
}

impl<D: Database> SurveyCommandHandler<D> {
    pub fn new(store: Arc<AggregateStore<D>>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            retry: RetryConfig::conservative(),
            metrics: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Handle a command, retrying on concurrency conflicts.
    pub async fn handle(&self, command: SurveyCommand) -> Result<CommandOutcome, CommandError> {
        let command = &command;
        let operation = command.name();

        let result = retry_on_transient(self.retry.clone(), move |attempt| {
            if attempt > 1 {
                if let Some(metrics) = &self.metrics {
                    metrics.record_retry_attempt(operation, attempt);
                }
            }
            self.execute(command)
        })
        .await
        .into_result();

        if let Some(metrics) = &self.metrics {
            metrics.record_retry_outcome(operation, result.is_ok());
        }

        match &result {
            Ok(outcome) => info!(
                command = operation,
                aggregate_id = %outcome.aggregate_id,
                version = outcome.version,
                "✅ Command handled"
            ),
            Err(e) => warn!(command = operation, error = %e, "Command rejected"),
        }
        result
    }

    async fn execute(&self, command: &SurveyCommand) -> Result<CommandOutcome, CommandError> {
        let now = self.clock.now();

        match command {
            SurveyCommand::CreateSurvey { tenant_id, title, description } => {
                let mut survey = Survey::new(tenant_id, title, description.clone(), now)?;
                let tx = self.store.begin().await?;
                let version = self.store.save(tx, &mut survey).await?;
                Ok(CommandOutcome { aggregate_id: survey.id, version })
            }
            SurveyCommand::SetMaxParticipants { survey_id, max_participants } => {
                self.update(*survey_id, |s| s.set_max_participants(*max_participants, now))
                    .await
            }
            SurveyCommand::SetEndTime { survey_id, end_time } => {
                self.update(*survey_id, |s| s.set_end_time(*end_time, now)).await
            }
            SurveyCommand::AddQuestion {
                survey_id,
                title,
                description,
                options,
                allow_multiple,
            } => {
                let question = Question::new(title, description.clone(), options, *allow_multiple)?;
                self.update(*survey_id, |s| {
                    s.add_question(question, now);
                    Ok(())
                })
                .await
            }
            SurveyCommand::ReleaseSurvey { survey_id } => {
                self.update(*survey_id, |s| s.release(now)).await
            }
            SurveyCommand::LockSurvey { survey_id } => {
                self.update(*survey_id, |s| {
                    s.lock(now);
                    Ok(())
                })
                .await
            }
            SurveyCommand::SubmitResponse { survey_id, answers } => {
                self.submit_response(*survey_id, answers, now).await
            }
        }
    }

    async fn update<F>(&self, survey_id: Uuid, mutate: F) -> Result<CommandOutcome, CommandError>
    where
        F: FnOnce(&mut Survey) -> Result<(), SurveyError>,
    {
        let mut tx = self.store.begin().await?;
        let mut survey: Survey = self.store.load(&mut tx, survey_id).await?;

        if let Err(e) = mutate(&mut survey) {
            tx.rollback().await?;
            return Err(e.into());
        }

        let version = self.store.save(tx, &mut survey).await?;
        Ok(CommandOutcome { aggregate_id: survey_id, version })
    }

    /// Count the submission against the survey, then persist the response.
    ///
    /// The two aggregates are saved in separate transactions. The survey goes
    /// first so a full or closed survey never leaves a dangling response.
    async fn submit_response(
        &self,
        survey_id: Uuid,
        answers: &[QuestionAnswer],
        now: DateTime<Utc>,
    ) -> Result<CommandOutcome, CommandError> {
        let mut tx = self.store.begin().await?;
        let mut survey: Survey = self.store.load(&mut tx, survey_id).await?;
        let mut response = SurveyResponse::new(survey_id, now);

        if let Err(e) = prepare_submission(&mut survey, &mut response, answers, now) {
            tx.rollback().await?;
            return Err(e.into());
        }

        self.store.save(tx, &mut survey).await?;

        let tx = self.store.begin().await?;
        let version = self.store.save(tx, &mut response).await?;
        Ok(CommandOutcome { aggregate_id: response.id, version })
    }
}

fn prepare_submission(
    survey: &mut Survey,
    response: &mut SurveyResponse,
    answers: &[QuestionAnswer],
    now: DateTime<Utc>,
) -> Result<(), SurveyError> {
    survey.validate_response(answers)?;
    for answer in answers {
        response.answer(answer.clone(), now)?;
    }
    response.submit(now)?;
    survey.submission_received(now, now)
}

// ============================================================================
// Unit Tests
// ============================================================================
