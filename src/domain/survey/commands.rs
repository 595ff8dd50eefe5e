use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::value_objects::QuestionAnswer;

// ============================================================================
// Survey Commands - Represent user intent
// ============================================================================

#[derive(Debug, Clone)]
pub enum SurveyCommand {
    CreateSurvey {
        tenant_id: String,
        title: String,
        description: Option<String>,
    },
    SetMaxParticipants {
        survey_id: Uuid,
        max_participants: u32,
    },
    SetEndTime {
        survey_id: Uuid,
        end_time: DateTime<Utc>,
    },
    AddQuestion {
        survey_id: Uuid,
        title: String,
        description: Option<String>,
        options: Vec<String>,
        allow_multiple: bool,
    },
    ReleaseSurvey {
        survey_id: Uuid,
    },
    LockSurvey {
        survey_id: Uuid,
    },
    SubmitResponse {
        survey_id: Uuid,
        answers: Vec<QuestionAnswer>,
    },
}

impl SurveyCommand {
    /// Stable label for logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            SurveyCommand::CreateSurvey { .. } => "create_survey",
            SurveyCommand::SetMaxParticipants { .. } => "set_max_participants",
            SurveyCommand::SetEndTime { .. } => "set_end_time",
            SurveyCommand::AddQuestion { .. } => "add_question",
            SurveyCommand::ReleaseSurvey { .. } => "release_survey",
            SurveyCommand::LockSurvey { .. } => "lock_survey",
            SurveyCommand::SubmitResponse { .. } => "submit_response",
        }
    }
}

/// What a successful command left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandOutcome {
    /// The survey, or the response for `SubmitResponse`
    pub aggregate_id: Uuid,
    pub version: i64,
}
