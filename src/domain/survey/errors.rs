use uuid::Uuid;

// ============================================================================
// Survey Business Rule Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SurveyError {
    #[error("Survey title cannot be empty")]
    EmptyTitle,

    #[error("Survey must belong to a tenant")]
    MissingTenant,

    #[error("Minimum number of participants is 3, got {0}")]
    TooFewParticipants(u32),

    #[error("End time cannot be in the past")]
    EndTimeInPast,

    #[error("Question title cannot be empty")]
    EmptyQuestionTitle,

    #[error("Question needs at least two options, got {0}")]
    TooFewOptions(usize),

    #[error("Invalid question type: {0}")]
    InvalidQuestionType(String),

    #[error("Cannot release a survey without a participant limit")]
    NoParticipantLimit,

    #[error("Cannot release a survey without an end time")]
    NoEndTime,

    #[error("Cannot add a submission to a draft survey")]
    NotReleased,

    #[error("Cannot add a submission to a locked survey")]
    Locked,

    #[error("Number of participants ({0}) exceeded")]
    ParticipantLimitReached(u32),

    #[error("End time for survey has passed")]
    SurveyClosed,

    #[error("Question not found: {0}")]
    QuestionNotFound(Uuid),

    #[error("Option {option} does not belong to question {question}")]
    UnknownOption { question: Uuid, option: Uuid },

    #[error("Question {0} allows a single choice only")]
    MultipleChoicesNotAllowed(Uuid),

    #[error("Question {0} was already answered")]
    AlreadyAnswered(Uuid),

    #[error("Response was already submitted")]
    AlreadySubmitted,
}
