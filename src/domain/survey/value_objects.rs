use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::SurveyError;

// ============================================================================
// Survey Value Objects
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurveyStatus {
    #[default]
    Draft,
    Released,
    Locked,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    /// Exactly one option may be chosen
    Single,
    Multi,
}

impl std::str::FromStr for QuestionType {
    type Err = SurveyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(QuestionType::Single),
            "multi" => Ok(QuestionType::Multi),
            other => Err(SurveyError::InvalidQuestionType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: Uuid,
    pub value: String,
}

impl QuestionOption {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub question_type: QuestionType,
    pub options: Vec<QuestionOption>,
}

impl Question {
    pub fn new(
        title: &str,
        description: Option<String>,
        options: &[String],
        allow_multiple: bool,
    ) -> Result<Self, SurveyError> {
        if title.trim().is_empty() {
            return Err(SurveyError::EmptyQuestionTitle);
        }
        if options.len() < 2 {
            return Err(SurveyError::TooFewOptions(options.len()));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description,
            question_type: if allow_multiple {
                QuestionType::Multi
            } else {
                QuestionType::Single
            },
            options: options.iter().map(QuestionOption::new).collect(),
        })
    }

    pub fn has_option(&self, option_id: Uuid) -> bool {
        self.options.iter().any(|o| o.id == option_id)
    }
}

/// Choices one participant gave for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionAnswer {
    pub question_id: Uuid,
    pub choices: Vec<Uuid>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    #[default]
    Draft,
    Submitted,
}

// ============================================================================
// Unit Tests
// ============================================================================
