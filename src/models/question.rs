// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

/// How many choices a student may (and must) pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    /// Exactly one choice is correct.
    SingleChoice,
    /// One or more choices are correct.
    #[default]
    MultipleChoice,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::SingleChoice => "single_choice",
            QuestionType::MultipleChoice => "multiple_choice",
        }
    }
}

impl TryFrom<String> for QuestionType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "single_choice" => Ok(QuestionType::SingleChoice),
            "multiple_choice" => Ok(QuestionType::MultipleChoice),
            other => Err(format!("unknown question type '{}'", other)),
        }
    }
}

/// Represents the 'questions' table, with its choices attached after loading.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Question {
    pub id: i64,
    /// Owning topic id.
    pub topic: i64,
    pub text: String,
    #[sqlx(try_from = "String")]
    pub question_type: QuestionType,
    pub is_active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[sqlx(skip)]
    pub choices: Vec<Choice>,
}

/// Represents the 'choices' table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Choice {
    pub id: i64,
    #[serde(skip)]
    pub question_id: i64,
    pub text: String,
    pub is_correct: bool,
    #[sqlx(rename = "position")]
    pub order: i64,
}

/// Choice as shown to a student taking an attempt (correctness hidden).
#[derive(Debug, Clone, Serialize)]
pub struct PublicChoice {
    pub id: i64,
    pub text: String,
    pub order: i64,
}

impl From<&Choice> for PublicChoice {
    fn from(choice: &Choice) -> Self {
        PublicChoice {
            id: choice.id,
            text: choice.text.clone(),
            order: choice.order,
        }
    }
}

/// Question as shown inside an attempt.
#[derive(Debug, Clone, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub topic: i64,
    pub text: String,
    pub question_type: QuestionType,
    pub is_active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub choices: Vec<PublicChoice>,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        PublicQuestion {
            id: q.id,
            topic: q.topic,
            text: q.text.clone(),
            question_type: q.question_type,
            is_active: q.is_active,
            created_at: q.created_at,
            choices: q.choices.iter().map(PublicChoice::from).collect(),
        }
    }
}

/// One choice in a create/update payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceInput {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub is_correct: bool,
    pub order: Option<i64>,
}

/// DTO for creating a new question together with its choices.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    pub topic: i64,
    #[validate(length(min = 1, max = 10000, message = "Question text must not be empty."))]
    pub text: String,
    #[serde(default)]
    pub question_type: QuestionType,
    pub is_active: Option<bool>,
    /// Required on create; kept optional so a missing list gets a field error.
    pub choices: Option<Vec<ChoiceInput>>,
}

/// DTO for updating a question. `choices`, when present, replaces the whole set.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuestionRequest {
    pub topic: Option<i64>,
    #[validate(length(min = 1, max = 10000, message = "Question text must not be empty."))]
    pub text: Option<String>,
    pub question_type: Option<QuestionType>,
    pub is_active: Option<bool>,
    pub choices: Option<Vec<ChoiceInput>>,
}

#[derive(Debug, Deserialize)]
pub struct QuestionListParams {
    pub topic: Option<i64>,
    pub text: Option<String>,
    pub question_type: Option<QuestionType>,
    pub is_active: Option<bool>,
    pub ordering: Option<String>,
}
