// src/models/attempt.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::{models::question::PublicQuestion, utils::query::double_option};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Completed,
    Abandoned,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Completed => "completed",
            AttemptStatus::Abandoned => "abandoned",
        }
    }
}

impl TryFrom<String> for AttemptStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "in_progress" => Ok(AttemptStatus::InProgress),
            "completed" => Ok(AttemptStatus::Completed),
            "abandoned" => Ok(AttemptStatus::Abandoned),
            other => Err(format!("unknown attempt status '{}'", other)),
        }
    }
}

/// Represents the 'attempts' table with aggregated grading counters.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Attempt {
    pub id: i64,
    /// User id of the student taking the attempt.
    pub student: i64,
    pub topic: i64,
    pub topic_title: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    /// Answers are refused after this instant.
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    #[sqlx(try_from = "String")]
    pub status: AttemptStatus,
    pub question_count: i64,
    pub correct_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateAttemptRequest {
    pub topic: i64,
    /// Student user id; only teachers may start an attempt for someone else.
    pub student: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAttemptRequest {
    pub status: AttemptStatus,
}

#[derive(Debug, Deserialize)]
pub struct AttemptListParams {
    pub student: Option<i64>,
    pub topic: Option<i64>,
    pub status: Option<AttemptStatus>,
    pub ordering: Option<String>,
}

/// Represents the 'attempt_questions' table.
#[derive(Debug, Clone, FromRow)]
pub struct AttemptQuestionRow {
    pub id: i64,
    pub attempt_id: i64,
    pub question_id: i64,
    #[sqlx(rename = "position")]
    pub order: i64,
}

/// An attempt slot with its question (correctness hidden) and the answer so far.
#[derive(Debug, Serialize)]
pub struct AttemptQuestionView {
    pub id: i64,
    pub attempt: i64,
    pub order: i64,
    pub question: PublicQuestion,
    pub answer: Option<Answer>,
}

#[derive(Debug, Deserialize)]
pub struct AttemptQuestionListParams {
    pub attempt: Option<i64>,
}

/// Represents the 'answers' table; selected choice ids are attached after loading.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Answer {
    pub id: i64,
    pub attempt_question: i64,
    #[sqlx(skip)]
    pub selected_choices: Vec<i64>,
    pub answered_at: Option<chrono::DateTime<chrono::Utc>>,
    /// `None` until graded.
    pub is_correct: Option<bool>,
    pub teacher_comment: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitAnswerRequest {
    #[serde(default)]
    pub selected_choices: Vec<i64>,
}

/// Teacher review of an answer.
#[derive(Debug, Deserialize, Validate)]
pub struct ReviewAnswerRequest {
    #[validate(length(max = 5000))]
    pub teacher_comment: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub is_correct: Option<Option<bool>>,
}

#[derive(Debug, Deserialize)]
pub struct AnswerListParams {
    pub attempt: Option<i64>,
    pub attempt_question: Option<i64>,
    pub is_correct: Option<bool>,
}
