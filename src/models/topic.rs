// src/models/topic.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'topics' table joined with its subject's name.
/// The title is unique within a subject, not globally.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Topic {
    pub id: i64,
    /// Owning subject id.
    pub subject: i64,
    pub subject_name: String,
    pub title: String,
    pub description: String,
    pub is_active: bool,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTopicRequest {
    pub subject: i64,
    #[validate(length(min = 1, max = 200, message = "Title length must be between 1 and 200 characters."))]
    pub title: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTopicRequest {
    pub subject: Option<i64>,
    #[validate(length(min = 1, max = 200, message = "Title length must be between 1 and 200 characters."))]
    pub title: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct TopicListParams {
    pub title: Option<String>,
    pub subject: Option<i64>,
    pub is_active: Option<bool>,
    pub ordering: Option<String>,
}
