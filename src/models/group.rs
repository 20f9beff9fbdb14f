// src/models/group.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::{models::user::StudentBrief, utils::query::double_option};

/// Represents the 'study_groups' table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub description: String,
    /// Lead teacher (teacher profile id), if any.
    pub teacher: Option<i64>,
    /// The requesting teacher's assignment on this group.
    #[sqlx(skip)]
    pub teacher_assignment: Option<Assignment>,
    pub is_active: bool,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Group with its member list, returned by the detail endpoint.
#[derive(Debug, Serialize)]
pub struct GroupDetail {
    #[serde(flatten)]
    pub group: Group,
    pub students: Vec<StudentBrief>,
}

/// Represents the 'group_teaching_assignments' table with display names joined in.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Assignment {
    pub id: i64,
    pub group: i64,
    pub group_name: String,
    pub teacher: i64,
    pub teacher_username: String,
    pub subject: i64,
    pub subject_name: String,
    pub topic: Option<i64>,
    pub topic_title: Option<String>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Shape returned when a teacher has no assignment on a group.
#[derive(Debug, Serialize)]
pub struct EmptyAssignment {
    pub group: i64,
    pub group_name: String,
    pub teacher: i64,
    pub teacher_username: String,
    pub subject: Option<i64>,
    pub subject_name: Option<String>,
    pub topic: Option<i64>,
    pub topic_title: Option<String>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateGroupRequest {
    #[validate(length(min = 1, max = 100, message = "Name length must be between 1 and 100 characters."))]
    pub name: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    pub teacher: Option<i64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateGroupRequest {
    #[validate(length(min = 1, max = 100, message = "Name length must be between 1 and 100 characters."))]
    pub name: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub teacher: Option<Option<i64>>,
    pub is_active: Option<bool>,
}

/// Body of PUT/PATCH `teacher-assignment`. Absent and `null` mean different things.
#[derive(Debug, Default, Deserialize)]
pub struct AssignmentWriteRequest {
    #[serde(default, deserialize_with = "double_option")]
    pub subject: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub topic: Option<Option<i64>>,
}

#[derive(Debug, Deserialize)]
pub struct GroupListParams {
    pub name: Option<String>,
    /// Alias of `name`.
    pub title: Option<String>,
    pub teacher: Option<i64>,
    pub is_active: Option<bool>,
    /// Groups where the caller teaches this subject.
    pub teacher_subject: Option<i64>,
    /// Groups where the caller teaches this topic.
    pub teacher_topic: Option<i64>,
    pub ordering: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StudentSearchParams {
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FindStudentParams {
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MembershipRequest {
    pub user_id: Option<i64>,
}

/// A student annotated with whether it already belongs to the group.
#[derive(Debug, Serialize)]
pub struct StudentInGroup {
    #[serde(flatten)]
    pub student: StudentBrief,
    pub in_group: bool,
}
