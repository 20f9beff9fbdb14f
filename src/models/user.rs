// src/models/user.rs

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Letters, digits and `@ . + - _`, the usual account-name alphabet.
static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.@+-]+$").expect("username pattern is valid"));

/// Role of an account. Fixed at creation; decides which profile the user owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Student,
    Teacher,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// SELECT list shared by every query that returns a `User`.
pub const USER_SELECT: &str = r#"
    SELECT
        u.id, u.username, u.password, u.email, u.first_name, u.last_name,
        u.role, u.is_active, u.date_joined,
        s.id AS student_id,
        t.id AS teacher_id
    FROM users u
    LEFT JOIN students s ON s.user_id = u.id
    LEFT JOIN teachers t ON t.user_id = u.id
"#;

/// Represents the 'users' table joined with the profile ids.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: i64,

    /// Unique username.
    pub username: String,

    /// Argon2 password hash.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password: String,

    pub email: String,
    pub first_name: String,
    pub last_name: String,

    #[sqlx(try_from = "String")]
    pub role: Role,

    pub is_active: bool,
    pub date_joined: chrono::DateTime<chrono::Utc>,

    /// Set when the user owns a student profile.
    pub student_id: Option<i64>,
    /// Set when the user owns a teacher profile.
    pub teacher_id: Option<i64>,
}

/// DTO for creating a user (and its profile).
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(
        length(min = 3, max = 150, message = "Username length must be between 3 and 150 characters."),
        regex(path = *USERNAME_RE, message = "Username may contain only letters, digits and @/./+/-/_ characters.")
    )]
    pub username: String,
    #[validate(length(
        min = 8,
        max = 128,
        message = "Password length must be between 8 and 128 characters."
    ))]
    pub password: String,
    #[validate(email(message = "Enter a valid email address."))]
    pub email: Option<String>,
    #[validate(length(max = 150))]
    pub first_name: Option<String>,
    #[validate(length(max = 150))]
    pub last_name: Option<String>,
    #[serde(default)]
    pub role: Role,
    pub is_active: Option<bool>,
}

/// DTO for a partial user update. `role` is accepted only to reject changes.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(
        length(min = 3, max = 150, message = "Username length must be between 3 and 150 characters."),
        regex(path = *USERNAME_RE, message = "Username may contain only letters, digits and @/./+/-/_ characters.")
    )]
    pub username: Option<String>,
    #[validate(length(
        min = 8,
        max = 128,
        message = "Password length must be between 8 and 128 characters."
    ))]
    pub password: Option<String>,
    #[validate(email(message = "Enter a valid email address."))]
    pub email: Option<String>,
    #[validate(length(max = 150))]
    pub first_name: Option<String>,
    #[validate(length(max = 150))]
    pub last_name: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

/// DTO for user login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 150))]
    pub username: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UserListParams {
    pub username: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    pub ordering: Option<String>,
}

/// Compact student representation used in group listings and searches.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StudentBrief {
    pub id: i64,
    pub user: i64,
    pub username: String,
    pub email: String,
}

/// Student profile with its group memberships.
#[derive(Debug, Serialize)]
pub struct StudentProfile {
    #[serde(flatten)]
    pub student: StudentBrief,
    pub groups: Vec<i64>,
}

/// Teacher profile with the topics it teaches and the groups it leads.
#[derive(Debug, Serialize)]
pub struct TeacherProfile {
    pub id: i64,
    pub user: i64,
    pub username: String,
    pub email: String,
    pub topics: Vec<i64>,
    pub groups: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ProfileListParams {
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStudentRequest {
    pub groups: Option<Vec<i64>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTeacherRequest {
    pub topics: Option<Vec<i64>>,
    pub groups: Option<Vec<i64>>,
}

/// One row of a student's "my assignments" view.
#[derive(Debug, Serialize, FromRow)]
pub struct StudentAssignment {
    pub group_id: i64,
    pub group_name: String,
    pub teacher_id: i64,
    pub teacher_username: String,
    pub subject_id: i64,
    pub subject_name: String,
    pub topic_id: Option<i64>,
    pub topic_title: Option<String>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}
