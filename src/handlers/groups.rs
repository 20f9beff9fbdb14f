// src/handlers/groups.rs

use std::collections::HashSet;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteExecutor, SqlitePool};
use validator::Validate;

use crate::{
    assignment::{self, Target, TopicRef},
    error::{AppError, is_unique_violation},
    handlers::{
        students::{STUDENT_SELECT, student_by_user},
        teachers::teacher_id_for_user,
    },
    models::{
        group::{
            Assignment, AssignmentWriteRequest, CreateGroupRequest, EmptyAssignment,
            FindStudentParams, Group, GroupDetail, GroupListParams, MembershipRequest,
            StudentInGroup, StudentSearchParams, UpdateGroupRequest,
        },
        user::StudentBrief,
    },
    utils::{
        extract::CurrentUser,
        html::clean_text,
        query::{contains_pattern, order_by},
    },
};

pub(crate) const ASSIGNMENT_SELECT: &str = r#"
    SELECT
        a.id,
        a.group_id AS "group",
        g.name AS group_name,
        a.teacher_id AS teacher,
        tu.username AS teacher_username,
        a.subject_id AS subject,
        sub.name AS subject_name,
        a.topic_id AS topic,
        tp.title AS topic_title,
        a.updated_at
    FROM group_teaching_assignments a
    JOIN study_groups g ON g.id = a.group_id
    JOIN teachers t ON t.id = a.teacher_id
    JOIN users tu ON tu.id = t.user_id
    JOIN subjects sub ON sub.id = a.subject_id
    LEFT JOIN topics tp ON tp.id = a.topic_id
"#;

const GROUP_SELECT: &str = r#"
    SELECT g.id, g.name, g.description, g.teacher_id AS teacher, g.is_active, g.updated_at
    FROM study_groups g
"#;

const ORDERING: &[(&str, &str)] = &[
    ("name", "g.name"),
    ("updated_at", "g.updated_at"),
    ("id", "g.id"),
];

/// Bumps a group's `updated_at` after a membership or assignment change.
pub(crate) async fn touch_group<'e, E>(executor: E, id: i64) -> Result<(), AppError>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query("UPDATE study_groups SET updated_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}

async fn fetch_group(pool: &SqlitePool, id: i64) -> Result<Group, AppError> {
    sqlx::query_as::<_, Group>(&format!("{} WHERE g.id = ?", GROUP_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Group not found".to_string()))
}

async fn find_assignment(
    pool: &SqlitePool,
    group_id: i64,
    teacher_id: i64,
) -> Result<Option<Assignment>, AppError> {
    Ok(sqlx::query_as::<_, Assignment>(&format!(
        "{} WHERE a.group_id = ? AND a.teacher_id = ?",
        ASSIGNMENT_SELECT
    ))
    .bind(group_id)
    .bind(teacher_id)
    .fetch_optional(pool)
    .await?)
}

/// Fills `teacher_assignment` with the caller's assignment on each group.
async fn attach_assignments(
    pool: &SqlitePool,
    teacher_id: Option<i64>,
    groups: &mut [Group],
) -> Result<(), AppError> {
    let Some(teacher_id) = teacher_id else {
        return Ok(());
    };

    let assignments = sqlx::query_as::<_, Assignment>(&format!(
        "{} WHERE a.teacher_id = ?",
        ASSIGNMENT_SELECT
    ))
    .bind(teacher_id)
    .fetch_all(pool)
    .await?;

    for group in groups.iter_mut() {
        group.teacher_assignment = assignments.iter().find(|a| a.group == group.id).cloned();
    }
    Ok(())
}

async fn ensure_teacher(pool: &SqlitePool, teacher_id: i64) -> Result<(), AppError> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM teachers WHERE id = ?")
        .bind(teacher_id)
        .fetch_optional(pool)
        .await?;
    found.map(|_| ()).ok_or_else(|| {
        AppError::field(
            "teacher",
            format!("Invalid pk \"{}\" - object does not exist.", teacher_id),
        )
    })
}

fn duplicate_name(e: sqlx::Error) -> AppError {
    if is_unique_violation(&e) {
        AppError::field("name", "Group with this name already exists.")
    } else {
        tracing::error!("Failed to save group: {:?}", e);
        AppError::from(e)
    }
}

/// Lists groups. `teacher_subject` / `teacher_topic` narrow the list to groups
/// where the caller holds a matching assignment, and match nothing for non-teachers.
pub async fn list_groups(
    State(pool): State<SqlitePool>,
    current: CurrentUser,
    Query(params): Query<GroupListParams>,
) -> Result<impl IntoResponse, AppError> {
    let teacher_id = teacher_id_for_user(&pool, current.id).await?;

    let mut query = QueryBuilder::<Sqlite>::new(GROUP_SELECT);
    query.push(" WHERE 1 = 1");

    for name in [params.name.as_deref(), params.title.as_deref()]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
    {
        query
            .push(" AND g.name LIKE ")
            .push_bind(contains_pattern(name))
            .push(" ESCAPE '\\'");
    }
    if let Some(teacher) = params.teacher {
        query.push(" AND g.teacher_id = ").push_bind(teacher);
    }
    if let Some(is_active) = params.is_active {
        query.push(" AND g.is_active = ").push_bind(is_active);
    }

    if params.teacher_subject.is_some() || params.teacher_topic.is_some() {
        let Some(teacher_id) = teacher_id else {
            return Ok(Json(Vec::<Group>::new()));
        };
        if let Some(subject) = params.teacher_subject {
            query
                .push(" AND EXISTS (SELECT 1 FROM group_teaching_assignments a WHERE a.group_id = g.id AND a.teacher_id = ")
                .push_bind(teacher_id)
                .push(" AND a.subject_id = ")
                .push_bind(subject)
                .push(")");
        }
        if let Some(topic) = params.teacher_topic {
            query
                .push(" AND EXISTS (SELECT 1 FROM group_teaching_assignments a WHERE a.group_id = g.id AND a.teacher_id = ")
                .push_bind(teacher_id)
                .push(" AND a.topic_id = ")
                .push_bind(topic)
                .push(")");
        }
    }

    query
        .push(" ORDER BY ")
        .push(order_by(params.ordering.as_deref(), ORDERING, "name"));

    let mut groups: Vec<Group> = query.build_query_as().fetch_all(&pool).await?;
    attach_assignments(&pool, teacher_id, &mut groups).await?;

    Ok(Json(groups))
}

/// Returns a group with its members and the caller's assignment.
pub async fn get_group(
    State(pool): State<SqlitePool>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut group = fetch_group(&pool, id).await?;
    let teacher_id = teacher_id_for_user(&pool, current.id).await?;
    attach_assignments(&pool, teacher_id, std::slice::from_mut(&mut group)).await?;

    let students = sqlx::query_as::<_, StudentBrief>(&format!(
        "{} JOIN group_students gs ON gs.student_id = s.id WHERE gs.group_id = ? ORDER BY u.username",
        STUDENT_SELECT
    ))
    .bind(id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(GroupDetail { group, students }))
}

pub async fn create_group(
    State(pool): State<SqlitePool>,
    current: CurrentUser,
    Json(payload): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, AppError> {
    current.require_teacher()?;
    payload.validate()?;
    if let Some(teacher) = payload.teacher {
        ensure_teacher(&pool, teacher).await?;
    }

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO study_groups (name, description, teacher_id, is_active, updated_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(payload.name.trim())
    .bind(clean_text(payload.description.as_deref().unwrap_or("")))
    .bind(payload.teacher)
    .bind(payload.is_active.unwrap_or(true))
    .bind(Utc::now())
    .fetch_one(&pool)
    .await
    .map_err(duplicate_name)?;

    tracing::info!("Created group {} ({})", id, payload.name);
    Ok((StatusCode::CREATED, Json(fetch_group(&pool, id).await?)))
}

pub async fn update_group(
    State(pool): State<SqlitePool>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateGroupRequest>,
) -> Result<impl IntoResponse, AppError> {
    current.require_teacher()?;
    payload.validate()?;
    let existing = fetch_group(&pool, id).await?;

    let teacher = match payload.teacher {
        Some(Some(teacher)) => {
            ensure_teacher(&pool, teacher).await?;
            Some(teacher)
        }
        Some(None) => None,
        None => existing.teacher,
    };

    sqlx::query(
        r#"
        UPDATE study_groups SET
            name = COALESCE(?, name),
            description = COALESCE(?, description),
            teacher_id = ?,
            is_active = COALESCE(?, is_active),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(payload.name.as_deref().map(str::trim))
    .bind(payload.description.as_deref().map(clean_text))
    .bind(teacher)
    .bind(payload.is_active)
    .bind(Utc::now())
    .bind(id)
    .execute(&pool)
    .await
    .map_err(duplicate_name)?;

    let mut group = fetch_group(&pool, id).await?;
    let teacher_id = teacher_id_for_user(&pool, current.id).await?;
    attach_assignments(&pool, teacher_id, std::slice::from_mut(&mut group)).await?;
    Ok(Json(group))
}

/// Deletes a group; memberships and assignments go with it.
pub async fn delete_group(
    State(pool): State<SqlitePool>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    current.require_teacher()?;

    let result = sqlx::query("DELETE FROM study_groups WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Group not found".to_string()));
    }

    tracing::info!("Deleted group {}", id);
    Ok(StatusCode::NO_CONTENT)
}

/// The caller as a teacher: profile id and username. 403 otherwise.
async fn require_teacher_profile(
    pool: &SqlitePool,
    current: &CurrentUser,
) -> Result<(i64, String), AppError> {
    let row: Option<(i64, String)> = sqlx::query_as(
        "SELECT t.id, u.username FROM teachers t JOIN users u ON u.id = t.user_id WHERE t.user_id = ?",
    )
    .bind(current.id)
    .fetch_optional(pool)
    .await?;

    row.ok_or_else(|| AppError::Forbidden("Only teachers can manage assignments.".to_string()))
}

fn empty_assignment(group: &Group, teacher_id: i64, teacher_username: String) -> EmptyAssignment {
    EmptyAssignment {
        group: group.id,
        group_name: group.name.clone(),
        teacher: teacher_id,
        teacher_username,
        subject: None,
        subject_name: None,
        topic: None,
        topic_title: None,
        updated_at: None,
    }
}

/// GET `teacher-assignment`: the caller's assignment on the group, or the empty shape.
pub async fn get_teacher_assignment(
    State(pool): State<SqlitePool>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let (teacher_id, teacher_username) = require_teacher_profile(&pool, &current).await?;
    let group = fetch_group(&pool, id).await?;

    match find_assignment(&pool, group.id, teacher_id).await? {
        Some(assignment) => Ok(Json(assignment).into_response()),
        None => Ok(Json(empty_assignment(&group, teacher_id, teacher_username)).into_response()),
    }
}

/// DELETE `teacher-assignment`: removes the caller's assignment if there is one.
pub async fn delete_teacher_assignment(
    State(pool): State<SqlitePool>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let (teacher_id, _) = require_teacher_profile(&pool, &current).await?;
    let group = fetch_group(&pool, id).await?;

    let mut tx = pool.begin().await?;
    let result = sqlx::query(
        "DELETE FROM group_teaching_assignments WHERE group_id = ? AND teacher_id = ?",
    )
    .bind(group.id)
    .bind(teacher_id)
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() > 0 {
        touch_group(&mut *tx, group.id).await?;
        tracing::info!("Teacher {} cleared assignment on group {}", teacher_id, group.id);
    }
    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn active_subject(pool: &SqlitePool, id: i64) -> Result<i64, AppError> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM subjects WHERE id = ? AND is_active = 1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    found.ok_or_else(|| {
        AppError::field("subject", format!("Invalid pk \"{}\" - object does not exist.", id))
    })
}

async fn topic_ref(pool: &SqlitePool, id: i64, active_only: bool) -> Result<Option<TopicRef>, AppError> {
    let row: Option<(i64, i64)> = sqlx::query_as(
        "SELECT id, subject_id FROM topics WHERE id = ? AND (? = 0 OR is_active = 1)",
    )
    .bind(id)
    .bind(active_only)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|(id, subject_id)| TopicRef { id, subject_id }))
}

/// PUT/PATCH `teacher-assignment`: creates, updates or clears the caller's assignment.
///
/// Returns 201 when a new assignment was created, 200 otherwise.
pub async fn write_teacher_assignment(
    State(pool): State<SqlitePool>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<AssignmentWriteRequest>,
) -> Result<Response, AppError> {
    let (teacher_id, teacher_username) = require_teacher_profile(&pool, &current).await?;
    let group = fetch_group(&pool, id).await?;
    let existing = find_assignment(&pool, group.id, teacher_id).await?;

    let current_target = match &existing {
        Some(a) => Target {
            subject: Some(a.subject),
            topic: match a.topic {
                Some(topic_id) => topic_ref(&pool, topic_id, false).await?,
                None => None,
            },
        },
        None => Target::default(),
    };

    let subject = match payload.subject {
        Some(Some(subject_id)) => Some(Some(active_subject(&pool, subject_id).await?)),
        Some(None) => Some(None),
        None => None,
    };
    let topic = match payload.topic {
        Some(Some(topic_id)) => {
            let found = topic_ref(&pool, topic_id, true).await?.ok_or_else(|| {
                AppError::field("topic", format!("Invalid pk \"{}\" - object does not exist.", topic_id))
            })?;
            Some(Some(found))
        }
        Some(None) => Some(None),
        None => None,
    };

    let target = assignment::resolve(current_target, subject, topic)?;

    let mut tx = pool.begin().await?;

    let Some(subject_id) = target.subject else {
        // Nothing left to assign: drop the row.
        if existing.is_some() {
            sqlx::query("DELETE FROM group_teaching_assignments WHERE group_id = ? AND teacher_id = ?")
                .bind(group.id)
                .bind(teacher_id)
                .execute(&mut *tx)
                .await?;
            touch_group(&mut *tx, group.id).await?;
        }
        tx.commit().await?;
        return Ok(Json(empty_assignment(&group, teacher_id, teacher_username)).into_response());
    };

    sqlx::query(
        r#"
        INSERT INTO group_teaching_assignments (group_id, teacher_id, subject_id, topic_id, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT (group_id, teacher_id) DO UPDATE SET
            subject_id = excluded.subject_id,
            topic_id = excluded.topic_id,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(group.id)
    .bind(teacher_id)
    .bind(subject_id)
    .bind(target.topic.map(|t| t.id))
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;
    touch_group(&mut *tx, group.id).await?;
    tx.commit().await?;

    tracing::info!(
        "Teacher {} assigned subject {} / topic {:?} on group {}",
        teacher_id,
        subject_id,
        target.topic.map(|t| t.id),
        group.id
    );

    let saved = find_assignment(&pool, group.id, teacher_id)
        .await?
        .ok_or_else(|| AppError::InternalServerError("assignment vanished after save".to_string()))?;

    let status = if existing.is_none() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(saved)).into_response())
}

async fn member_ids(pool: &SqlitePool, group_id: i64) -> Result<HashSet<i64>, AppError> {
    let ids: Vec<i64> = sqlx::query_scalar("SELECT student_id FROM group_students WHERE group_id = ?")
        .bind(group_id)
        .fetch_all(pool)
        .await?;
    Ok(ids.into_iter().collect())
}

/// Searches students by username; an all-digit query also matches the user id.
/// Returns at most 20 students, each flagged with its membership.
pub async fn search_students(
    State(pool): State<SqlitePool>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Query(params): Query<StudentSearchParams>,
) -> Result<impl IntoResponse, AppError> {
    current.require_teacher()?;

    let q = params.q.as_deref().unwrap_or("").trim().to_string();
    if q.is_empty() {
        return Ok(Json(Vec::<StudentInGroup>::new()));
    }

    let group = fetch_group(&pool, id).await?;

    let mut query = QueryBuilder::<Sqlite>::new(STUDENT_SELECT);
    query
        .push(" WHERE (u.username LIKE ")
        .push_bind(contains_pattern(&q))
        .push(" ESCAPE '\\'");
    if q.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(user_id) = q.parse::<i64>() {
            query.push(" OR s.user_id = ").push_bind(user_id);
        }
    }
    query.push(") ORDER BY u.username LIMIT 20");

    let students: Vec<StudentBrief> = query.build_query_as().fetch_all(&pool).await?;
    let members = member_ids(&pool, group.id).await?;

    let payload: Vec<StudentInGroup> = students
        .into_iter()
        .map(|student| StudentInGroup {
            in_group: members.contains(&student.id),
            student,
        })
        .collect();

    Ok(Json(payload))
}

/// Looks a student up by user id and reports whether it belongs to the group.
pub async fn find_student(
    State(pool): State<SqlitePool>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Query(params): Query<FindStudentParams>,
) -> Result<impl IntoResponse, AppError> {
    current.require_teacher()?;

    let raw = params
        .user_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("Query parameter 'user_id' is required.".to_string()))?;
    let user_id: i64 = raw
        .parse()
        .map_err(|_| AppError::BadRequest("Query parameter 'user_id' must be an integer.".to_string()))?;

    let group = fetch_group(&pool, id).await?;
    let student = student_by_user(&pool, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Student not found".to_string()))?;
    let members = member_ids(&pool, group.id).await?;

    Ok(Json(StudentInGroup {
        in_group: members.contains(&student.id),
        student,
    }))
}

async fn membership_target(
    pool: &SqlitePool,
    group_id: i64,
    payload: &MembershipRequest,
) -> Result<(Group, StudentBrief, bool), AppError> {
    let user_id = payload
        .user_id
        .ok_or_else(|| AppError::BadRequest("Field 'user_id' is required.".to_string()))?;

    let group = fetch_group(pool, group_id).await?;
    let student = student_by_user(pool, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Student not found".to_string()))?;
    let is_member = member_ids(pool, group.id).await?.contains(&student.id);
    Ok((group, student, is_member))
}

/// Adds a student (by user id) to the group. Adding an existing member is a no-op.
pub async fn add_student(
    State(pool): State<SqlitePool>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<MembershipRequest>,
) -> Result<impl IntoResponse, AppError> {
    current.require_teacher()?;
    let (group, student, is_member) = membership_target(&pool, id, &payload).await?;

    if !is_member {
        let mut tx = pool.begin().await?;
        sqlx::query("INSERT OR IGNORE INTO group_students (group_id, student_id) VALUES (?, ?)")
            .bind(group.id)
            .bind(student.id)
            .execute(&mut *tx)
            .await?;
        touch_group(&mut *tx, group.id).await?;
        tx.commit().await?;
        tracing::info!("Added student {} to group {}", student.id, group.id);
    }

    Ok(Json(serde_json::json!({
        "added": !is_member,
        "student": student,
    })))
}

/// Removes a student (by user id) from the group. Removing a non-member is a no-op.
pub async fn remove_student(
    State(pool): State<SqlitePool>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<MembershipRequest>,
) -> Result<impl IntoResponse, AppError> {
    current.require_teacher()?;
    let (group, student, is_member) = membership_target(&pool, id, &payload).await?;

    if is_member {
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM group_students WHERE group_id = ? AND student_id = ?")
            .bind(group.id)
            .bind(student.id)
            .execute(&mut *tx)
            .await?;
        touch_group(&mut *tx, group.id).await?;
        tx.commit().await?;
        tracing::info!("Removed student {} from group {}", student.id, group.id);
    }

    Ok(Json(serde_json::json!({
        "removed": is_member,
        "student": student,
    })))
}
