// src/handlers/students.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    handlers::teachers::ensure_ids_exist,
    models::user::{
        ProfileListParams, StudentAssignment, StudentBrief, StudentProfile, UpdateStudentRequest,
    },
    utils::{extract::CurrentUser, query::contains_pattern},
};

pub(crate) const STUDENT_SELECT: &str = r#"
    SELECT s.id, s.user_id AS user, u.username, u.email
    FROM students s
    JOIN users u ON u.id = s.user_id
"#;

/// Looks a student up by the id of its user account.
pub(crate) async fn student_by_user(
    pool: &SqlitePool,
    user_id: i64,
) -> Result<Option<StudentBrief>, AppError> {
    Ok(
        sqlx::query_as::<_, StudentBrief>(&format!("{} WHERE s.user_id = ?", STUDENT_SELECT))
            .bind(user_id)
            .fetch_optional(pool)
            .await?,
    )
}

async fn load_profile(pool: &SqlitePool, student: StudentBrief) -> Result<StudentProfile, AppError> {
    let groups: Vec<i64> = sqlx::query_scalar(
        "SELECT group_id FROM group_students WHERE student_id = ? ORDER BY group_id",
    )
    .bind(student.id)
    .fetch_all(pool)
    .await?;

    Ok(StudentProfile { student, groups })
}

async fn fetch_student(pool: &SqlitePool, id: i64) -> Result<StudentProfile, AppError> {
    let student = sqlx::query_as::<_, StudentBrief>(&format!("{} WHERE s.id = ?", STUDENT_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Student not found".to_string()))?;
    load_profile(pool, student).await
}

pub async fn list_students(
    State(pool): State<SqlitePool>,
    Query(params): Query<ProfileListParams>,
) -> Result<impl IntoResponse, AppError> {
    let pattern = params
        .username
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(contains_pattern);

    let rows = sqlx::query_as::<_, StudentBrief>(&format!(
        "{} WHERE (?1 IS NULL OR u.username LIKE ?1 ESCAPE '\\') ORDER BY u.username",
        STUDENT_SELECT
    ))
    .bind(pattern)
    .fetch_all(&pool)
    .await?;

    let mut students = Vec::with_capacity(rows.len());
    for row in rows {
        students.push(load_profile(&pool, row).await?);
    }
    Ok(Json(students))
}

pub async fn get_student(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(fetch_student(&pool, id).await?))
}

/// Replaces the student's group memberships. A student may belong to any number of groups.
pub async fn update_student(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateStudentRequest>,
) -> Result<impl IntoResponse, AppError> {
    fetch_student(&pool, id).await?;

    if let Some(groups) = &payload.groups {
        let mut tx = pool.begin().await?;
        ensure_ids_exist(&mut *tx, "study_groups", "groups", groups).await?;

        let now = chrono::Utc::now();
        let previous: Vec<i64> =
            sqlx::query_scalar("SELECT group_id FROM group_students WHERE student_id = ?")
                .bind(id)
                .fetch_all(&mut *tx)
                .await?;

        sqlx::query("DELETE FROM group_students WHERE student_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        for group_id in groups {
            sqlx::query("INSERT OR IGNORE INTO group_students (group_id, student_id) VALUES (?, ?)")
                .bind(group_id)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        // Membership changed on both the old and the new groups.
        for group_id in previous.iter().chain(groups.iter()) {
            sqlx::query("UPDATE study_groups SET updated_at = ? WHERE id = ?")
                .bind(now)
                .bind(group_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        tracing::info!("Updated group memberships of student {}", id);
    }

    Ok(Json(fetch_student(&pool, id).await?))
}

/// Lists every teaching assignment of every active group the calling student belongs to.
pub async fn my_assignments(
    State(pool): State<SqlitePool>,
    current: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let student = student_by_user(&pool, current.id)
        .await?
        .ok_or_else(|| AppError::Forbidden("Only students can access this endpoint.".to_string()))?;

    let assignments = sqlx::query_as::<_, StudentAssignment>(
        r#"
        SELECT
            g.id AS group_id,
            g.name AS group_name,
            a.teacher_id,
            tu.username AS teacher_username,
            a.subject_id,
            sub.name AS subject_name,
            a.topic_id,
            tp.title AS topic_title,
            a.updated_at
        FROM group_students gs
        JOIN study_groups g ON g.id = gs.group_id
        JOIN group_teaching_assignments a ON a.group_id = g.id
        JOIN teachers t ON t.id = a.teacher_id
        JOIN users tu ON tu.id = t.user_id
        JOIN subjects sub ON sub.id = a.subject_id
        LEFT JOIN topics tp ON tp.id = a.topic_id
        WHERE gs.student_id = ? AND g.is_active = 1
        ORDER BY g.name, tu.username
        "#,
    )
    .bind(student.id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(assignments))
}
