// src/handlers/teachers.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    error::AppError,
    models::user::{ProfileListParams, TeacherProfile, UpdateTeacherRequest},
    utils::query::contains_pattern,
};

#[derive(sqlx::FromRow)]
struct TeacherRow {
    id: i64,
    user: i64,
    username: String,
    email: String,
}

const TEACHER_SELECT: &str = r#"
    SELECT t.id, t.user_id AS user, u.username, u.email
    FROM teachers t
    JOIN users u ON u.id = t.user_id
"#;

/// Returns the teacher profile id owned by a user, if any.
pub(crate) async fn teacher_id_for_user(
    pool: &SqlitePool,
    user_id: i64,
) -> Result<Option<i64>, AppError> {
    Ok(sqlx::query_scalar("SELECT id FROM teachers WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?)
}

async fn load_profile(pool: &SqlitePool, row: TeacherRow) -> Result<TeacherProfile, AppError> {
    let topics: Vec<i64> = sqlx::query_scalar(
        "SELECT topic_id FROM teacher_topics WHERE teacher_id = ? ORDER BY topic_id",
    )
    .bind(row.id)
    .fetch_all(pool)
    .await?;

    let groups: Vec<i64> =
        sqlx::query_scalar("SELECT id FROM study_groups WHERE teacher_id = ? ORDER BY id")
            .bind(row.id)
            .fetch_all(pool)
            .await?;

    Ok(TeacherProfile {
        id: row.id,
        user: row.user,
        username: row.username,
        email: row.email,
        topics,
        groups,
    })
}

async fn fetch_teacher(pool: &SqlitePool, id: i64) -> Result<TeacherProfile, AppError> {
    let row = sqlx::query_as::<_, TeacherRow>(&format!("{} WHERE t.id = ?", TEACHER_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Teacher not found".to_string()))?;
    load_profile(pool, row).await
}

/// Fails with a field error unless every id exists in `table`.
pub(crate) async fn ensure_ids_exist(
    conn: &mut SqliteConnection,
    table: &str,
    field: &str,
    ids: &[i64],
) -> Result<(), AppError> {
    for id in ids {
        let found: Option<i64> = sqlx::query_scalar(&format!("SELECT id FROM {} WHERE id = ?", table))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        if found.is_none() {
            return Err(AppError::field(
                field,
                format!("Invalid pk \"{}\" - object does not exist.", id),
            ));
        }
    }
    Ok(())
}

pub async fn list_teachers(
    State(pool): State<SqlitePool>,
    Query(params): Query<ProfileListParams>,
) -> Result<impl IntoResponse, AppError> {
    let pattern = params
        .username
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(contains_pattern);

    let rows = sqlx::query_as::<_, TeacherRow>(&format!(
        "{} WHERE (?1 IS NULL OR u.username LIKE ?1 ESCAPE '\\') ORDER BY u.username",
        TEACHER_SELECT
    ))
    .bind(pattern)
    .fetch_all(&pool)
    .await?;

    let mut teachers = Vec::with_capacity(rows.len());
    for row in rows {
        teachers.push(load_profile(&pool, row).await?);
    }
    Ok(Json(teachers))
}

pub async fn get_teacher(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(fetch_teacher(&pool, id).await?))
}

/// Replaces the teacher's topic set and/or the set of groups it leads.
///
/// Groups dropped from the list lose their lead teacher.
pub async fn update_teacher(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateTeacherRequest>,
) -> Result<impl IntoResponse, AppError> {
    // Existence check doubles as 404.
    fetch_teacher(&pool, id).await?;

    let mut tx = pool.begin().await?;

    if let Some(topics) = &payload.topics {
        ensure_ids_exist(&mut *tx, "topics", "topics", topics).await?;

        sqlx::query("DELETE FROM teacher_topics WHERE teacher_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        for topic_id in topics {
            sqlx::query("INSERT OR IGNORE INTO teacher_topics (teacher_id, topic_id) VALUES (?, ?)")
                .bind(id)
                .bind(topic_id)
                .execute(&mut *tx)
                .await?;
        }
    }

    if let Some(groups) = &payload.groups {
        ensure_ids_exist(&mut *tx, "study_groups", "groups", groups).await?;

        let now = chrono::Utc::now();
        sqlx::query("UPDATE study_groups SET teacher_id = NULL, updated_at = ? WHERE teacher_id = ?")
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        for group_id in groups {
            sqlx::query("UPDATE study_groups SET teacher_id = ?, updated_at = ? WHERE id = ?")
                .bind(id)
                .bind(now)
                .bind(group_id)
                .execute(&mut *tx)
                .await?;
        }
    }

    tx.commit().await?;
    tracing::info!("Updated teacher profile {}", id);

    Ok(Json(fetch_teacher(&pool, id).await?))
}
