// src/handlers/subjects.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use validator::Validate;

use crate::{
    error::{AppError, is_foreign_key_violation, is_unique_violation},
    handlers::{groups::ASSIGNMENT_SELECT, teachers::teacher_id_for_user},
    models::{
        group::Assignment,
        subject::{CreateSubjectRequest, Subject, SubjectListParams, UpdateSubjectRequest},
    },
    utils::{
        extract::CurrentUser,
        html::clean_text,
        query::{contains_pattern, order_by},
    },
};

const SUBJECT_SELECT: &str = "SELECT id, name, description, is_active, updated_at FROM subjects";

const ORDERING: &[(&str, &str)] = &[("name", "name"), ("updated_at", "updated_at"), ("id", "id")];

async fn fetch_subject(pool: &SqlitePool, id: i64) -> Result<Subject, AppError> {
    sqlx::query_as::<_, Subject>(&format!("{} WHERE id = ?", SUBJECT_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Subject not found".to_string()))
}

fn duplicate_name(e: sqlx::Error) -> AppError {
    if is_unique_violation(&e) {
        AppError::field("name", "Subject with this name already exists.")
    } else {
        tracing::error!("Failed to save subject: {:?}", e);
        AppError::from(e)
    }
}

/// Lists subjects, optionally filtered by name (contains) and activity.
pub async fn list_subjects(
    State(pool): State<SqlitePool>,
    Query(params): Query<SubjectListParams>,
) -> Result<impl IntoResponse, AppError> {
    let mut query = QueryBuilder::<Sqlite>::new(SUBJECT_SELECT);
    query.push(" WHERE 1 = 1");

    if let Some(name) = params.name.as_deref().filter(|s| !s.is_empty()) {
        query
            .push(" AND name LIKE ")
            .push_bind(contains_pattern(name))
            .push(" ESCAPE '\\'");
    }
    if let Some(is_active) = params.is_active {
        query.push(" AND is_active = ").push_bind(is_active);
    }
    query
        .push(" ORDER BY ")
        .push(order_by(params.ordering.as_deref(), ORDERING, "name"));

    let subjects: Vec<Subject> = query.build_query_as().fetch_all(&pool).await?;
    Ok(Json(subjects))
}

pub async fn get_subject(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(fetch_subject(&pool, id).await?))
}

pub async fn create_subject(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateSubjectRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO subjects (name, description, is_active, updated_at)
        VALUES (?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(payload.name.trim())
    .bind(clean_text(payload.description.as_deref().unwrap_or("")))
    .bind(payload.is_active.unwrap_or(true))
    .bind(Utc::now())
    .fetch_one(&pool)
    .await
    .map_err(duplicate_name)?;

    tracing::info!("Created subject {} ({})", id, payload.name);
    Ok((StatusCode::CREATED, Json(fetch_subject(&pool, id).await?)))
}

pub async fn update_subject(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateSubjectRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    fetch_subject(&pool, id).await?;

    sqlx::query(
        r#"
        UPDATE subjects SET
            name = COALESCE(?, name),
            description = COALESCE(?, description),
            is_active = COALESCE(?, is_active),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(payload.name.as_deref().map(str::trim))
    .bind(payload.description.as_deref().map(clean_text))
    .bind(payload.is_active)
    .bind(Utc::now())
    .bind(id)
    .execute(&pool)
    .await
    .map_err(duplicate_name)?;

    Ok(Json(fetch_subject(&pool, id).await?))
}

/// Deletes a subject. Refused while topics or assignments still reference it.
pub async fn delete_subject(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM subjects WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                AppError::Conflict(
                    "Subject still has topics or assignments and cannot be deleted".to_string(),
                )
            } else {
                tracing::error!("Failed to delete subject: {:?}", e);
                AppError::from(e)
            }
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Subject not found".to_string()));
    }

    tracing::info!("Deleted subject {}", id);
    Ok(StatusCode::NO_CONTENT)
}

/// Lists the calling teacher's group assignments for one subject.
pub async fn subject_groups(
    State(pool): State<SqlitePool>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let teacher_id = teacher_id_for_user(&pool, current.id).await?.ok_or_else(|| {
        AppError::Forbidden("Only teachers can access this endpoint.".to_string())
    })?;

    let assignments = sqlx::query_as::<_, Assignment>(&format!(
        "{} WHERE a.teacher_id = ? AND a.subject_id = ? ORDER BY g.name",
        ASSIGNMENT_SELECT
    ))
    .bind(teacher_id)
    .bind(id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(assignments))
}
