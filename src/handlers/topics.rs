// src/handlers/topics.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteExecutor, SqlitePool};
use validator::Validate;

use crate::{
    error::{AppError, is_foreign_key_violation, is_unique_violation},
    handlers::groups::touch_group,
    models::topic::{CreateTopicRequest, Topic, TopicListParams, UpdateTopicRequest},
    utils::{
        html::clean_text,
        query::{contains_pattern, order_by},
    },
};

const TOPIC_SELECT: &str = r#"
    SELECT
        t.id, t.subject_id AS subject, s.name AS subject_name,
        t.title, t.description, t.is_active, t.updated_at
    FROM topics t
    JOIN subjects s ON s.id = t.subject_id
"#;

const ORDERING: &[(&str, &str)] = &[
    ("title", "t.title"),
    ("updated_at", "t.updated_at"),
    ("id", "t.id"),
    ("subject", "t.subject_id"),
];

pub(crate) async fn fetch_topic(pool: &SqlitePool, id: i64) -> Result<Topic, AppError> {
    sqlx::query_as::<_, Topic>(&format!("{} WHERE t.id = ?", TOPIC_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Topic not found".to_string()))
}

/// Bumps a topic's `updated_at`, e.g. after one of its questions changed.
pub(crate) async fn touch_topic<'e, E>(executor: E, id: i64) -> Result<(), AppError>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query("UPDATE topics SET updated_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}

async fn ensure_subject(pool: &SqlitePool, subject_id: i64) -> Result<(), AppError> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM subjects WHERE id = ?")
        .bind(subject_id)
        .fetch_optional(pool)
        .await?;
    found.map(|_| ()).ok_or_else(|| {
        AppError::field(
            "subject",
            format!("Invalid pk \"{}\" - object does not exist.", subject_id),
        )
    })
}

fn duplicate_title(e: sqlx::Error) -> AppError {
    if is_unique_violation(&e) {
        AppError::field("title", "Topic with this title already exists in the subject.")
    } else {
        tracing::error!("Failed to save topic: {:?}", e);
        AppError::from(e)
    }
}

/// Lists topics with their subject name.
pub async fn list_topics(
    State(pool): State<SqlitePool>,
    Query(params): Query<TopicListParams>,
) -> Result<impl IntoResponse, AppError> {
    let mut query = QueryBuilder::<Sqlite>::new(TOPIC_SELECT);
    query.push(" WHERE 1 = 1");

    if let Some(title) = params.title.as_deref().filter(|s| !s.is_empty()) {
        query
            .push(" AND t.title LIKE ")
            .push_bind(contains_pattern(title))
            .push(" ESCAPE '\\'");
    }
    if let Some(subject) = params.subject {
        query.push(" AND t.subject_id = ").push_bind(subject);
    }
    if let Some(is_active) = params.is_active {
        query.push(" AND t.is_active = ").push_bind(is_active);
    }
    query
        .push(" ORDER BY ")
        .push(order_by(params.ordering.as_deref(), ORDERING, "title"));

    let topics: Vec<Topic> = query.build_query_as().fetch_all(&pool).await?;
    Ok(Json(topics))
}

pub async fn get_topic(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(fetch_topic(&pool, id).await?))
}

/// Creates a topic. The title must be unique within its subject only.
pub async fn create_topic(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateTopicRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    ensure_subject(&pool, payload.subject).await?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO topics (subject_id, title, description, is_active, updated_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(payload.subject)
    .bind(payload.title.trim())
    .bind(clean_text(payload.description.as_deref().unwrap_or("")))
    .bind(payload.is_active.unwrap_or(true))
    .bind(Utc::now())
    .fetch_one(&pool)
    .await
    .map_err(duplicate_title)?;

    tracing::info!("Created topic {} ({}) in subject {}", id, payload.title, payload.subject);
    Ok((StatusCode::CREATED, Json(fetch_topic(&pool, id).await?)))
}

/// Updates a topic. Moving it to another subject detaches it from teaching
/// assignments that keep the old subject.
pub async fn update_topic(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateTopicRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let existing = fetch_topic(&pool, id).await?;
    if let Some(subject) = payload.subject {
        ensure_subject(&pool, subject).await?;
    }

    let now = Utc::now();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE topics SET
            subject_id = COALESCE(?, subject_id),
            title = COALESCE(?, title),
            description = COALESCE(?, description),
            is_active = COALESCE(?, is_active),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(payload.subject)
    .bind(payload.title.as_deref().map(str::trim))
    .bind(payload.description.as_deref().map(clean_text))
    .bind(payload.is_active)
    .bind(now)
    .bind(id)
    .execute(&mut *tx)
    .await
    .map_err(duplicate_title)?;

    if let Some(subject) = payload.subject.filter(|s| *s != existing.subject) {
        let groups: Vec<i64> = sqlx::query_scalar(
            r#"
            UPDATE group_teaching_assignments SET topic_id = NULL, updated_at = ?
            WHERE topic_id = ? AND subject_id <> ?
            RETURNING group_id
            "#,
        )
        .bind(now)
        .bind(id)
        .bind(subject)
        .fetch_all(&mut *tx)
        .await?;

        for group_id in &groups {
            touch_group(&mut *tx, *group_id).await?;
        }
        if !groups.is_empty() {
            tracing::info!(
                "Topic {} moved to subject {}; cleared it from {} assignments",
                id,
                subject,
                groups.len()
            );
        }
    }

    tx.commit().await?;

    Ok(Json(fetch_topic(&pool, id).await?))
}

/// Deletes a topic and its questions. Refused while attempts or assignments reference it.
pub async fn delete_topic(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let used: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM attempt_questions aq
            JOIN questions q ON q.id = aq.question_id
            WHERE q.topic_id = ?
        )
        "#,
    )
    .bind(id)
    .fetch_one(&pool)
    .await?;
    if used {
        return Err(AppError::Conflict(
            "Topic is used by attempts or assignments and cannot be deleted".to_string(),
        ));
    }

    let result = sqlx::query("DELETE FROM topics WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                AppError::Conflict(
                    "Topic is used by attempts or assignments and cannot be deleted".to_string(),
                )
            } else {
                tracing::error!("Failed to delete topic: {:?}", e);
                AppError::from(e)
            }
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Topic not found".to_string()));
    }

    tracing::info!("Deleted topic {}", id);
    Ok(StatusCode::NO_CONTENT)
}
