// src/handlers/questions.rs

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use validator::Validate;

use crate::{
    error::{AppError, is_foreign_key_violation},
    grading::validate_choices,
    handlers::topics::touch_topic,
    models::question::{
        Choice, ChoiceInput, CreateQuestionRequest, Question, QuestionListParams,
        UpdateQuestionRequest,
    },
    utils::query::{contains_pattern, order_by},
};

const QUESTION_SELECT: &str = r#"
    SELECT id, topic_id AS topic, text, question_type, is_active, created_at
    FROM questions
"#;

const ORDERING: &[(&str, &str)] = &[("created_at", "created_at"), ("id", "id"), ("text", "text")];

/// Loads the choices of the given questions, keyed by question id, in display order.
pub(crate) async fn load_choices(
    pool: &SqlitePool,
    question_ids: &[i64],
) -> Result<HashMap<i64, Vec<Choice>>, AppError> {
    let mut by_question: HashMap<i64, Vec<Choice>> = HashMap::new();
    if question_ids.is_empty() {
        return Ok(by_question);
    }

    // Use QueryBuilder for dynamic IN clause
    let mut query_builder = QueryBuilder::<Sqlite>::new(
        "SELECT id, question_id, text, is_correct, position FROM choices WHERE question_id IN (",
    );
    let mut separated = query_builder.separated(",");
    for id in question_ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(") ORDER BY position, id");

    let choices: Vec<Choice> = query_builder.build_query_as().fetch_all(pool).await?;
    for choice in choices {
        by_question.entry(choice.question_id).or_default().push(choice);
    }
    Ok(by_question)
}

/// Attaches choices to a batch of questions.
pub(crate) async fn with_choices(
    pool: &SqlitePool,
    mut questions: Vec<Question>,
) -> Result<Vec<Question>, AppError> {
    let ids: Vec<i64> = questions.iter().map(|q| q.id).collect();
    let mut choices = load_choices(pool, &ids).await?;
    for question in &mut questions {
        question.choices = choices.remove(&question.id).unwrap_or_default();
    }
    Ok(questions)
}

/// Loads the given questions with their choices, keyed by id.
pub(crate) async fn questions_by_id(
    pool: &SqlitePool,
    ids: &[i64],
) -> Result<HashMap<i64, Question>, AppError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut query = QueryBuilder::<Sqlite>::new(QUESTION_SELECT);
    query.push(" WHERE id IN (");
    let mut separated = query.separated(",");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    let questions: Vec<Question> = query.build_query_as().fetch_all(pool).await?;
    Ok(with_choices(pool, questions)
        .await?
        .into_iter()
        .map(|q| (q.id, q))
        .collect())
}

pub(crate) async fn fetch_question(pool: &SqlitePool, id: i64) -> Result<Question, AppError> {
    let question = sqlx::query_as::<_, Question>(&format!("{} WHERE id = ?", QUESTION_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;

    with_choices(pool, vec![question])
        .await?
        .pop()
        .ok_or_else(|| AppError::NotFound("Question not found".to_string()))
}

/// Deletes a question's choices and inserts the given ones.
/// `order` defaults to the 1-based position in the list.
async fn replace_choices(
    conn: &mut SqliteConnection,
    question_id: i64,
    choices: &[ChoiceInput],
) -> Result<(), AppError> {
    sqlx::query("DELETE FROM choices WHERE question_id = ?")
        .bind(question_id)
        .execute(&mut *conn)
        .await?;

    for (idx, choice) in choices.iter().enumerate() {
        let order = choice.order.filter(|o| *o > 0).unwrap_or(idx as i64 + 1);
        sqlx::query(
            "INSERT INTO choices (question_id, text, is_correct, position) VALUES (?, ?, ?, ?)",
        )
        .bind(question_id)
        .bind(choice.text.as_deref().unwrap_or("").trim())
        .bind(choice.is_correct)
        .bind(order)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn ensure_topic(pool: &SqlitePool, topic_id: i64) -> Result<(), AppError> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM topics WHERE id = ?")
        .bind(topic_id)
        .fetch_optional(pool)
        .await?;
    found.map(|_| ()).ok_or_else(|| {
        AppError::field(
            "topic",
            format!("Invalid pk \"{}\" - object does not exist.", topic_id),
        )
    })
}

/// Lists questions (newest first by default) with their choices.
pub async fn list_questions(
    State(pool): State<SqlitePool>,
    Query(params): Query<QuestionListParams>,
) -> Result<impl IntoResponse, AppError> {
    let mut query = QueryBuilder::<Sqlite>::new(QUESTION_SELECT);
    query.push(" WHERE 1 = 1");

    if let Some(topic) = params.topic {
        query.push(" AND topic_id = ").push_bind(topic);
    }
    if let Some(text) = params.text.as_deref().filter(|s| !s.is_empty()) {
        query
            .push(" AND text LIKE ")
            .push_bind(contains_pattern(text))
            .push(" ESCAPE '\\'");
    }
    if let Some(question_type) = params.question_type {
        query.push(" AND question_type = ").push_bind(question_type.as_str());
    }
    if let Some(is_active) = params.is_active {
        query.push(" AND is_active = ").push_bind(is_active);
    }
    query
        .push(" ORDER BY ")
        .push(order_by(params.ordering.as_deref(), ORDERING, "-created_at"))
        .push(", id DESC");

    let questions: Vec<Question> = query.build_query_as().fetch_all(&pool).await?;
    Ok(Json(with_choices(&pool, questions).await?))
}

pub async fn get_question(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(fetch_question(&pool, id).await?))
}

/// Creates a question with its choices and touches the owning topic.
pub async fn create_question(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let choices = payload
        .choices
        .as_deref()
        .ok_or_else(|| AppError::field("choices", "This field is required."))?;
    validate_choices(payload.question_type, choices)?;
    ensure_topic(&pool, payload.topic).await?;

    let mut tx = pool.begin().await?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO questions (topic_id, text, question_type, is_active, created_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(payload.topic)
    .bind(payload.text.trim())
    .bind(payload.question_type.as_str())
    .bind(payload.is_active.unwrap_or(true))
    .bind(Utc::now())
    .fetch_one(&mut *tx)
    .await?;

    replace_choices(&mut *tx, id, choices).await?;
    touch_topic(&mut *tx, payload.topic).await?;
    tx.commit().await?;

    tracing::info!("Created question {} in topic {}", id, payload.topic);
    Ok((StatusCode::CREATED, Json(fetch_question(&pool, id).await?)))
}

/// Updates a question. When `choices` is sent it replaces the full set and is
/// validated against the resulting question type.
pub async fn update_question(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let existing = fetch_question(&pool, id).await?;
    let question_type = payload.question_type.unwrap_or(existing.question_type);

    match payload.choices.as_deref() {
        Some(choices) => validate_choices(question_type, choices)?,
        // Switching the type without new choices must still leave a valid set.
        None if payload.question_type.is_some() => {
            let current: Vec<ChoiceInput> = existing
                .choices
                .iter()
                .map(|c| ChoiceInput {
                    text: Some(c.text.clone()),
                    is_correct: c.is_correct,
                    order: Some(c.order),
                })
                .collect();
            validate_choices(question_type, &current)?;
        }
        None => {}
    }

    if let Some(topic) = payload.topic {
        ensure_topic(&pool, topic).await?;
    }

    let mut tx = pool.begin().await?;
    sqlx::query(
        r#"
        UPDATE questions SET
            topic_id = COALESCE(?, topic_id),
            text = COALESCE(?, text),
            question_type = ?,
            is_active = COALESCE(?, is_active)
        WHERE id = ?
        "#,
    )
    .bind(payload.topic)
    .bind(payload.text.as_deref().map(str::trim))
    .bind(question_type.as_str())
    .bind(payload.is_active)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if let Some(choices) = payload.choices.as_deref() {
        replace_choices(&mut *tx, id, choices).await?;
    }

    touch_topic(&mut *tx, payload.topic.unwrap_or(existing.topic)).await?;
    if payload.topic.is_some_and(|t| t != existing.topic) {
        touch_topic(&mut *tx, existing.topic).await?;
    }
    tx.commit().await?;

    tracing::info!("Updated question {}", id);
    Ok(Json(fetch_question(&pool, id).await?))
}

/// Deletes a question and touches its topic. Refused once an attempt used it.
pub async fn delete_question(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let topic_id: i64 = sqlx::query_scalar("SELECT topic_id FROM questions WHERE id = ?")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;

    let used: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM attempt_questions WHERE question_id = ?)")
            .bind(id)
            .fetch_one(&pool)
            .await?;
    if used {
        return Err(AppError::Conflict(
            "Question is used by attempts and cannot be deleted".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM questions WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                AppError::Conflict("Question is used by attempts and cannot be deleted".to_string())
            } else {
                tracing::error!("Failed to delete question: {:?}", e);
                AppError::from(e)
            }
        })?;
    touch_topic(&mut *tx, topic_id).await?;
    tx.commit().await?;

    tracing::info!("Deleted question {}", id);
    Ok(StatusCode::NO_CONTENT)
}
