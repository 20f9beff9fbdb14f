// src/handlers/answers.rs

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use validator::Validate;

use crate::{
    error::AppError,
    grading::is_answer_correct,
    models::attempt::{Answer, AnswerListParams, ReviewAnswerRequest},
    utils::{extract::CurrentUser, html::clean_text},
};

const ANSWER_SELECT: &str = r#"
    SELECT
        an.id,
        an.attempt_question_id AS attempt_question,
        an.answered_at,
        an.is_correct,
        an.teacher_comment
    FROM answers an
    JOIN attempt_questions aq ON aq.id = an.attempt_question_id
    JOIN attempts a ON a.id = aq.attempt_id
"#;

/// Fills `selected_choices` for a batch of answers.
async fn attach_selected(pool: &SqlitePool, answers: &mut [Answer]) -> Result<(), AppError> {
    if answers.is_empty() {
        return Ok(());
    }

    let mut query = QueryBuilder::<Sqlite>::new(
        "SELECT answer_id, choice_id FROM answer_choices WHERE answer_id IN (",
    );
    let mut separated = query.separated(",");
    for answer in answers.iter() {
        separated.push_bind(answer.id);
    }
    separated.push_unseparated(") ORDER BY choice_id");

    let rows: Vec<(i64, i64)> = query.build_query_as().fetch_all(pool).await?;
    let mut by_answer: HashMap<i64, Vec<i64>> = HashMap::new();
    for (answer_id, choice_id) in rows {
        by_answer.entry(answer_id).or_default().push(choice_id);
    }
    for answer in answers.iter_mut() {
        answer.selected_choices = by_answer.remove(&answer.id).unwrap_or_default();
    }
    Ok(())
}

/// Answers of the given attempt questions, keyed by attempt question id.
pub(crate) async fn load_answers(
    pool: &SqlitePool,
    attempt_question_ids: &[i64],
) -> Result<HashMap<i64, Answer>, AppError> {
    if attempt_question_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut query = QueryBuilder::<Sqlite>::new(ANSWER_SELECT);
    query.push(" WHERE an.attempt_question_id IN (");
    let mut separated = query.separated(",");
    for id in attempt_question_ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    let mut answers: Vec<Answer> = query.build_query_as().fetch_all(pool).await?;
    attach_selected(pool, &mut answers).await?;
    Ok(answers
        .into_iter()
        .map(|a| (a.attempt_question, a))
        .collect())
}

/// Grades one stored answer against its question and persists the verdict.
pub(crate) async fn regrade(
    conn: &mut SqliteConnection,
    answer_id: i64,
    question_id: i64,
) -> Result<bool, AppError> {
    let selected: Vec<i64> =
        sqlx::query_scalar("SELECT choice_id FROM answer_choices WHERE answer_id = ?")
            .bind(answer_id)
            .fetch_all(&mut *conn)
            .await?;
    let correct: Vec<i64> =
        sqlx::query_scalar("SELECT id FROM choices WHERE question_id = ? AND is_correct = 1")
            .bind(question_id)
            .fetch_all(&mut *conn)
            .await?;

    let is_correct = is_answer_correct(&selected, &correct);
    sqlx::query("UPDATE answers SET is_correct = ? WHERE id = ?")
        .bind(is_correct)
        .bind(answer_id)
        .execute(&mut *conn)
        .await?;
    Ok(is_correct)
}

async fn fetch_answer(
    pool: &SqlitePool,
    current: &CurrentUser,
    id: i64,
) -> Result<Answer, AppError> {
    let mut query = QueryBuilder::<Sqlite>::new(ANSWER_SELECT);
    query.push(" WHERE an.id = ").push_bind(id);
    if !current.is_teacher() {
        query.push(" AND a.student_id = ").push_bind(current.id);
    }

    let answer: Answer = query
        .build_query_as()
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Answer not found".to_string()))?;

    let mut answers = vec![answer];
    attach_selected(pool, &mut answers).await?;
    answers
        .pop()
        .ok_or_else(|| AppError::NotFound("Answer not found".to_string()))
}

/// Lists answers; students only see the answers of their own attempts.
pub async fn list_answers(
    State(pool): State<SqlitePool>,
    current: CurrentUser,
    Query(params): Query<AnswerListParams>,
) -> Result<impl IntoResponse, AppError> {
    let mut query = QueryBuilder::<Sqlite>::new(ANSWER_SELECT);
    query.push(" WHERE 1 = 1");

    if !current.is_teacher() {
        query.push(" AND a.student_id = ").push_bind(current.id);
    }
    if let Some(attempt) = params.attempt {
        query.push(" AND aq.attempt_id = ").push_bind(attempt);
    }
    if let Some(attempt_question) = params.attempt_question {
        query
            .push(" AND an.attempt_question_id = ")
            .push_bind(attempt_question);
    }
    if let Some(is_correct) = params.is_correct {
        query.push(" AND an.is_correct = ").push_bind(is_correct);
    }
    query.push(" ORDER BY aq.attempt_id, aq.position");

    let mut answers: Vec<Answer> = query.build_query_as().fetch_all(&pool).await?;
    attach_selected(&pool, &mut answers).await?;
    Ok(Json(answers))
}

pub async fn get_answer(
    State(pool): State<SqlitePool>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(fetch_answer(&pool, &current, id).await?))
}

/// Teacher review: sets a comment and may override the verdict (`null` resets it).
pub async fn review_answer(
    State(pool): State<SqlitePool>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<ReviewAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    current.require_teacher()?;
    payload.validate()?;
    fetch_answer(&pool, &current, id).await?;

    sqlx::query(
        r#"
        UPDATE answers SET
            teacher_comment = COALESCE(?, teacher_comment),
            is_correct = CASE WHEN ? THEN ? ELSE is_correct END
        WHERE id = ?
        "#,
    )
    .bind(payload.teacher_comment.as_deref().map(clean_text))
    .bind(payload.is_correct.is_some())
    .bind(payload.is_correct.flatten())
    .bind(id)
    .execute(&pool)
    .await?;

    tracing::info!("Teacher {} reviewed answer {}", current.id, id);
    Ok(Json(fetch_answer(&pool, &current, id).await?))
}
