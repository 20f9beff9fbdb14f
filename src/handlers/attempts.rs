// src/handlers/attempts.rs

use std::collections::BTreeSet;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction};

use crate::{
    config::Config,
    error::AppError,
    grading::{is_answer_correct, validate_selection},
    handlers::{
        answers::{load_answers, regrade},
        questions::{fetch_question, questions_by_id},
    },
    models::{
        attempt::{
            Attempt, AttemptListParams, AttemptQuestionListParams, AttemptQuestionRow,
            AttemptQuestionView, AttemptStatus, CreateAttemptRequest, SubmitAnswerRequest,
            UpdateAttemptRequest,
        },
        question::PublicQuestion,
        user::Role,
    },
    utils::{extract::CurrentUser, query::order_by},
};

const ATTEMPT_SELECT: &str = r#"
    SELECT
        a.id,
        a.student_id AS student,
        a.topic_id AS topic,
        t.title AS topic_title,
        a.started_at,
        a.expires_at,
        a.finished_at,
        a.status,
        (SELECT COUNT(*) FROM attempt_questions aq WHERE aq.attempt_id = a.id) AS question_count,
        (SELECT COUNT(*) FROM attempt_questions aq
            JOIN answers an ON an.attempt_question_id = aq.id
            WHERE aq.attempt_id = a.id AND an.is_correct = 1) AS correct_count
    FROM attempts a
    JOIN topics t ON t.id = a.topic_id
"#;

const ATTEMPT_QUESTION_SELECT: &str =
    "SELECT aq.id, aq.attempt_id, aq.question_id, aq.position FROM attempt_questions aq";

const ORDERING: &[(&str, &str)] = &[
    ("started_at", "a.started_at"),
    ("finished_at", "a.finished_at"),
    ("id", "a.id"),
];

/// Fetches an attempt the caller may see. Students only see their own;
/// anyone else's attempt is reported as missing.
async fn visible_attempt(
    pool: &SqlitePool,
    current: &CurrentUser,
    id: i64,
) -> Result<Attempt, AppError> {
    let attempt = sqlx::query_as::<_, Attempt>(&format!("{} WHERE a.id = ?", ATTEMPT_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Attempt not found".to_string()))?;

    if !current.is_teacher() && attempt.student != current.id {
        return Err(AppError::NotFound("Attempt not found".to_string()));
    }
    Ok(attempt)
}

/// Re-checks inside the transaction that the attempt is still in progress.
/// The no-op write makes SQLite take the write lock before anything else runs.
async fn lock_in_progress(
    tx: &mut Transaction<'_, Sqlite>,
    attempt_id: i64,
) -> Result<(), AppError> {
    let result = sqlx::query("UPDATE attempts SET status = status WHERE id = ? AND status = ?")
        .bind(attempt_id)
        .bind(AttemptStatus::InProgress.as_str())
        .execute(&mut **tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::BadRequest(
            "Attempt is not in progress.".to_string(),
        ));
    }
    Ok(())
}

/// The user the new attempt belongs to.
async fn attempt_owner(
    pool: &SqlitePool,
    current: &CurrentUser,
    requested: Option<i64>,
) -> Result<i64, AppError> {
    if !current.is_teacher() {
        return match requested {
            Some(other) if other != current.id => Err(AppError::Forbidden(
                "Students can only start their own attempts.".to_string(),
            )),
            _ => Ok(current.id),
        };
    }

    let student = requested.ok_or_else(|| AppError::field("student", "This field is required."))?;
    let role: Option<String> = sqlx::query_scalar("SELECT role FROM users WHERE id = ?")
        .bind(student)
        .fetch_optional(pool)
        .await?;
    match role.map(Role::try_from) {
        Some(Ok(Role::Student)) => Ok(student),
        Some(_) => Err(AppError::field("student", "User is not a student.")),
        None => Err(AppError::field(
            "student",
            format!("Invalid pk \"{}\" - object does not exist.", student),
        )),
    }
}

/// Starts an attempt: draws active questions of the topic at random and
/// creates an empty answer for each.
pub async fn create_attempt(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    current: CurrentUser,
    Json(payload): Json<CreateAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let student = attempt_owner(&pool, &current, payload.student).await?;

    let topic_active: Option<bool> = sqlx::query_scalar("SELECT is_active FROM topics WHERE id = ?")
        .bind(payload.topic)
        .fetch_optional(&pool)
        .await?;
    match topic_active {
        None => {
            return Err(AppError::field(
                "topic",
                format!("Invalid pk \"{}\" - object does not exist.", payload.topic),
            ));
        }
        Some(false) => return Err(AppError::field("topic", "Topic is not active.")),
        Some(true) => {}
    }

    let question_ids: Vec<i64> = sqlx::query_scalar(
        "SELECT id FROM questions WHERE topic_id = ? AND is_active = 1 ORDER BY RANDOM() LIMIT ?",
    )
    .bind(payload.topic)
    .bind(config.attempt_question_limit)
    .fetch_all(&pool)
    .await?;

    if question_ids.is_empty() {
        return Err(AppError::BadRequest(
            "Topic has no active questions.".to_string(),
        ));
    }

    let started_at = Utc::now();
    let expires_at = started_at + Duration::seconds(config.attempt_time_limit_secs);

    let mut tx = pool.begin().await?;

    let attempt_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO attempts (student_id, topic_id, started_at, expires_at, status)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(student)
    .bind(payload.topic)
    .bind(started_at)
    .bind(expires_at)
    .bind(AttemptStatus::InProgress.as_str())
    .fetch_one(&mut *tx)
    .await?;

    for (idx, question_id) in question_ids.iter().enumerate() {
        let attempt_question_id: i64 = sqlx::query_scalar(
            "INSERT INTO attempt_questions (attempt_id, question_id, position) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(attempt_id)
        .bind(question_id)
        .bind(idx as i64 + 1)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO answers (attempt_question_id) VALUES (?)")
            .bind(attempt_question_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    tracing::info!(
        "Started attempt {} for user {} on topic {} with {} questions",
        attempt_id,
        student,
        payload.topic,
        question_ids.len()
    );
    Ok((
        StatusCode::CREATED,
        Json(visible_attempt(&pool, &current, attempt_id).await?),
    ))
}

/// Lists attempts, newest first. Students only see their own.
pub async fn list_attempts(
    State(pool): State<SqlitePool>,
    current: CurrentUser,
    Query(params): Query<AttemptListParams>,
) -> Result<impl IntoResponse, AppError> {
    let mut query = QueryBuilder::<Sqlite>::new(ATTEMPT_SELECT);
    query.push(" WHERE 1 = 1");

    if !current.is_teacher() {
        query.push(" AND a.student_id = ").push_bind(current.id);
    } else if let Some(student) = params.student {
        query.push(" AND a.student_id = ").push_bind(student);
    }
    if let Some(topic) = params.topic {
        query.push(" AND a.topic_id = ").push_bind(topic);
    }
    if let Some(status) = params.status {
        query.push(" AND a.status = ").push_bind(status.as_str());
    }
    query
        .push(" ORDER BY ")
        .push(order_by(params.ordering.as_deref(), ORDERING, "-started_at"))
        .push(", a.id DESC");

    let attempts: Vec<Attempt> = query.build_query_as().fetch_all(&pool).await?;
    Ok(Json(attempts))
}

pub async fn get_attempt(
    State(pool): State<SqlitePool>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(visible_attempt(&pool, &current, id).await?))
}

/// Finishes an in-progress attempt. Completion grades every answer;
/// unanswered questions count as incorrect.
pub async fn update_attempt(
    State(pool): State<SqlitePool>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = visible_attempt(&pool, &current, id).await?;

    if attempt.status != AttemptStatus::InProgress {
        return Err(AppError::BadRequest(
            "Attempt is already finished.".to_string(),
        ));
    }
    if payload.status == AttemptStatus::InProgress {
        return Err(AppError::field(
            "status",
            "Status can only move to completed or abandoned.",
        ));
    }

    let mut tx = pool.begin().await?;
    lock_in_progress(&mut tx, id).await?;

    if payload.status == AttemptStatus::Completed {
        let rows: Vec<(i64, i64, bool)> = sqlx::query_as(
            r#"
            SELECT an.id, aq.question_id, an.answered_at IS NOT NULL
            FROM answers an
            JOIN attempt_questions aq ON aq.id = an.attempt_question_id
            WHERE aq.attempt_id = ?
            "#,
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        for (answer_id, question_id, answered) in rows {
            if answered {
                regrade(&mut *tx, answer_id, question_id).await?;
            } else {
                sqlx::query("UPDATE answers SET is_correct = 0 WHERE id = ?")
                    .bind(answer_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        sqlx::query("UPDATE attempts SET status = ?, finished_at = ? WHERE id = ?")
            .bind(payload.status.as_str())
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await?;
    } else {
        sqlx::query("UPDATE attempts SET status = ? WHERE id = ?")
            .bind(payload.status.as_str())
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    tracing::info!("Attempt {} moved to {}", id, payload.status.as_str());
    Ok(Json(visible_attempt(&pool, &current, id).await?))
}

pub async fn delete_attempt(
    State(pool): State<SqlitePool>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    current.require_teacher()?;

    let result = sqlx::query("DELETE FROM attempts WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Attempt not found".to_string()));
    }

    tracing::info!("Deleted attempt {}", id);
    Ok(StatusCode::NO_CONTENT)
}

/// Builds the public views of attempt questions: question without correctness, plus answer.
async fn build_views(
    pool: &SqlitePool,
    rows: Vec<AttemptQuestionRow>,
) -> Result<Vec<AttemptQuestionView>, AppError> {
    let question_ids: Vec<i64> = rows
        .iter()
        .map(|r| r.question_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let row_ids: Vec<i64> = rows.iter().map(|r| r.id).collect();

    let questions = questions_by_id(pool, &question_ids).await?;
    let mut answers = load_answers(pool, &row_ids).await?;

    rows.into_iter()
        .map(|row| {
            let question = questions.get(&row.question_id).ok_or_else(|| {
                AppError::InternalServerError(format!(
                    "question {} of attempt question {} is missing",
                    row.question_id, row.id
                ))
            })?;
            Ok(AttemptQuestionView {
                id: row.id,
                attempt: row.attempt_id,
                order: row.order,
                question: PublicQuestion::from(question),
                answer: answers.remove(&row.id),
            })
        })
        .collect()
}

/// Fetches an attempt question together with its (visible) attempt.
async fn visible_attempt_question(
    pool: &SqlitePool,
    current: &CurrentUser,
    id: i64,
) -> Result<(AttemptQuestionRow, Attempt), AppError> {
    let row = sqlx::query_as::<_, AttemptQuestionRow>(&format!(
        "{} WHERE aq.id = ?",
        ATTEMPT_QUESTION_SELECT
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Attempt question not found".to_string()))?;

    let attempt = visible_attempt(pool, current, row.attempt_id)
        .await
        .map_err(|e| match e {
            AppError::NotFound(_) => AppError::NotFound("Attempt question not found".to_string()),
            other => other,
        })?;
    Ok((row, attempt))
}

async fn view_of(pool: &SqlitePool, row: AttemptQuestionRow) -> Result<AttemptQuestionView, AppError> {
    build_views(pool, vec![row])
        .await?
        .pop()
        .ok_or_else(|| AppError::NotFound("Attempt question not found".to_string()))
}

/// Lists attempt questions in order, optionally for one attempt.
pub async fn list_attempt_questions(
    State(pool): State<SqlitePool>,
    current: CurrentUser,
    Query(params): Query<AttemptQuestionListParams>,
) -> Result<impl IntoResponse, AppError> {
    let mut query = QueryBuilder::<Sqlite>::new(ATTEMPT_QUESTION_SELECT);
    query.push(" JOIN attempts a ON a.id = aq.attempt_id WHERE 1 = 1");

    if !current.is_teacher() {
        query.push(" AND a.student_id = ").push_bind(current.id);
    }
    if let Some(attempt) = params.attempt {
        query.push(" AND aq.attempt_id = ").push_bind(attempt);
    }
    query.push(" ORDER BY aq.attempt_id, aq.position");

    let rows: Vec<AttemptQuestionRow> = query.build_query_as().fetch_all(&pool).await?;
    Ok(Json(build_views(&pool, rows).await?))
}

pub async fn get_attempt_question(
    State(pool): State<SqlitePool>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let (row, _) = visible_attempt_question(&pool, &current, id).await?;
    Ok(Json(view_of(&pool, row).await?))
}

/// Stores the owner's selection for one attempt question and grades it.
pub async fn submit_answer(
    State(pool): State<SqlitePool>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (row, attempt) = visible_attempt_question(&pool, &current, id).await?;

    if attempt.student != current.id {
        return Err(AppError::Forbidden(
            "Only the owner of the attempt can answer.".to_string(),
        ));
    }
    let now = Utc::now();
    if now > attempt.expires_at {
        return Err(AppError::BadRequest(
            "Attempt time limit has expired.".to_string(),
        ));
    }

    let question = fetch_question(&pool, row.question_id).await?;
    let available: Vec<i64> = question.choices.iter().map(|c| c.id).collect();
    let correct: Vec<i64> = question
        .choices
        .iter()
        .filter(|c| c.is_correct)
        .map(|c| c.id)
        .collect();

    validate_selection(question.question_type, &payload.selected_choices, &available)?;
    let selected: BTreeSet<i64> = payload.selected_choices.iter().copied().collect();
    let selected: Vec<i64> = selected.into_iter().collect();
    let is_correct = is_answer_correct(&selected, &correct);

    let mut tx = pool.begin().await?;

    // Takes the write lock first, so a concurrent finish cannot slip in between.
    lock_in_progress(&mut tx, attempt.id).await?;

    sqlx::query("INSERT INTO answers (attempt_question_id) VALUES (?) ON CONFLICT (attempt_question_id) DO NOTHING")
        .bind(row.id)
        .execute(&mut *tx)
        .await?;
    let answer_id: i64 = sqlx::query_scalar("SELECT id FROM answers WHERE attempt_question_id = ?")
        .bind(row.id)
        .fetch_one(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM answer_choices WHERE answer_id = ?")
        .bind(answer_id)
        .execute(&mut *tx)
        .await?;
    for choice_id in &selected {
        sqlx::query("INSERT INTO answer_choices (answer_id, choice_id) VALUES (?, ?)")
            .bind(answer_id)
            .bind(choice_id)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query("UPDATE answers SET answered_at = ?, is_correct = ? WHERE id = ?")
        .bind(now)
        .bind(is_correct)
        .bind(answer_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(
        "User {} answered attempt question {} (correct: {})",
        current.id,
        row.id,
        is_correct
    );
    Ok(Json(view_of(&pool, row).await?))
}
