// src/handlers/users.rs

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
    error::{AppError, is_unique_violation},
    models::user::{
        CreateUserRequest, Role, USER_SELECT, UpdateUserRequest, User, UserListParams,
    },
    utils::{
        extract::CurrentUser,
        hash::hash_password,
        query::{contains_pattern, order_by},
    },
};

const ORDERING: &[(&str, &str)] = &[
    ("username", "u.username"),
    ("date_joined", "u.date_joined"),
    ("id", "u.id"),
];

pub(crate) async fn fetch_user(pool: &SqlitePool, id: i64) -> Result<User, AppError> {
    sqlx::query_as::<_, User>(&format!("{} WHERE u.id = ?", USER_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

fn duplicate_username(e: sqlx::Error, username: &str) -> AppError {
    if is_unique_violation(&e) {
        AppError::field(
            "username",
            format!("A user with username '{}' already exists.", username),
        )
    } else {
        tracing::error!("Failed to save user: {:?}", e);
        AppError::from(e)
    }
}

/// Lists users, filtered by username/email (contains), role and activity.
pub async fn list_users(
    State(pool): State<SqlitePool>,
    Query(params): Query<UserListParams>,
) -> Result<impl IntoResponse, AppError> {
    let mut query = QueryBuilder::<Sqlite>::new(USER_SELECT);
    query.push(" WHERE 1 = 1");

    if let Some(username) = params.username.as_deref().filter(|s| !s.is_empty()) {
        query
            .push(" AND u.username LIKE ")
            .push_bind(contains_pattern(username))
            .push(" ESCAPE '\\'");
    }
    if let Some(email) = params.email.as_deref().filter(|s| !s.is_empty()) {
        query
            .push(" AND u.email LIKE ")
            .push_bind(contains_pattern(email))
            .push(" ESCAPE '\\'");
    }
    if let Some(role) = params.role {
        query.push(" AND u.role = ").push_bind(role.as_str());
    }
    if let Some(is_active) = params.is_active {
        query.push(" AND u.is_active = ").push_bind(is_active);
    }

    query
        .push(" ORDER BY ")
        .push(order_by(params.ordering.as_deref(), ORDERING, "username"));

    let users: Vec<User> = query.build_query_as().fetch_all(&pool).await?;
    Ok(Json(users))
}

/// Creates a user together with the profile matching its role.
///
/// The password is hashed with Argon2 and never echoed back.
pub async fn create_user(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let hashed_password = hash_password(&payload.password)?;

    let mut tx = pool.begin().await?;

    let user_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO users (username, password, email, first_name, last_name, role, is_active, date_joined)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&payload.username)
    .bind(&hashed_password)
    .bind(payload.email.as_deref().unwrap_or(""))
    .bind(payload.first_name.as_deref().unwrap_or(""))
    .bind(payload.last_name.as_deref().unwrap_or(""))
    .bind(payload.role.as_str())
    .bind(payload.is_active.unwrap_or(true))
    .bind(Utc::now())
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| duplicate_username(e, &payload.username))?;

    let profile_sql = match payload.role {
        Role::Student => "INSERT INTO students (user_id) VALUES (?)",
        Role::Teacher => "INSERT INTO teachers (user_id) VALUES (?)",
    };
    sqlx::query(profile_sql)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(
        "Created {} account '{}' (id {})",
        payload.role.as_str(),
        payload.username,
        user_id
    );

    let user = fetch_user(&pool, user_id).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn get_user(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(fetch_user(&pool, id).await?))
}

/// Updates account fields. The role is fixed once the user exists.
pub async fn update_user(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let existing = fetch_user(&pool, id).await?;

    if let Some(role) = payload.role {
        if role != existing.role {
            return Err(AppError::field(
                "role",
                "Role cannot be changed after the user is created.",
            ));
        }
    }

    let password = match &payload.password {
        Some(plain) => Some(hash_password(plain)?),
        None => None,
    };

    let username = payload.username.clone().unwrap_or(existing.username);
    sqlx::query(
        r#"
        UPDATE users SET
            username = ?,
            password = COALESCE(?, password),
            email = COALESCE(?, email),
            first_name = COALESCE(?, first_name),
            last_name = COALESCE(?, last_name),
            is_active = COALESCE(?, is_active)
        WHERE id = ?
        "#,
    )
    .bind(&username)
    .bind(password)
    .bind(&payload.email)
    .bind(&payload.first_name)
    .bind(&payload.last_name)
    .bind(payload.is_active)
    .bind(id)
    .execute(&pool)
    .await
    .map_err(|e| duplicate_username(e, &username))?;

    Ok(Json(fetch_user(&pool, id).await?))
}

/// Deletes a user by ID; the profile and its links cascade.
/// Callers cannot delete themselves.
pub async fn delete_user(
    State(pool): State<SqlitePool>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if id == current.id {
        return Err(AppError::BadRequest("Cannot delete yourself".to_string()));
    }

    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            if crate::error::is_foreign_key_violation(&e) {
                AppError::Conflict("User is still referenced and cannot be deleted".to_string())
            } else {
                tracing::error!("Failed to delete user: {:?}", e);
                AppError::from(e)
            }
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    tracing::info!("Deleted user {}", id);
    Ok(StatusCode::NO_CONTENT)
}
