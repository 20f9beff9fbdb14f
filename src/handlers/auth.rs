// src/handlers/auth.rs

use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    handlers::users::fetch_user,
    models::user::{LoginRequest, USER_SELECT, User},
    utils::{extract::CurrentUser, hash::verify_password, jwt::sign_jwt},
};

/// Authenticates a user and returns a JWT token.
///
/// Verifies the username and password against the database.
/// Inactive accounts cannot log in.
pub async fn login(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let user = sqlx::query_as::<_, User>(&format!("{} WHERE u.username = ?", USER_SELECT))
        .bind(&payload.username)
        .fetch_optional(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Login DB error: {:?}", e);
            AppError::from(e)
        })?
        .ok_or_else(|| AppError::AuthError("Invalid username or password".to_string()))?;

    if !verify_password(&payload.password, &user.password)? {
        return Err(AppError::AuthError("Invalid username or password".to_string()));
    }

    if !user.is_active {
        return Err(AppError::AuthError("User account is disabled".to_string()));
    }

    let token = sign_jwt(user.id, user.role, &config.jwt_secret, config.jwt_expiration)?;

    tracing::info!("User {} logged in", user.username);

    Ok(Json(json!({
        "token": token,
        "type": "Bearer",
        "role": user.role,
    })))
}

/// Returns the authenticated caller's account.
pub async fn me(
    State(pool): State<SqlitePool>,
    current: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(fetch_user(&pool, current.id).await?))
}
