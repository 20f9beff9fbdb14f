// src/utils/extract.rs

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{error::AppError, models::user::Role, utils::jwt::Claims};

/// The authenticated caller, read from the `Claims` injected by `auth_middleware`.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser {
    pub id: i64,
    pub role: Role,
}

impl CurrentUser {
    pub fn is_teacher(&self) -> bool {
        self.role == Role::Teacher
    }

    /// Rejects non-teachers with 403.
    pub fn require_teacher(&self) -> Result<(), AppError> {
        if self.is_teacher() {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "Only teachers can perform this action.".to_string(),
            ))
        }
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts.extensions.get::<Claims>().ok_or_else(|| {
            AppError::AuthError("Authentication credentials were not provided".to_string())
        })?;

        Ok(CurrentUser {
            id: claims.user_id()?,
            role: claims.role,
        })
    }
}
