// src/db.rs

use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::{config::Config, error::AppError, utils::hash::hash_password};

/// Opens the connection pool, creating the database file when it does not exist yet.
/// Retries a few times so the service tolerates a slow volume mount on startup.
pub async fn connect(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let mut retry_count = 0;
    loop {
        match SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect_with(options.clone())
            .await
        {
            Ok(pool) => return Ok(pool),
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    return Err(e);
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
}

/// Applies the embedded migrations from `./migrations`.
pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Creates a teacher account (user + teacher profile) unless the username is taken.
/// Returns the user id of the existing or newly created account.
pub async fn ensure_teacher_account(
    pool: &SqlitePool,
    username: &str,
    password: &str,
) -> Result<i64, AppError> {
    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;

    if let Some(id) = existing {
        return Ok(id);
    }

    tracing::info!("Seeding teacher account: {}", username);
    let hashed_password = hash_password(password)?;

    let mut tx = pool.begin().await?;
    let user_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO users (username, password, role, date_joined)
        VALUES (?, ?, 'teacher', ?)
        RETURNING id
        "#,
    )
    .bind(username)
    .bind(&hashed_password)
    .bind(Utc::now())
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("INSERT INTO teachers (user_id) VALUES (?)")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!("Teacher account created successfully.");
    Ok(user_id)
}

/// Seeds the bootstrap teacher when `ADMIN_USERNAME` and `ADMIN_PASSWORD` are configured.
pub async fn seed_admin_user(pool: &SqlitePool, config: &Config) -> Result<(), AppError> {
    if let (Some(username), Some(password)) = (&config.admin_username, &config.admin_password) {
        ensure_teacher_account(pool, username, password).await?;
    }
    Ok(())
}
