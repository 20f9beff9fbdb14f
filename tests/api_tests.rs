// tests/api_tests.rs

mod common;

use common::{PASSWORD, TEACHER_USERNAME, expect_json, spawn_app, status_of};
use serde_json::json;

#[tokio::test]
async fn health_check_404() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(format!("{}/random_path_that_does_not_exist", app.address))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn login_returns_bearer_token() {
    let app = spawn_app().await;

    let body = expect_json(
        app.client
            .post(app.url("/auth/login"))
            .json(&json!({ "username": TEACHER_USERNAME, "password": PASSWORD })),
        200,
    )
    .await;

    assert_eq!(body["type"], "Bearer");
    assert_eq!(body["role"], "teacher");
    assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
}

#[tokio::test]
async fn login_rejects_wrong_password() {
    let app = spawn_app().await;

    let status = status_of(
        app.client
            .post(app.url("/auth/login"))
            .json(&json!({ "username": TEACHER_USERNAME, "password": "not-the-password" })),
    )
    .await;

    assert_eq!(status, 401);
}

#[tokio::test]
async fn disabled_account_cannot_log_in() {
    let app = spawn_app().await;
    let (user, _) = app.create_account("sleepy", "student").await;

    expect_json(
        app.patch(
            &app.token,
            &format!("/user/{}", user["id"]),
            json!({ "is_active": false }),
        ),
        200,
    )
    .await;

    let status = status_of(
        app.client
            .post(app.url("/auth/login"))
            .json(&json!({ "username": "sleepy", "password": PASSWORD })),
    )
    .await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn protected_routes_require_token() {
    let app = spawn_app().await;

    let status = status_of(app.client.get(app.url("/subject"))).await;
    assert_eq!(status, 401);

    let status = status_of(app.get("garbage.token.value", "/subject")).await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn me_returns_current_account() {
    let app = spawn_app().await;

    let body = expect_json(app.get(&app.token, "/auth/me"), 200).await;

    assert_eq!(body["username"], TEACHER_USERNAME);
    assert_eq!(body["role"], "teacher");
    assert!(body["teacher_id"].is_i64());
    assert!(body.get("password").is_none());
}

#[tokio::test]
async fn students_cannot_reach_teacher_routes() {
    let app = spawn_app().await;
    let (_, student_token) = app.create_account("learner", "student").await;

    let body = expect_json(app.get(&student_token, "/user"), 403).await;
    assert_eq!(body["error"], "Only teachers can perform this action.");

    assert_eq!(status_of(app.get(&student_token, "/question")).await, 403);
    assert_eq!(
        status_of(app.post(&student_token, "/subject", json!({ "name": "Nope" }))).await,
        403
    );
    // Reads stay open to every authenticated user.
    assert_eq!(status_of(app.get(&student_token, "/subject")).await, 200);
}

#[tokio::test]
async fn disabled_or_deleted_teacher_loses_access_immediately() {
    let app = spawn_app().await;
    let (disabled, disabled_token) = app.create_account("old_teacher", "teacher").await;
    let (deleted, deleted_token) = app.create_account("gone_teacher", "teacher").await;

    assert_eq!(status_of(app.get(&disabled_token, "/user")).await, 200);

    expect_json(
        app.patch(
            &app.token,
            &format!("/user/{}", disabled["id"]),
            json!({ "is_active": false }),
        ),
        200,
    )
    .await;
    let status = status_of(app.delete(&app.token, &format!("/user/{}", deleted["id"]))).await;
    assert_eq!(status, 204);

    let body = expect_json(app.get(&disabled_token, "/user"), 401).await;
    assert_eq!(body["error"], "User account is disabled");
    assert_eq!(status_of(app.get(&deleted_token, "/subject")).await, 401);
}
