// tests/account_tests.rs

mod common;

use common::{expect_json, spawn_app, status_of};
use serde_json::json;

#[tokio::test]
async fn creating_a_student_creates_its_profile() {
    let app = spawn_app().await;

    let (user, _) = app.create_account("alice", "student").await;

    assert_eq!(user["role"], "student");
    assert!(user["student_id"].is_i64());
    assert!(user["teacher_id"].is_null());

    let students = expect_json(app.get(&app.token, "/student?username=ali"), 200).await;
    let students = students.as_array().unwrap();
    assert_eq!(students.len(), 1);
    assert_eq!(students[0]["user"], user["id"]);
    assert_eq!(students[0]["groups"], json!([]));
}

#[tokio::test]
async fn create_user_validates_input() {
    let app = spawn_app().await;

    let body = expect_json(
        app.post(
            &app.token,
            "/user",
            json!({ "username": "yo", "password": "short" }),
        ),
        400,
    )
    .await;

    assert!(body["fields"]["username"].is_array());
    assert!(body["fields"]["password"].is_array());
}

#[tokio::test]
async fn duplicate_username_is_a_field_error() {
    let app = spawn_app().await;
    app.create_account("bob", "student").await;

    let body = expect_json(
        app.post(
            &app.token,
            "/user",
            json!({ "username": "bob", "password": "password123" }),
        ),
        400,
    )
    .await;

    assert!(body["fields"]["username"].is_array());
}

#[tokio::test]
async fn role_cannot_change_after_creation() {
    let app = spawn_app().await;
    let (user, _) = app.create_account("carol", "student").await;

    let body = expect_json(
        app.patch(
            &app.token,
            &format!("/user/{}", user["id"]),
            json!({ "role": "teacher" }),
        ),
        400,
    )
    .await;
    assert_eq!(
        body["fields"]["role"][0],
        "Role cannot be changed after the user is created."
    );

    // Sending the current role is fine.
    expect_json(
        app.patch(
            &app.token,
            &format!("/user/{}", user["id"]),
            json!({ "role": "student", "first_name": "Carol" }),
        ),
        200,
    )
    .await;
}

#[tokio::test]
async fn teacher_cannot_delete_itself() {
    let app = spawn_app().await;
    let me = expect_json(app.get(&app.token, "/auth/me"), 200).await;

    let status = status_of(app.delete(&app.token, &format!("/user/{}", me["id"]))).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn deleting_a_user_removes_its_profile() {
    let app = spawn_app().await;
    let (user, _) = app.create_account("dave", "student").await;
    let student_id = user["student_id"].as_i64().unwrap();

    let status = status_of(app.delete(&app.token, &format!("/user/{}", user["id"]))).await;
    assert_eq!(status, 204);

    let status = status_of(app.get(&app.token, &format!("/student/{}", student_id))).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn student_can_join_several_groups() {
    let app = spawn_app().await;
    let (user, _) = app.create_account("erin", "student").await;
    let student_id = user["student_id"].as_i64().unwrap();
    let first = app.create_group("Group A").await;
    let second = app.create_group("Group B").await;

    let body = expect_json(
        app.patch(
            &app.token,
            &format!("/student/{}", student_id),
            json!({ "groups": [first, second] }),
        ),
        200,
    )
    .await;
    assert_eq!(body["groups"], json!([first, second]));

    let group = expect_json(app.get(&app.token, &format!("/group/{}", first)), 200).await;
    assert_eq!(group["students"][0]["username"], "erin");
}

#[tokio::test]
async fn unknown_group_is_rejected_for_student() {
    let app = spawn_app().await;
    let (user, _) = app.create_account("frank", "student").await;

    let body = expect_json(
        app.patch(
            &app.token,
            &format!("/student/{}", user["student_id"]),
            json!({ "groups": [999] }),
        ),
        400,
    )
    .await;
    assert!(body["fields"]["groups"].is_array());
}

#[tokio::test]
async fn teacher_profile_tracks_topics_and_groups() {
    let app = spawn_app().await;
    let (user, _) = app.create_account("grace", "teacher").await;
    let teacher_id = user["teacher_id"].as_i64().unwrap();
    let subject = app.create_subject("Math").await;
    let topic = app.create_topic(subject, "Algebra").await;
    let group = app.create_group("Evening").await;

    let body = expect_json(
        app.patch(
            &app.token,
            &format!("/teacher/{}", teacher_id),
            json!({ "topics": [topic], "groups": [group] }),
        ),
        200,
    )
    .await;
    assert_eq!(body["topics"], json!([topic]));
    assert_eq!(body["groups"], json!([group]));

    let group = expect_json(app.get(&app.token, &format!("/group/{}", group)), 200).await;
    assert_eq!(group["teacher"], teacher_id);
}

#[tokio::test]
async fn me_assignments_lists_assignments_of_my_groups() {
    let app = spawn_app().await;
    let (user, student_token) = app.create_account("heidi", "student").await;
    let subject = app.create_subject("History").await;
    let topic = app.create_topic(subject, "Rome").await;
    let group = app.create_group("Morning").await;

    expect_json(
        app.post(
            &app.token,
            &format!("/group/{}/add-student", group),
            json!({ "user_id": user["id"] }),
        ),
        200,
    )
    .await;
    expect_json(
        app.put(
            &app.token,
            &format!("/group/{}/teacher-assignment", group),
            json!({ "subject": subject, "topic": topic }),
        ),
        201,
    )
    .await;

    let body = expect_json(app.get(&student_token, "/student/me-assignments"), 200).await;
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["group_name"], "Morning");
    assert_eq!(rows[0]["subject_name"], "History");
    assert_eq!(rows[0]["topic_title"], "Rome");

    // Teachers have no student profile.
    let body = expect_json(app.get(&app.token, "/student/me-assignments"), 403).await;
    assert_eq!(body["error"], "Only students can access this endpoint.");
}
