// tests/catalog_tests.rs

mod common;

use common::{expect_json, spawn_app, status_of};
use serde_json::json;

const OLD_TIMESTAMP: &str = "2000-01-01T00:00:00+00:00";

async fn age_topic(pool: &sqlx::SqlitePool, topic: i64) {
    sqlx::query("UPDATE topics SET updated_at = ? WHERE id = ?")
        .bind(OLD_TIMESTAMP)
        .bind(topic)
        .execute(pool)
        .await
        .unwrap();
}

async fn topic_updated_at(app: &common::TestApp, topic: i64) -> String {
    let body = expect_json(app.get(&app.token, &format!("/topic/{}", topic)), 200).await;
    body["updated_at"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn subject_description_is_stripped_of_html() {
    let app = spawn_app().await;

    let body = expect_json(
        app.post(
            &app.token,
            "/subject",
            json!({ "name": "Chemistry", "description": "<b>Bonds</b><script>alert(1)</script>" }),
        ),
        201,
    )
    .await;

    assert_eq!(body["description"], "Bonds");
    assert_eq!(body["is_active"], true);
}

#[tokio::test]
async fn topic_title_is_unique_per_subject_only() {
    let app = spawn_app().await;
    let math = app.create_subject("Math").await;
    let physics = app.create_subject("Physics").await;
    app.create_topic(math, "Vectors").await;

    let body = expect_json(
        app.post(&app.token, "/topic", json!({ "subject": math, "title": "Vectors" })),
        400,
    )
    .await;
    assert_eq!(
        body["fields"]["title"][0],
        "Topic with this title already exists in the subject."
    );

    let body = expect_json(
        app.post(&app.token, "/topic", json!({ "subject": physics, "title": "Vectors" })),
        201,
    )
    .await;
    assert_eq!(body["subject_name"], "Physics");
}

#[tokio::test]
async fn subject_with_topics_cannot_be_deleted() {
    let app = spawn_app().await;
    let subject = app.create_subject("Biology").await;
    app.create_topic(subject, "Cells").await;

    let status = status_of(app.delete(&app.token, &format!("/subject/{}", subject))).await;
    assert_eq!(status, 409);
}

#[tokio::test]
async fn creating_a_question_touches_its_topic() {
    let app = spawn_app().await;
    let subject = app.create_subject("Math").await;
    let topic = app.create_topic(subject, "Fractions").await;
    age_topic(&app.pool, topic).await;

    let question = app.create_question(topic, "1/2 + 1/2 = ?").await;

    assert_eq!(question["question_type"], "single_choice");
    assert_eq!(question["choices"][0]["order"], 1);
    assert_eq!(question["choices"][1]["order"], 2);
    assert_ne!(topic_updated_at(&app, topic).await, OLD_TIMESTAMP);
}

#[tokio::test]
async fn deleting_a_question_touches_its_topic() {
    let app = spawn_app().await;
    let subject = app.create_subject("Math").await;
    let topic = app.create_topic(subject, "Decimals").await;
    let question = app.create_question(topic, "0.1 + 0.2 = ?").await;
    age_topic(&app.pool, topic).await;

    let status = status_of(app.delete(&app.token, &format!("/question/{}", question["id"]))).await;
    assert_eq!(status, 204);
    assert_ne!(topic_updated_at(&app, topic).await, OLD_TIMESTAMP);
}

#[tokio::test]
async fn question_requires_valid_choices() {
    let app = spawn_app().await;
    let subject = app.create_subject("Math").await;
    let topic = app.create_topic(subject, "Primes").await;

    let cases = [
        (json!(null), "This field is required."),
        (
            json!([{ "text": "Only", "is_correct": true }]),
            "At least two answer choices are required.",
        ),
        (
            json!([{ "text": "  ", "is_correct": true }, { "text": "B" }]),
            "Choice #1 must have non-empty text.",
        ),
        (
            json!([{ "text": "2", "is_correct": true }, { "text": "3", "is_correct": true }]),
            "Single choice question must have exactly one correct choice.",
        ),
    ];

    for (choices, message) in cases {
        let mut payload = json!({
            "topic": topic,
            "text": "Which is prime?",
            "question_type": "single_choice",
        });
        if !choices.is_null() {
            payload["choices"] = choices;
        }

        let body = expect_json(app.post(&app.token, "/question", payload), 400).await;
        assert_eq!(body["fields"]["choices"][0], message);
    }
}

#[tokio::test]
async fn multiple_choice_is_the_default_type() {
    let app = spawn_app().await;
    let subject = app.create_subject("Math").await;
    let topic = app.create_topic(subject, "Even numbers").await;

    let body = expect_json(
        app.post(
            &app.token,
            "/question",
            json!({
                "topic": topic,
                "text": "Which are even?",
                "choices": [
                    { "text": "2", "is_correct": true },
                    { "text": "4", "is_correct": true },
                    { "text": "5" }
                ]
            }),
        ),
        201,
    )
    .await;
    assert_eq!(body["question_type"], "multiple_choice");

    // Switching to single choice with two correct answers is refused.
    let body = expect_json(
        app.patch(
            &app.token,
            &format!("/question/{}", body["id"]),
            json!({ "question_type": "single_choice" }),
        ),
        400,
    )
    .await;
    assert!(body["fields"]["choices"].is_array());
}

#[tokio::test]
async fn updating_choices_replaces_the_set() {
    let app = spawn_app().await;
    let subject = app.create_subject("Geo").await;
    let topic = app.create_topic(subject, "Capitals").await;
    let question = app.create_question(topic, "Capital of France?").await;

    let body = expect_json(
        app.put(
            &app.token,
            &format!("/question/{}", question["id"]),
            json!({
                "choices": [
                    { "text": "Paris", "is_correct": true, "order": 3 },
                    { "text": "Lyon" },
                    { "text": "Nice" }
                ]
            }),
        ),
        200,
    )
    .await;

    let choices = body["choices"].as_array().unwrap();
    assert_eq!(choices.len(), 3);
    assert_eq!(choices[0]["text"], "Lyon");
    assert_eq!(choices[2]["text"], "Paris");
    assert_eq!(body["text"], "Capital of France?");
}

#[tokio::test]
async fn questions_filter_by_topic() {
    let app = spawn_app().await;
    let subject = app.create_subject("Art").await;
    let colors = app.create_topic(subject, "Colors").await;
    let shapes = app.create_topic(subject, "Shapes").await;
    app.create_question(colors, "Primary color?").await;
    app.create_question(shapes, "Three sides?").await;

    let body = expect_json(app.get(&app.token, &format!("/question?topic={}", colors)), 200).await;
    let questions = body.as_array().unwrap();
    assert_eq!(questions.len(), 1);
    assert_eq!(questions[0]["text"], "Primary color?");
}

#[tokio::test]
async fn question_and_topic_used_by_an_attempt_cannot_be_deleted() {
    let app = spawn_app().await;
    let (_, student_token) = app.create_account("vera", "student").await;
    let subject = app.create_subject("Math").await;
    let topic = app.create_topic(subject, "Percentages").await;
    let question = app.create_question(topic, "10% of 50?").await;

    expect_json(
        app.post(&student_token, "/attempt", json!({ "topic": topic })),
        201,
    )
    .await;

    let body = expect_json(
        app.delete(&app.token, &format!("/question/{}", question["id"])),
        409,
    )
    .await;
    assert!(body["error"].as_str().unwrap().contains("attempts"));

    let status = status_of(app.delete(&app.token, &format!("/topic/{}", topic))).await;
    assert_eq!(status, 409);

    // Nothing was removed.
    expect_json(app.get(&app.token, &format!("/question/{}", question["id"])), 200).await;
    expect_json(app.get(&app.token, &format!("/topic/{}", topic)), 200).await;
}

#[tokio::test]
async fn moving_a_topic_detaches_it_from_assignments_of_the_old_subject() {
    let app = spawn_app().await;
    let math = app.create_subject("Math").await;
    let physics = app.create_subject("Physics").await;
    let algebra = app.create_topic(math, "Algebra").await;
    let group = app.create_group("Zeta").await;
    let path = format!("/group/{}/teacher-assignment", group);

    expect_json(
        app.put(&app.token, &path, json!({ "subject": math, "topic": algebra })),
        201,
    )
    .await;

    let body = expect_json(
        app.patch(&app.token, &format!("/topic/{}", algebra), json!({ "subject": physics })),
        200,
    )
    .await;
    assert_eq!(body["subject"], physics);

    let assignment = expect_json(app.get(&app.token, &path), 200).await;
    assert_eq!(assignment["subject"], math);
    assert!(assignment["topic"].is_null());
}
