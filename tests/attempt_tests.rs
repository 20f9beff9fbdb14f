// tests/attempt_tests.rs

mod common;

use common::{TestApp, expect_json, spawn_app, status_of};
use serde_json::{Value, json};

/// A topic with two single-choice questions. Returns the topic id.
async fn quiz_topic(app: &TestApp) -> i64 {
    let subject = app.create_subject("Math").await;
    let topic = app.create_topic(subject, "Arithmetic").await;
    app.create_question(topic, "2 + 2 = ?").await;
    app.create_question(topic, "3 * 3 = ?").await;
    topic
}

/// Choice ids of an attempt question view, split into (right, wrong) by text.
async fn choices_of(app: &TestApp, attempt_question: &Value) -> (i64, i64) {
    let question = expect_json(
        app.get(&app.token, &format!("/question/{}", attempt_question["question"]["id"])),
        200,
    )
    .await;
    let pick = |correct: bool| {
        question["choices"]
            .as_array()
            .unwrap()
            .iter()
            .find(|c| c["is_correct"] == correct)
            .unwrap()["id"]
            .as_i64()
            .unwrap()
    };
    (pick(true), pick(false))
}

#[tokio::test]
async fn student_takes_and_completes_an_attempt() {
    let app = spawn_app().await;
    let (_, token) = app.create_account("nina", "student").await;
    let topic = quiz_topic(&app).await;

    let attempt = expect_json(app.post(&token, "/attempt", json!({ "topic": topic })), 201).await;
    assert_eq!(attempt["status"], "in_progress");
    assert_eq!(attempt["question_count"], 2);
    assert_eq!(attempt["correct_count"], 0);
    assert_eq!(attempt["topic_title"], "Arithmetic");

    let questions = expect_json(
        app.get(&token, &format!("/attempt_question?attempt={}", attempt["id"])),
        200,
    )
    .await;
    let questions = questions.as_array().unwrap().clone();
    assert_eq!(questions.len(), 2);
    assert_eq!(questions[0]["order"], 1);
    assert_eq!(questions[1]["order"], 2);
    // Correctness is never exposed to the student.
    assert!(questions[0]["question"]["choices"][0].get("is_correct").is_none());
    assert!(questions[0]["answer"]["answered_at"].is_null());

    let (right, _) = choices_of(&app, &questions[0]).await;
    let view = expect_json(
        app.put(
            &token,
            &format!("/attempt_question/{}/answer", questions[0]["id"]),
            json!({ "selected_choices": [right] }),
        ),
        200,
    )
    .await;
    assert_eq!(view["answer"]["selected_choices"], json!([right]));
    assert_eq!(view["answer"]["is_correct"], true);

    let attempt = expect_json(
        app.patch(
            &token,
            &format!("/attempt/{}", attempt["id"]),
            json!({ "status": "completed" }),
        ),
        200,
    )
    .await;
    assert_eq!(attempt["status"], "completed");
    assert_eq!(attempt["correct_count"], 1);
    assert!(attempt["finished_at"].is_string());

    // The unanswered question was graded as incorrect.
    let answers = expect_json(
        app.get(&token, &format!("/answer?attempt={}&is_correct=false", attempt["id"])),
        200,
    )
    .await;
    assert_eq!(answers.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn wrong_or_foreign_choices_are_handled() {
    let app = spawn_app().await;
    let (_, token) = app.create_account("oscar", "student").await;
    let topic = quiz_topic(&app).await;

    let attempt = expect_json(app.post(&token, "/attempt", json!({ "topic": topic })), 201).await;
    let questions = expect_json(
        app.get(&token, &format!("/attempt_question?attempt={}", attempt["id"])),
        200,
    )
    .await;
    let first = &questions[0];
    let (right, wrong) = choices_of(&app, first).await;
    let (other_right, _) = choices_of(&app, &questions[1]).await;
    let path = format!("/attempt_question/{}/answer", first["id"]);

    let body = expect_json(app.put(&token, &path, json!({ "selected_choices": [other_right] })), 400).await;
    assert!(body["fields"]["selected_choices"].is_array());

    let body = expect_json(app.put(&token, &path, json!({ "selected_choices": [right, wrong] })), 400).await;
    assert!(body["fields"]["selected_choices"].is_array());

    let view = expect_json(app.put(&token, &path, json!({ "selected_choices": [wrong] })), 200).await;
    assert_eq!(view["answer"]["is_correct"], false);

    // Answering again replaces the selection.
    let view = expect_json(app.put(&token, &path, json!({ "selected_choices": [right] })), 200).await;
    assert_eq!(view["answer"]["selected_choices"], json!([right]));
    assert_eq!(view["answer"]["is_correct"], true);
}

#[tokio::test]
async fn finished_attempt_is_locked() {
    let app = spawn_app().await;
    let (_, token) = app.create_account("paula", "student").await;
    let topic = quiz_topic(&app).await;

    let attempt = expect_json(app.post(&token, "/attempt", json!({ "topic": topic })), 201).await;
    expect_json(
        app.patch(&token, &format!("/attempt/{}", attempt["id"]), json!({ "status": "abandoned" })),
        200,
    )
    .await;

    let questions = expect_json(
        app.get(&token, &format!("/attempt_question?attempt={}", attempt["id"])),
        200,
    )
    .await;
    let status = status_of(app.put(
        &token,
        &format!("/attempt_question/{}/answer", questions[0]["id"]),
        json!({ "selected_choices": [] }),
    ))
    .await;
    assert_eq!(status, 400);

    let status = status_of(app.patch(
        &token,
        &format!("/attempt/{}", attempt["id"]),
        json!({ "status": "completed" }),
    ))
    .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn expired_attempt_refuses_answers() {
    let app = spawn_app().await;
    let (_, token) = app.create_account("quinn", "student").await;
    let topic = quiz_topic(&app).await;

    let attempt = expect_json(app.post(&token, "/attempt", json!({ "topic": topic })), 201).await;
    sqlx::query("UPDATE attempts SET expires_at = '2000-01-01T00:00:00+00:00' WHERE id = ?")
        .bind(attempt["id"].as_i64().unwrap())
        .execute(&app.pool)
        .await
        .unwrap();

    let questions = expect_json(
        app.get(&token, &format!("/attempt_question?attempt={}", attempt["id"])),
        200,
    )
    .await;
    let body = expect_json(
        app.put(
            &token,
            &format!("/attempt_question/{}/answer", questions[0]["id"]),
            json!({ "selected_choices": [] }),
        ),
        400,
    )
    .await;
    assert_eq!(body["error"], "Attempt time limit has expired.");
}

#[tokio::test]
async fn students_only_see_their_own_attempts() {
    let app = spawn_app().await;
    let (_, rita) = app.create_account("rita", "student").await;
    let (_, sam) = app.create_account("sam", "student").await;
    let topic = quiz_topic(&app).await;

    let attempt = expect_json(app.post(&rita, "/attempt", json!({ "topic": topic })), 201).await;

    let body = expect_json(app.get(&sam, "/attempt"), 200).await;
    assert_eq!(body, json!([]));
    let status = status_of(app.get(&sam, &format!("/attempt/{}", attempt["id"]))).await;
    assert_eq!(status, 404);

    let questions = expect_json(
        app.get(&rita, &format!("/attempt_question?attempt={}", attempt["id"])),
        200,
    )
    .await;
    let status = status_of(app.put(
        &sam,
        &format!("/attempt_question/{}/answer", questions[0]["id"]),
        json!({ "selected_choices": [] }),
    ))
    .await;
    assert_eq!(status, 404);

    // Teachers see everything but cannot answer for the student.
    let body = expect_json(app.get(&app.token, "/attempt"), 200).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    let status = status_of(app.put(
        &app.token,
        &format!("/attempt_question/{}/answer", questions[0]["id"]),
        json!({ "selected_choices": [] }),
    ))
    .await;
    assert_eq!(status, 403);

    let status = status_of(app.delete(&rita, &format!("/attempt/{}", attempt["id"]))).await;
    assert_eq!(status, 403);
    let status = status_of(app.delete(&app.token, &format!("/attempt/{}", attempt["id"]))).await;
    assert_eq!(status, 204);
}

#[tokio::test]
async fn teacher_starts_attempt_for_student_and_reviews_answer() {
    let app = spawn_app().await;
    let (student, token) = app.create_account("tina", "student").await;
    let topic = quiz_topic(&app).await;

    let body = expect_json(app.post(&app.token, "/attempt", json!({ "topic": topic })), 400).await;
    assert!(body["fields"]["student"].is_array());

    let attempt = expect_json(
        app.post(&app.token, "/attempt", json!({ "topic": topic, "student": student["id"] })),
        201,
    )
    .await;
    assert_eq!(attempt["student"], student["id"]);

    let answers = expect_json(app.get(&token, &format!("/answer?attempt={}", attempt["id"])), 200).await;
    let answer_id = answers[0]["id"].clone();

    let status = status_of(app.patch(
        &token,
        &format!("/answer/{}", answer_id),
        json!({ "teacher_comment": "self review" }),
    ))
    .await;
    assert_eq!(status, 403);

    let body = expect_json(
        app.patch(
            &app.token,
            &format!("/answer/{}", answer_id),
            json!({ "teacher_comment": "<i>Good try</i>", "is_correct": true }),
        ),
        200,
    )
    .await;
    assert_eq!(body["teacher_comment"], "Good try");
    assert_eq!(body["is_correct"], true);
}

#[tokio::test]
async fn topic_without_questions_cannot_be_attempted() {
    let app = spawn_app().await;
    let (_, token) = app.create_account("uma", "student").await;
    let subject = app.create_subject("Music").await;
    let topic = app.create_topic(subject, "Scales").await;

    let body = expect_json(app.post(&token, "/attempt", json!({ "topic": topic })), 400).await;
    assert_eq!(body["error"], "Topic has no active questions.");
}

#[tokio::test]
async fn answer_is_refused_once_attempt_was_finished_elsewhere() {
    let app = spawn_app().await;
    let (_, token) = app.create_account("wade", "student").await;
    let topic = quiz_topic(&app).await;

    let attempt = expect_json(app.post(&token, "/attempt", json!({ "topic": topic })), 201).await;
    let questions = expect_json(
        app.get(&token, &format!("/attempt_question?attempt={}", attempt["id"])),
        200,
    )
    .await;
    let (right, _) = choices_of(&app, &questions[0]).await;

    // Finished by another request after this one loaded the attempt.
    sqlx::query("UPDATE attempts SET status = 'completed' WHERE id = ?")
        .bind(attempt["id"].as_i64().unwrap())
        .execute(&app.pool)
        .await
        .unwrap();

    let body = expect_json(
        app.put(
            &token,
            &format!("/attempt_question/{}/answer", questions[0]["id"]),
            json!({ "selected_choices": [right] }),
        ),
        400,
    )
    .await;
    assert_eq!(body["error"], "Attempt is not in progress.");

    let answers = expect_json(
        app.get(&token, &format!("/answer?attempt_question={}", questions[0]["id"])),
        200,
    )
    .await;
    assert!(answers[0]["answered_at"].is_null());
    assert_eq!(answers[0]["selected_choices"], json!([]));
}
