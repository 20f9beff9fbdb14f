// tests/common/mod.rs

#![allow(dead_code)]

use learning_platform::{config::Config, db, routes, state::AppState};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{Value, json};
use sqlx::SqlitePool;

pub const TEACHER_USERNAME: &str = "head_teacher";
pub const PASSWORD: &str = "password123";

pub struct TestApp {
    pub address: String,
    pub pool: SqlitePool,
    pub client: Client,
    /// Token of the seeded teacher account.
    pub token: String,
}

/// Spawns the app on a random port, backed by a fresh SQLite file.
pub async fn spawn_app() -> TestApp {
    let path = std::env::temp_dir().join(format!(
        "learning_platform_test_{}.db",
        uuid::Uuid::new_v4()
    ));
    let database_url = format!("sqlite://{}", path.display());

    let pool = db::connect(&database_url)
        .await
        .expect("Failed to open test database");
    db::migrate(&pool).await.expect("Failed to migrate database");
    db::ensure_teacher_account(&pool, TEACHER_USERNAME, PASSWORD)
        .await
        .expect("Failed to seed teacher");

    let config = Config {
        database_url,
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        log_dir: "logs".to_string(),
        admin_username: None,
        admin_password: None,
        attempt_question_limit: 10,
        attempt_time_limit_secs: 1800,
    };

    let state = AppState {
        pool: pool.clone(),
        config,
    };
    let app = routes::create_router(state);

    // Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = Client::new();
    let token = login(&client, &address, TEACHER_USERNAME, PASSWORD).await;

    TestApp {
        address,
        pool,
        client,
        token,
    }
}

pub async fn login(client: &Client, address: &str, username: &str, password: &str) -> String {
    let body: Value = client
        .post(format!("{}/api/auth/login", address))
        .json(&json!({ "username": username, "password": password }))
        .send()
        .await
        .expect("Failed to execute request")
        .json()
        .await
        .expect("Login response is not JSON");

    body["token"]
        .as_str()
        .unwrap_or_else(|| panic!("login failed for {}: {}", username, body))
        .to_string()
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.address, path)
    }

    pub fn get(&self, token: &str, path: &str) -> RequestBuilder {
        self.client.get(self.url(path)).bearer_auth(token)
    }

    pub fn post(&self, token: &str, path: &str, body: Value) -> RequestBuilder {
        self.client.post(self.url(path)).bearer_auth(token).json(&body)
    }

    pub fn put(&self, token: &str, path: &str, body: Value) -> RequestBuilder {
        self.client.put(self.url(path)).bearer_auth(token).json(&body)
    }

    pub fn patch(&self, token: &str, path: &str, body: Value) -> RequestBuilder {
        self.client.patch(self.url(path)).bearer_auth(token).json(&body)
    }

    pub fn delete(&self, token: &str, path: &str) -> RequestBuilder {
        self.client.delete(self.url(path)).bearer_auth(token)
    }

    /// Creates an account through the API and returns `(user, token)`.
    pub async fn create_account(&self, username: &str, role: &str) -> (Value, String) {
        let response = self
            .post(
                &self.token,
                "/user",
                json!({ "username": username, "password": PASSWORD, "role": role }),
            )
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 201, "create {}", username);

        let user: Value = response.json().await.unwrap();
        let token = login(&self.client, &self.address, username, PASSWORD).await;
        (user, token)
    }

    pub async fn create_subject(&self, name: &str) -> i64 {
        let body = expect_json(
            self.post(&self.token, "/subject", json!({ "name": name })),
            201,
        )
        .await;
        body["id"].as_i64().unwrap()
    }

    pub async fn create_topic(&self, subject: i64, title: &str) -> i64 {
        let body = expect_json(
            self.post(&self.token, "/topic", json!({ "subject": subject, "title": title })),
            201,
        )
        .await;
        body["id"].as_i64().unwrap()
    }

    /// Creates a single-choice question whose first choice is the correct one.
    pub async fn create_question(&self, topic: i64, text: &str) -> Value {
        expect_json(
            self.post(
                &self.token,
                "/question",
                json!({
                    "topic": topic,
                    "text": text,
                    "question_type": "single_choice",
                    "choices": [
                        { "text": "Right", "is_correct": true },
                        { "text": "Wrong", "is_correct": false }
                    ]
                }),
            ),
            201,
        )
        .await
    }

    pub async fn create_group(&self, name: &str) -> i64 {
        let body = expect_json(
            self.post(&self.token, "/group", json!({ "name": name })),
            201,
        )
        .await;
        body["id"].as_i64().unwrap()
    }
}

/// Sends the request, asserts the status and returns the JSON body.
pub async fn expect_json(request: RequestBuilder, status: u16) -> Value {
    let response: Response = request.send().await.expect("Failed to execute request");
    let actual = response.status().as_u16();
    let body: Value = response.json().await.unwrap_or(Value::Null);
    assert_eq!(actual, status, "unexpected status, body: {}", body);
    body
}

/// Sends the request and returns only the status code.
pub async fn status_of(request: RequestBuilder) -> u16 {
    request
        .send()
        .await
        .expect("Failed to execute request")
        .status()
        .as_u16()
}
