// tests/common/mod.rs

#![allow(dead_code)]

use exam_portal::{config::Config, db, handlers::auth::seed_admin_user, routes, state::AppState};
use serde_json::{Value, json};
use sqlx::SqlitePool;

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_PASSWORD: &str = "admin-password";

pub struct TestApp {
    pub address: String,
    pub pool: SqlitePool,
    pub client: reqwest::Client,
}

/// Spawns the app on a random port over a fresh in-memory database with a
/// seeded admin account.
pub async fn spawn_app() -> TestApp {
    let mut config = Config::for_database("sqlite::memory:", "test_secret_for_integration_tests");
    config.admin_email = Some(ADMIN_EMAIL.to_string());
    config.admin_password = Some(ADMIN_PASSWORD.to_string());

    let pool = db::connect(&config.database_url)
        .await
        .expect("Failed to open in-memory database");
    db::migrate(&pool).await.expect("Failed to migrate database");
    seed_admin_user(&pool, &config)
        .await
        .expect("Failed to seed admin user");

    let state = AppState {
        pool: pool.clone(),
        config,
    };
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address,
        pool,
        client: reqwest::Client::new(),
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn login(&self, email: &str, password: &str) -> String {
        let body: Value = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("Failed to execute request")
            .json()
            .await
            .unwrap();

        body["token"].as_str().expect("login returned no token").to_string()
    }

    pub async fn admin_token(&self) -> String {
        self.login(ADMIN_EMAIL, ADMIN_PASSWORD).await
    }

    /// Registers a fresh student and returns `(email, token)`.
    pub async fn student(&self) -> (String, String) {
        let email = format!("s_{}@example.com", &uuid::Uuid::new_v4().to_string()[..8]);

        let response = self
            .client
            .post(self.url("/api/auth/register"))
            .json(&json!({ "email": email, "password": "password123", "name": "Student" }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 201);

        let token = self.login(&email, "password123").await;
        (email, token)
    }

    /// Creates an exam as admin and returns the response body.
    pub async fn create_exam(&self, admin_token: &str, body: Value) -> Value {
        let response = self
            .client
            .post(self.url("/api/exams"))
            .bearer_auth(admin_token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 201);
        response.json().await.unwrap()
    }
}

/// A published two-question exam: a 2-point single choice whose answer is
/// "Paris" (option `a`) and a 1-point true/false whose answer is `true`.
pub fn sample_exam(allow_multiple_attempts: bool) -> Value {
    json!({
        "title": "Geography",
        "description": "Capitals and facts",
        "duration_minutes": 30,
        "passing_score": 60,
        "is_published": true,
        "allow_multiple_attempts": allow_multiple_attempts,
        "questions": [
            {
                "type": "multiple-choice",
                "question": "Capital of France?",
                "options": ["Paris", "Rome"],
                "correctAnswer": 0,
                "points": 2
            },
            {
                "type": "true-false",
                "question": "The Nile is in Africa.",
                "correctAnswer": true
            }
        ]
    })
}
