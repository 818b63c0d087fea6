// tests/api_tests.rs

mod common;

use axum::{body::Body, http::Request};
use common::{sample_exam, spawn_app};
use exam_portal::{config::Config, db, routes, state::AppState};
use serde_json::{Value, json};
use tower::ServiceExt;

#[tokio::test]
async fn health_check_404() {
    // Arrange
    let app = spawn_app().await;

    // Act
    let response = app
        .client
        .get(app.url("/random_path_that_does_not_exist"))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn protected_routes_reject_missing_token() {
    // Arrange: drive the router directly, no listener
    let config = Config::for_database("sqlite::memory:", "oneshot_secret");
    let pool = db::connect(&config.database_url).await.unwrap();
    db::migrate(&pool).await.unwrap();
    let app = routes::create_router(AppState { pool, config });

    // Act
    let response = app
        .oneshot(Request::builder().uri("/api/exams").body(Body::empty()).unwrap())
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn register_works() {
    // Arrange
    let app = spawn_app().await;

    // Act
    let response = app
        .client
        .post(app.url("/api/auth/register"))
        .json(&json!({
            "email": "  Alice@Example.com ",
            "password": "password123",
            "name": "Alice"
        }))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["email"], "alice@example.com");
    assert_eq!(body["role"], "student");
    assert!(body.get("password_hash").is_none());
}

#[tokio::test]
async fn register_fails_validation() {
    // Arrange
    let app = spawn_app().await;

    // Act: invalid email, then a password that is too short
    let bad_email = app
        .client
        .post(app.url("/api/auth/register"))
        .json(&json!({ "email": "not-an-email", "password": "password123", "name": "X" }))
        .send()
        .await
        .expect("Failed to execute request");
    let short_password = app
        .client
        .post(app.url("/api/auth/register"))
        .json(&json!({ "email": "x@example.com", "password": "short", "name": "X" }))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(bad_email.status().as_u16(), 400);
    assert_eq!(short_password.status().as_u16(), 400);
}

#[tokio::test]
async fn register_duplicate_email_conflicts() {
    let app = spawn_app().await;
    let (email, _) = app.student().await;

    let response = app
        .client
        .post(app.url("/api/auth/register"))
        .json(&json!({ "email": email, "password": "password123", "name": "Again" }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn login_rejects_bad_credentials() {
    let app = spawn_app().await;
    let (email, _) = app.student().await;

    let wrong_password = app
        .client
        .post(app.url("/api/auth/login"))
        .json(&json!({ "email": email, "password": "wrong-password" }))
        .send()
        .await
        .expect("Failed to execute request");
    let unknown_user = app
        .client
        .post(app.url("/api/auth/login"))
        .json(&json!({ "email": "nobody@example.com", "password": "password123" }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(wrong_password.status().as_u16(), 401);
    assert_eq!(unknown_user.status().as_u16(), 401);
}

#[tokio::test]
async fn profile_requires_token() {
    let app = spawn_app().await;
    let (email, token) = app.student().await;

    let anonymous = app
        .client
        .get(app.url("/api/auth/profile"))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(anonymous.status().as_u16(), 401);

    let response = app
        .client
        .get(app.url("/api/auth/profile"))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["email"], email.as_str());
    assert_eq!(body["attempts_count"], 0);
    assert!(body["best_percentage"].is_null());
}

#[tokio::test]
async fn invite_code_promotes_exactly_one_account() {
    // Arrange
    let app = spawn_app().await;
    let admin = app.admin_token().await;

    let response = app
        .client
        .post(app.url("/api/admin/invite-codes"))
        .bearer_auth(&admin)
        .json(&json!({ "expires_in_hours": 24 }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 201);
    let invite: Value = response.json().await.unwrap();
    let code = invite["code"].as_str().unwrap().to_string();
    assert!(code.starts_with("ADM-"));

    // Act: first use, lower-cased to check normalization
    let first = app
        .client
        .post(app.url("/api/auth/register"))
        .json(&json!({
            "email": "new-admin@example.com",
            "password": "password123",
            "name": "New Admin",
            "admin_invite_code": code.to_lowercase()
        }))
        .send()
        .await
        .expect("Failed to execute request");

    let second = app
        .client
        .post(app.url("/api/auth/register"))
        .json(&json!({
            "email": "second@example.com",
            "password": "password123",
            "name": "Second",
            "admin_invite_code": code
        }))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(first.status().as_u16(), 201);
    let body: Value = first.json().await.unwrap();
    assert_eq!(body["role"], "admin");

    assert_eq!(second.status().as_u16(), 403);

    // The rejected registration created nothing, so the email is still free.
    let retry = app
        .client
        .post(app.url("/api/auth/register"))
        .json(&json!({ "email": "second@example.com", "password": "password123", "name": "Second" }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(retry.status().as_u16(), 201);

    let codes: Vec<Value> = app
        .client
        .get(app.url("/api/admin/invite-codes"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(codes.len(), 1);
    assert!(codes[0]["used_by"].is_number());
}

#[tokio::test]
async fn unknown_invite_code_is_rejected() {
    let app = spawn_app().await;

    let response = app
        .client
        .post(app.url("/api/auth/register"))
        .json(&json!({
            "email": "hopeful@example.com",
            "password": "password123",
            "name": "Hopeful",
            "admin_invite_code": "ADM-AAAA-BBBB"
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn expired_invite_code_is_rejected() {
    // Arrange
    let app = spawn_app().await;
    sqlx::query("INSERT INTO invite_codes (code, created_at, expires_at) VALUES (?, ?, ?)")
        .bind("ADM-CDEF-GHJK")
        .bind(chrono::Utc::now() - chrono::Duration::days(8))
        .bind(chrono::Utc::now() - chrono::Duration::days(1))
        .execute(&app.pool)
        .await
        .unwrap();

    // Act
    let response = app
        .client
        .post(app.url("/api/auth/register"))
        .json(&json!({
            "email": "late@example.com",
            "password": "password123",
            "name": "Late",
            "admin_invite_code": "ADM-CDEF-GHJK"
        }))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 403);

    let users = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind("late@example.com")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(users, 0);

    let unused = sqlx::query_scalar::<_, Option<i64>>("SELECT used_by FROM invite_codes WHERE code = ?")
        .bind("ADM-CDEF-GHJK")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert!(unused.is_none());
}

#[tokio::test]
async fn students_cannot_reach_admin_routes() {
    let app = spawn_app().await;
    let (_, token) = app.student().await;

    let create = app
        .client
        .post(app.url("/api/exams"))
        .bearer_auth(&token)
        .json(&sample_exam(false))
        .send()
        .await
        .expect("Failed to execute request");
    let users = app
        .client
        .get(app.url("/api/admin/users"))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(create.status().as_u16(), 403);
    assert_eq!(users.status().as_u16(), 403);
}

#[tokio::test]
async fn exam_visibility_follows_publication() {
    // Arrange
    let app = spawn_app().await;
    let admin = app.admin_token().await;
    let (_, student) = app.student().await;

    let mut body = sample_exam(false);
    body["is_published"] = json!(false);
    let exam = app.create_exam(&admin, body).await;
    let exam_id = exam["id"].as_i64().unwrap();

    // Stored in the standardized format
    assert_eq!(exam["question_count"], 2);
    assert_eq!(exam["questions"][0]["question_type"], "single_choice");
    assert_eq!(exam["questions"][0]["question_data"]["correctAnswer"], "a");
    assert_eq!(exam["questions"][1]["question_type"], "true_false");

    // Act & Assert: hidden while unpublished
    let list: Vec<Value> = app
        .client
        .get(app.url("/api/exams"))
        .bearer_auth(&student)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(list.is_empty());

    let hidden = app
        .client
        .get(app.url(&format!("/api/exams/{}", exam_id)))
        .bearer_auth(&student)
        .send()
        .await
        .unwrap();
    assert_eq!(hidden.status().as_u16(), 404);

    let publish = app
        .client
        .post(app.url(&format!("/api/exams/{}/publish", exam_id)))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(publish.status().as_u16(), 200);

    let visible: Value = app
        .client
        .get(app.url(&format!("/api/exams/{}", exam_id)))
        .bearer_auth(&student)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(visible["title"], "Geography");
    assert_eq!(visible["question_count"], 2);
    assert!(visible.get("questions").is_none());
}

#[tokio::test]
async fn publishing_requires_questions() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;

    let exam = app
        .create_exam(
            &admin,
            json!({ "title": "Empty", "duration_minutes": 10 }),
        )
        .await;
    assert_eq!(exam["passing_score"], 60);
    assert_eq!(exam["is_published"], false);

    let response = app
        .client
        .post(app.url(&format!("/api/exams/{}/publish", exam["id"])))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn create_exam_rejects_bad_input() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;

    let unknown_option = app
        .client
        .post(app.url("/api/exams"))
        .bearer_auth(&admin)
        .json(&json!({
            "title": "Broken",
            "duration_minutes": 10,
            "questions": [{ "type": "single", "question": "Pick", "options": ["x", "y"], "correctAnswer": "z" }]
        }))
        .send()
        .await
        .unwrap();

    let bad_schedule = app
        .client
        .post(app.url("/api/exams"))
        .bearer_auth(&admin)
        .json(&json!({
            "title": "Backwards",
            "duration_minutes": 10,
            "start_time": "2030-01-02T00:00:00Z",
            "end_time": "2030-01-01T00:00:00Z"
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(unknown_option.status().as_u16(), 400);
    assert_eq!(bad_schedule.status().as_u16(), 400);
}

#[tokio::test]
async fn update_exam_can_clear_schedule() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;
    let exam = app
        .create_exam(
            &admin,
            json!({
                "title": "Scheduled",
                "duration_minutes": 20,
                "start_time": "2030-01-01T00:00:00Z",
                "end_time": "2030-01-02T00:00:00Z"
            }),
        )
        .await;
    let exam_url = app.url(&format!("/api/exams/{}", exam["id"]));

    let response = app
        .client
        .put(&exam_url)
        .bearer_auth(&admin)
        .json(&json!({ "start_time": null }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let updated: Value = response.json().await.unwrap();
    assert!(updated["start_time"].is_null());
    assert!(updated["end_time"].is_string());

    // A field left out is untouched
    let renamed: Value = app
        .client
        .put(&exam_url)
        .bearer_auth(&admin)
        .json(&json!({ "title": "Renamed" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(renamed["title"], "Renamed");
    assert!(renamed["end_time"].is_string());
}

#[tokio::test]
async fn question_crud_round_trip() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;
    let exam = app
        .create_exam(&admin, json!({ "title": "Chemistry", "duration_minutes": 15 }))
        .await;
    let exam_id = exam["id"].as_i64().unwrap();

    let created = app
        .client
        .post(app.url(&format!("/api/exams/{}/questions", exam_id)))
        .bearer_auth(&admin)
        .json(&json!({ "type": "short-answer", "question": "Symbol for gold?", "correctAnswer": "Au" }))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status().as_u16(), 201);
    let question: Value = created.json().await.unwrap();
    let question_id = question["id"].as_i64().unwrap();
    assert_eq!(question["question_type"], "short_answer");

    let updated: Value = app
        .client
        .put(app.url(&format!("/api/questions/{}", question_id)))
        .bearer_auth(&admin)
        .json(&json!({ "points": 5, "question_data": { "correctAnswer": "Ag" } }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(updated["points"], 5);
    assert_eq!(updated["question_data"]["correctAnswer"], "Ag");

    let deleted = app
        .client
        .delete(app.url(&format!("/api/questions/{}", question_id)))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status().as_u16(), 204);

    let remaining: Vec<Value> = app
        .client
        .get(app.url(&format!("/api/exams/{}/questions", exam_id)))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(remaining.is_empty());
}

#[tokio::test]
async fn standardize_rewrites_legacy_answer_fields() {
    // Arrange: a row written before answers were standardized
    let app = spawn_app().await;
    let admin = app.admin_token().await;
    let exam = app
        .create_exam(&admin, json!({ "title": "Legacy", "duration_minutes": 10 }))
        .await;
    let exam_id = exam["id"].as_i64().unwrap();

    sqlx::query(
        "INSERT INTO questions (exam_id, question_type, question_text, question_data, points, position) VALUES (?, 'single_choice', 'Capital of Italy?', ?, 1, 0)",
    )
    .bind(exam_id)
    .bind(json!({ "options": ["Paris", "Rome"], "correct_answer": "Rome" }).to_string())
    .execute(&app.pool)
    .await
    .unwrap();

    // Act
    let report: Value = app
        .client
        .post(app.url("/api/admin/questions/standardize"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    // Assert
    assert_eq!(report["examined"], 1);
    assert_eq!(report["updated"], 1);

    let questions: Vec<Value> = app
        .client
        .get(app.url(&format!("/api/exams/{}/questions", exam_id)))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(questions[0]["question_data"]["correctAnswer"], "b");
    assert!(questions[0]["question_data"].get("correct_answer").is_none());

    // A second run has nothing left to do.
    let again: Value = app
        .client
        .post(app.url("/api/admin/questions/standardize"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(again["updated"], 0);
}
