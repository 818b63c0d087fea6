// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    error::{AppError, is_unique_violation},
    handlers::{attempts::ATTEMPT_COLUMNS_A, exams::fetch_exam},
    models::{
        attempt::ExamAttemptEntry,
        invite_code::{CreateInviteCodeRequest, InviteCode},
        user::User,
    },
    services::{backfill::standardize_all_questions, invite_codes::generate_invite_code},
    utils::jwt::Claims,
};

const INVITE_COLUMNS: &str = "id, code, created_by, created_at, expires_at, used_by, used_at";

/// A freshly generated code colliding with an existing one is retried this often.
const MAX_CODE_ATTEMPTS: usize = 3;

/// Lists all users in the system.
/// Admin only.
pub async fn list_users(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let users = sqlx::query_as::<_, User>(
        "SELECT id, email, password_hash, name, role, created_at FROM users ORDER BY id DESC",
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list users: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(users))
}

/// Issues a one-time admin invite code.
/// Admin only.
pub async fn create_invite_code(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateInviteCodeRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let now = Utc::now();
    let expires_at = payload.expires_in_hours.map(|hours| now + Duration::hours(hours));
    let created_by = claims.user_id()?;

    for _ in 0..MAX_CODE_ATTEMPTS {
        let inserted = sqlx::query_as::<_, InviteCode>(&format!(
            "INSERT INTO invite_codes (code, created_by, created_at, expires_at) VALUES (?, ?, ?, ?) RETURNING {INVITE_COLUMNS}"
        ))
        .bind(generate_invite_code())
        .bind(created_by)
        .bind(now)
        .bind(expires_at)
        .fetch_one(&pool)
        .await;

        match inserted {
            Ok(invite) => {
                tracing::info!("Admin {} issued invite code {}", created_by, invite.id);
                return Ok((StatusCode::CREATED, Json(invite)));
            }
            Err(e) if is_unique_violation(&e) => {
                tracing::warn!("Generated invite code collided, retrying");
            }
            Err(e) => {
                tracing::error!("Failed to create invite code: {:?}", e);
                return Err(AppError::InternalServerError(e.to_string()));
            }
        }
    }

    Err(AppError::InternalServerError(
        "Could not generate a unique invite code".to_string(),
    ))
}

/// Lists invite codes, newest first, including used and expired ones.
/// Admin only.
pub async fn list_invite_codes(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let codes = sqlx::query_as::<_, InviteCode>(&format!(
        "SELECT {INVITE_COLUMNS} FROM invite_codes ORDER BY created_at DESC, id DESC"
    ))
    .fetch_all(&pool)
    .await?;

    Ok(Json(codes))
}

/// Rewrites every stored question into the standardized answer fields.
/// Admin only.
pub async fn standardize_questions(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let report = standardize_all_questions(&pool).await.map_err(|e| {
        tracing::error!("Answer key backfill failed: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    tracing::info!(
        "Answer key backfill: {} examined, {} updated, {} failed",
        report.examined,
        report.updated,
        report.failed.len()
    );

    Ok(Json(report))
}

/// All attempts on an exam with the student's email and name.
/// Admin only.
pub async fn list_exam_attempts(
    State(pool): State<SqlitePool>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    fetch_exam(&pool, exam_id).await?;

    let attempts = sqlx::query_as::<_, ExamAttemptEntry>(&format!(
        r#"
        SELECT {ATTEMPT_COLUMNS_A}, u.email AS email, u.name AS name
        FROM attempts a
        JOIN users u ON u.id = a.user_id
        WHERE a.exam_id = ?
        ORDER BY a.started_at DESC, a.id DESC
        "#
    ))
    .bind(exam_id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list exam attempts: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(attempts))
}
