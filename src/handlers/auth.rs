// src/handlers/auth.rs

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    config::Config,
    error::{AppError, is_unique_violation},
    models::{
        invite_code::InviteCode,
        user::{LoginRequest, ProfileResponse, RegisterRequest, User, UserRole},
    },
    services::invite_codes::{is_well_formed, normalize_invite_code},
    utils::{
        hash::{hash_password, verify_password},
        jwt::{Claims, sign_jwt},
    },
};

const USER_COLUMNS: &str = "id, email, password_hash, name, role, created_at";

/// Registers a new user.
///
/// Hashes the password using Argon2 before storing it. With a valid
/// `admin_invite_code` the account is created as admin and the code is
/// consumed in the same transaction; a rejected code creates nothing.
/// Returns 201 Created and the user object (excluding password).
pub async fn register(
    State(pool): State<SqlitePool>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let email = payload.email.trim().to_lowercase();
    let hashed_password = hash_password(&payload.password)?;

    let mut tx = pool.begin().await?;

    let user = sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (email, password_hash, name, role, created_at) VALUES (?, ?, ?, 'student', ?) RETURNING {USER_COLUMNS}"
    ))
    .bind(&email)
    .bind(&hashed_password)
    .bind(payload.name.trim())
    .bind(Utc::now())
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("Email '{}' is already registered", email))
        } else {
            tracing::error!("Failed to register user: {:?}", e);
            AppError::from(e)
        }
    })?;

    let user = match payload.admin_invite_code.as_deref() {
        None => user,
        Some(raw_code) => {
            let code = normalize_invite_code(raw_code);
            if !is_well_formed(&code) {
                return Err(AppError::Forbidden("Invalid invite code".to_string()));
            }

            let invite = sqlx::query_as::<_, InviteCode>(
                "SELECT id, code, created_by, created_at, expires_at, used_by, used_at FROM invite_codes WHERE code = ?",
            )
            .bind(&code)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AppError::Forbidden("Invalid invite code".to_string()))?;

            let now = Utc::now();
            if !invite.is_usable(now) {
                return Err(AppError::Forbidden(
                    "Invite code has already been used or has expired".to_string(),
                ));
            }

            // Guarded on used_by so two concurrent registrations cannot share a code.
            let consumed = sqlx::query(
                "UPDATE invite_codes SET used_by = ?, used_at = ? WHERE id = ? AND used_by IS NULL",
            )
            .bind(user.id)
            .bind(now)
            .bind(invite.id)
            .execute(&mut *tx)
            .await?;

            if consumed.rows_affected() == 0 {
                return Err(AppError::Forbidden(
                    "Invite code has already been used or has expired".to_string(),
                ));
            }

            tracing::info!("Invite code {} consumed by user {}", invite.id, user.id);

            sqlx::query_as::<_, User>(&format!(
                "UPDATE users SET role = 'admin' WHERE id = ? RETURNING {USER_COLUMNS}"
            ))
            .bind(user.id)
            .fetch_one(&mut *tx)
            .await?
        }
    };

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(user)))
}

/// Authenticates a user and returns a JWT token.
///
/// Unknown email and wrong password produce the same 401.
pub async fn login(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
        .bind(payload.email.trim().to_lowercase())
        .fetch_optional(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Login DB error: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    let user = user.ok_or(AppError::AuthError("Invalid email or password".to_string()))?;

    if !verify_password(&payload.password, &user.password_hash)? {
        return Err(AppError::AuthError("Invalid email or password".to_string()));
    }

    let token = sign_jwt(user.id, user.role, &config.jwt_secret, config.jwt_expiration)?;

    Ok(Json(json!({
        "token": token,
        "type": "Bearer",
        "user": user
    })))
}

/// Current user's profile with attempt statistics.
pub async fn profile(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(user_id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    let (attempts_count, completed_count, best_percentage): (i64, i64, Option<f64>) = sqlx::query_as(
        r#"
        SELECT
            COUNT(*),
            COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0),
            MAX(percentage)
        FROM attempts
        WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_one(&pool)
    .await?;

    Ok(Json(ProfileResponse {
        user,
        attempts_count,
        completed_count,
        best_percentage,
    }))
}

/// Creates the configured admin account on first start.
pub async fn seed_admin_user(pool: &SqlitePool, config: &Config) -> Result<(), AppError> {
    let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) else {
        return Ok(());
    };
    let email = email.trim().to_lowercase();

    let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(pool)
        .await?;

    if exists.is_none() {
        tracing::info!("Seeding admin user: {}", email);
        let hashed_password = hash_password(password)?;

        sqlx::query(
            "INSERT INTO users (email, password_hash, name, role, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&email)
        .bind(hashed_password)
        .bind("Administrator")
        .bind(UserRole::Admin)
        .bind(Utc::now())
        .execute(pool)
        .await?;
        tracing::info!("Admin user created successfully.");
    }
    Ok(())
}
