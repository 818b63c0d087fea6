// src/handlers/exams.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool, types::Json as SqlJson};
use validator::Validate;

use crate::{
    config::DEFAULT_PASSING_SCORE,
    error::AppError,
    models::{
        exam::{CreateExamRequest, Exam, ExamDetail, ExamSummary, UpdateExamRequest, validate_schedule},
        question::{NewQuestion, Question},
    },
    services::question_format::transform_question_to_backend_format,
    utils::{
        html::{clean_html, clean_optional},
        jwt::Claims,
    },
};

pub(crate) const EXAM_COLUMNS: &str = "id, title, description, duration_minutes, passing_score, is_published, start_time, end_time, allow_multiple_attempts, created_by, created_at, updated_at";

pub(crate) const QUESTION_COLUMNS: &str =
    "id, exam_id, question_type, question_text, question_data, points, position, created_at";

/// Loads an exam or fails with 404.
pub(crate) async fn fetch_exam(pool: &SqlitePool, id: i64) -> Result<Exam, AppError> {
    sqlx::query_as::<_, Exam>(&format!("SELECT {EXAM_COLUMNS} FROM exams WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch exam {}: {:?}", id, e);
            AppError::InternalServerError(e.to_string())
        })?
        .ok_or(AppError::NotFound("Exam not found".to_string()))
}

/// All questions of an exam in display order.
pub(crate) async fn fetch_questions(pool: &SqlitePool, exam_id: i64) -> Result<Vec<Question>, AppError> {
    let questions = sqlx::query_as::<_, Question>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions WHERE exam_id = ? ORDER BY position, id"
    ))
    .bind(exam_id)
    .fetch_all(pool)
    .await?;

    Ok(questions)
}

pub(crate) async fn insert_question(
    conn: &mut SqliteConnection,
    exam_id: i64,
    question: &NewQuestion,
    position: i64,
) -> Result<Question, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "INSERT INTO questions (exam_id, question_type, question_text, question_data, points, position, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING {QUESTION_COLUMNS}"
    ))
    .bind(exam_id)
    .bind(question.question_type)
    .bind(&question.question_text)
    .bind(SqlJson(question.question_data.to_value()))
    .bind(question.points)
    .bind(position)
    .bind(Utc::now())
    .fetch_one(conn)
    .await
}

/// Runs every editor question through the backend transform, naming the
/// offending question on failure.
fn transform_all(raw: &[serde_json::Value]) -> Result<Vec<NewQuestion>, AppError> {
    raw.iter()
        .enumerate()
        .map(|(i, q)| {
            transform_question_to_backend_format(q)
                .map_err(|e| AppError::BadRequest(format!("Question {}: {}", i + 1, e)))
        })
        .collect()
}

/// Lists exams with their question counts.
/// Admins see every exam, students only published ones.
pub async fn list_exams(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let exams = sqlx::query_as::<_, ExamSummary>(&format!(
        r#"
        SELECT {EXAM_COLUMNS},
            (SELECT COUNT(*) FROM questions WHERE questions.exam_id = exams.id) AS question_count
        FROM exams
        WHERE ? OR is_published = 1
        ORDER BY created_at DESC, id DESC
        "#
    ))
    .bind(claims.is_admin())
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list exams: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(exams))
}

/// Fetches a single exam.
/// Unpublished exams are invisible (404) to students.
pub async fn get_exam(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let exam = fetch_exam(&pool, id).await?;

    if !claims.is_admin() && !exam.is_published {
        return Err(AppError::NotFound("Exam not found".to_string()));
    }

    let questions = fetch_questions(&pool, id).await?;
    let question_count = questions.len() as i64;

    Ok(Json(ExamDetail {
        exam,
        question_count,
        questions: claims.is_admin().then_some(questions),
    }))
}

/// Creates an exam, optionally with its questions.
/// Admin only.
pub async fn create_exam(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let new_questions = transform_all(&payload.questions)?;
    if payload.is_published && new_questions.is_empty() {
        return Err(AppError::BadRequest(
            "Cannot publish an exam without questions".to_string(),
        ));
    }

    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let exam = sqlx::query_as::<_, Exam>(&format!(
        "INSERT INTO exams (title, description, duration_minutes, passing_score, is_published, start_time, end_time, allow_multiple_attempts, created_by, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {EXAM_COLUMNS}"
    ))
    .bind(clean_html(payload.title.trim()))
    .bind(clean_optional(payload.description))
    .bind(payload.duration_minutes)
    .bind(payload.passing_score.unwrap_or(DEFAULT_PASSING_SCORE))
    .bind(payload.is_published)
    .bind(payload.start_time)
    .bind(payload.end_time)
    .bind(payload.allow_multiple_attempts)
    .bind(claims.user_id()?)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create exam: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let mut questions = Vec::with_capacity(new_questions.len());
    for (position, question) in new_questions.iter().enumerate() {
        questions.push(insert_question(&mut tx, exam.id, question, position as i64).await?);
    }

    tx.commit().await?;

    tracing::info!("Exam {} created with {} questions", exam.id, questions.len());

    Ok((
        StatusCode::CREATED,
        Json(ExamDetail {
            exam,
            question_count: questions.len() as i64,
            questions: Some(questions),
        }),
    ))
}

/// Updates exam settings by ID.
/// Admin only.
pub async fn update_exam(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let existing = fetch_exam(&pool, id).await?;
    if payload.is_empty() {
        return Ok(Json(existing));
    }

    validate_schedule(
        payload.start_time.unwrap_or(existing.start_time),
        payload.end_time.unwrap_or(existing.end_time),
    )
    .map_err(|_| AppError::BadRequest("end_time must be after start_time".to_string()))?;

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE exams SET ");
    let mut separated = builder.separated(", ");

    if let Some(title) = payload.title {
        separated.push("title = ");
        separated.push_bind_unseparated(clean_html(title.trim()));
    }

    if let Some(description) = payload.description {
        separated.push("description = ");
        separated.push_bind_unseparated(clean_html(&description));
    }

    if let Some(duration_minutes) = payload.duration_minutes {
        separated.push("duration_minutes = ");
        separated.push_bind_unseparated(duration_minutes);
    }

    if let Some(passing_score) = payload.passing_score {
        separated.push("passing_score = ");
        separated.push_bind_unseparated(passing_score);
    }

    if let Some(start_time) = payload.start_time {
        separated.push("start_time = ");
        separated.push_bind_unseparated(start_time);
    }

    if let Some(end_time) = payload.end_time {
        separated.push("end_time = ");
        separated.push_bind_unseparated(end_time);
    }

    if let Some(allow_multiple_attempts) = payload.allow_multiple_attempts {
        separated.push("allow_multiple_attempts = ");
        separated.push_bind_unseparated(allow_multiple_attempts);
    }

    separated.push("updated_at = ");
    separated.push_bind_unseparated(Utc::now());

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update exam: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(fetch_exam(&pool, id).await?))
}

/// Deletes an exam and, by cascade, its questions and attempts.
/// Admin only.
pub async fn delete_exam(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM exams WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete exam: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Exam not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Makes an exam visible to students. An exam without questions cannot be
/// published.
/// Admin only.
pub async fn publish_exam(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    fetch_exam(&pool, id).await?;

    let question_count =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM questions WHERE exam_id = ?")
            .bind(id)
            .fetch_one(&pool)
            .await?;

    if question_count == 0 {
        return Err(AppError::BadRequest(
            "Cannot publish an exam without questions".to_string(),
        ));
    }

    set_published(&pool, id, true).await
}

/// Hides an exam from students. Running attempts can still be submitted.
/// Admin only.
pub async fn unpublish_exam(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    fetch_exam(&pool, id).await?;
    set_published(&pool, id, false).await
}

async fn set_published(pool: &SqlitePool, id: i64, published: bool) -> Result<Json<Exam>, AppError> {
    sqlx::query("UPDATE exams SET is_published = ?, updated_at = ? WHERE id = ?")
        .bind(published)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;

    tracing::info!("Exam {} published = {}", id, published);

    Ok(Json(fetch_exam(pool, id).await?))
}
