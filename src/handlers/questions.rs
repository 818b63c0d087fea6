// src/handlers/questions.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{QueryBuilder, Sqlite, SqlitePool, types::Json as SqlJson};
use validator::Validate;

use crate::{
    error::AppError,
    handlers::exams::{QUESTION_COLUMNS, fetch_exam, fetch_questions, insert_question},
    models::question::{Question, UpdateQuestionRequest},
    services::{answer_key::QuestionData, question_format::transform_question_to_backend_format},
    utils::html::clean_html,
};

/// Lists an exam's questions including answer keys.
/// Admin only.
pub async fn list_questions(
    State(pool): State<SqlitePool>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    fetch_exam(&pool, exam_id).await?;
    Ok(Json(fetch_questions(&pool, exam_id).await?))
}

/// Appends a question (editor format) to an exam.
/// Admin only.
pub async fn add_question(
    State(pool): State<SqlitePool>,
    Path(exam_id): Path<i64>,
    Json(payload): Json<serde_json::Value>,
) -> Result<impl IntoResponse, AppError> {
    fetch_exam(&pool, exam_id).await?;
    let new_question = transform_question_to_backend_format(&payload)?;

    let mut tx = pool.begin().await?;

    let position = sqlx::query_scalar::<_, i64>(
        "SELECT COALESCE(MAX(position) + 1, 0) FROM questions WHERE exam_id = ?",
    )
    .bind(exam_id)
    .fetch_one(&mut *tx)
    .await?;

    let question = insert_question(&mut tx, exam_id, &new_question, position)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create question: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(question)))
}

/// Updates a question by ID.
/// Admin only.
pub async fn update_question(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let existing = fetch_question(&pool, id).await?;

    if payload.question_type.is_none()
        && payload.question_text.is_none()
        && payload.question_data.is_none()
        && payload.points.is_none()
    {
        return Ok(Json(existing));
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE questions SET ");
    let mut separated = builder.separated(", ");

    if payload.question_type.is_some() || payload.question_data.is_some() {
        let question_type = payload.question_type.unwrap_or(existing.question_type);
        let raw = payload
            .question_data
            .unwrap_or_else(|| existing.question_data.0.clone());
        let data = QuestionData::from_value(question_type, &raw)?;

        separated.push("question_type = ");
        separated.push_bind_unseparated(question_type);
        separated.push("question_data = ");
        separated.push_bind_unseparated(SqlJson(data.to_value()));
    }

    if let Some(text) = payload.question_text {
        separated.push("question_text = ");
        separated.push_bind_unseparated(clean_html(text.trim()));
    }

    if let Some(points) = payload.points {
        separated.push("points = ");
        separated.push_bind_unseparated(points);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update question: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(fetch_question(&pool, id).await?))
}

/// Deletes a question by ID.
/// Admin only.
pub async fn delete_question(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM questions WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete question: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_question(pool: &SqlitePool, id: i64) -> Result<Question, AppError> {
    sqlx::query_as::<_, Question>(&format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Question not found".to_string()))
}
