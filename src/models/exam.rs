// src/models/exam.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use validator::{Validate, ValidationError};

/// Represents the 'exams' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Exam {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,

    /// Time allowed for one attempt.
    pub duration_minutes: i64,

    /// Percentage (0-100) an attempt needs to pass.
    pub passing_score: i64,

    pub is_published: bool,

    /// Optional schedule window. Attempts can only start inside it.
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,

    pub allow_multiple_attempts: bool,

    pub created_by: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Exam row plus its question count, for listings.
#[derive(Debug, Serialize, FromRow)]
pub struct ExamSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub exam: Exam,
    pub question_count: i64,
}

/// Exam as returned by `GET /api/exams/{id}`.
/// Questions (with answer keys) are only included for admins; students see
/// them once an attempt is started.
#[derive(Debug, Serialize)]
pub struct ExamDetail {
    #[serde(flatten)]
    pub exam: Exam,
    pub question_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub questions: Option<Vec<crate::models::question::Question>>,
}

/// DTO for creating an exam, optionally together with its questions in the
/// editor's format.
#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = validate_create_schedule))]
pub struct CreateExamRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(range(min = 1, max = 1440))]
    pub duration_minutes: i64,
    #[validate(range(min = 0, max = 100))]
    pub passing_score: Option<i64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub allow_multiple_attempts: bool,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default)]
    pub questions: Vec<serde_json::Value>,
}

/// DTO for updating an exam. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateExamRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(range(min = 1, max = 1440))]
    pub duration_minutes: Option<i64>,
    #[validate(range(min = 0, max = 100))]
    pub passing_score: Option<i64>,
    /// Absent leaves the value alone; `null` clears it.
    #[serde(default, deserialize_with = "double_option")]
    pub start_time: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub end_time: Option<Option<DateTime<Utc>>>,
    pub allow_multiple_attempts: Option<bool>,
}

/// Distinguishes an explicit `null` (`Some(None)`) from a missing field
/// (`None`, via `#[serde(default)]`).
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl UpdateExamRequest {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.duration_minutes.is_none()
            && self.passing_score.is_none()
            && self.start_time.is_none()
            && self.end_time.is_none()
            && self.allow_multiple_attempts.is_none()
    }
}

fn validate_create_schedule(req: &CreateExamRequest) -> Result<(), ValidationError> {
    validate_schedule(req.start_time, req.end_time)
}

/// An exam window must end after it starts.
pub fn validate_schedule(
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
) -> Result<(), ValidationError> {
    match (start_time, end_time) {
        (Some(start), Some(end)) if end <= start => {
            Err(ValidationError::new("end_time_before_start_time"))
        }
        _ => Ok(()),
    }
}
