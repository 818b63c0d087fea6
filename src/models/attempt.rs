// src/models/attempt.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};

use crate::models::question::PublicQuestion;

/// Lifecycle of an attempt.
///
/// `in_progress` -> `completed` on a timely submit, `in_progress` -> `ended`
/// when the deadline passed (late submit, or closed as stale when the student
/// starts over).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Completed,
    Ended,
}

/// Represents the 'attempts' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Attempt {
    pub id: i64,
    pub user_id: i64,
    pub exam_id: i64,
    pub status: AttemptStatus,
    pub score: Option<i64>,
    pub max_score: Option<i64>,
    pub percentage: Option<f64>,
    pub passed: Option<bool>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Attempt row joined with the exam title, for "my attempts" listings.
#[derive(Debug, Serialize, FromRow)]
pub struct AttemptSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub attempt: Attempt,
    pub exam_title: String,
}

/// Attempt row joined with the student, for the admin view of an exam.
#[derive(Debug, Serialize, FromRow)]
pub struct ExamAttemptEntry {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub attempt: Attempt,
    pub email: String,
    pub name: String,
}

/// Represents the 'attempt_answers' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AttemptAnswer {
    pub attempt_id: i64,
    pub question_id: i64,
    pub answer_data: Json<serde_json::Value>,
    pub is_correct: Option<bool>,
    pub points_earned: Option<i64>,
    pub answered_at: DateTime<Utc>,
}

/// DTO for saving a single answer while the attempt is running.
#[derive(Debug, Deserialize)]
pub struct SaveAnswerRequest {
    pub question_id: i64,
    pub answer: serde_json::Value,
}

/// DTO for submitting an attempt.
#[derive(Debug, Deserialize)]
pub struct SubmitAttemptRequest {
    /// Key: Question ID, Value: the answer in any accepted shape.
    #[serde(default)]
    pub answers: HashMap<i64, serde_json::Value>,
}

/// Returned when an attempt is started or resumed.
#[derive(Debug, Serialize)]
pub struct AttemptSession {
    pub attempt: Attempt,
    pub resumed: bool,
    pub deadline: DateTime<Utc>,
    pub questions: Vec<PublicQuestion>,
    /// Answers saved so far, keyed by question id.
    pub saved_answers: HashMap<i64, serde_json::Value>,
}

/// Per-question outcome in a results view.
#[derive(Debug, Serialize)]
pub struct QuestionResult {
    pub question_id: i64,
    pub question_text: String,
    pub submitted: Option<serde_json::Value>,
    pub is_correct: bool,
    pub points_earned: i64,
    pub points_possible: i64,
    /// Standardized answer key; only revealed after the attempt is closed.
    pub correct_answer: Option<serde_json::Value>,
}

/// Full results of an attempt.
#[derive(Debug, Serialize)]
pub struct AttemptResult {
    pub attempt: Attempt,
    pub exam_title: String,
    pub passing_score: i64,
    pub correct_count: usize,
    pub total_questions: usize,
    pub questions: Vec<QuestionResult>,
}
