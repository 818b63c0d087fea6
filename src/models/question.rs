// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

use crate::services::answer_key::{AnswerKeyError, QuestionData, QuestionType};

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub exam_id: i64,
    pub question_type: QuestionType,
    pub question_text: String,

    /// Type-specific options and answer key, in standardized form once the
    /// row has been written by this service or backfilled.
    pub question_data: Json<serde_json::Value>,

    pub points: i64,
    pub position: i64,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Question {
    pub fn data(&self) -> Result<QuestionData, AnswerKeyError> {
        QuestionData::from_value(self.question_type, &self.question_data)
    }

    /// Student-facing view with every answer-key field removed.
    pub fn to_public(&self) -> Result<PublicQuestion, AnswerKeyError> {
        Ok(PublicQuestion {
            id: self.id,
            question_type: self.question_type,
            question_text: self.question_text.clone(),
            question_data: self.data()?.public_value(),
            points: self.points,
            position: self.position,
        })
    }
}

/// DTO for sending a question to a student (no correct answers).
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub question_type: QuestionType,
    pub question_text: String,
    pub question_data: serde_json::Value,
    pub points: i64,
    pub position: i64,
}

/// A question ready to be inserted, produced by
/// `question_format::transform_question_to_backend_format`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewQuestion {
    pub question_type: QuestionType,
    pub question_text: String,
    pub points: i64,
    pub question_data: QuestionData,
}

/// DTO for updating a question. Fields are optional; a new type or new
/// `question_data` is re-normalized against the other before it is stored.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuestionRequest {
    pub question_type: Option<QuestionType>,
    #[validate(length(min = 1, max = 5000))]
    pub question_text: Option<String>,
    pub question_data: Option<serde_json::Value>,
    #[validate(range(min = 0, max = 1000))]
    pub points: Option<i64>,
}
