// src/services/question_format.rs

use serde_json::{Map, Value};

use crate::{
    models::question::NewQuestion,
    services::answer_key::{AnswerKeyError, QuestionData, QuestionType, key_reference_count},
    utils::html::clean_html,
};

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum QuestionFormatError {
    #[error("question must be a JSON object")]
    NotAnObject,
    #[error("question type is missing")]
    MissingType,
    #[error("unknown question type '{0}'")]
    UnknownType(String),
    #[error("question text is missing")]
    MissingText,
    #[error("points must be an integer between 0 and {}", MAX_POINTS)]
    InvalidPoints,
    #[error(transparent)]
    AnswerKey(#[from] AnswerKeyError),
}

/// Upper bound on a single question's points, shared with question updates.
pub const MAX_POINTS: i64 = 1000;

/// Editor-only fields that never belong in `question_data`.
const META_FIELDS: &[&str] = &[
    "id",
    "type",
    "questionType",
    "question_type",
    "question",
    "questionText",
    "question_text",
    "text",
    "points",
    "position",
    "order",
    "examId",
    "exam_id",
    "allowMultiple",
    "question_data",
    "questionData",
];

/// Converts a question as the exam editor sends it into the shape stored in
/// `questions`: a canonical type, sanitized text, points and standardized
/// `question_data`.
pub fn transform_question_to_backend_format(raw: &Value) -> Result<NewQuestion, QuestionFormatError> {
    let obj = raw.as_object().ok_or(QuestionFormatError::NotAnObject)?;

    let type_name = ["type", "questionType", "question_type"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .ok_or(QuestionFormatError::MissingType)?;

    let question_text = ["question_text", "questionText", "question", "text"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(clean_html)
        .ok_or(QuestionFormatError::MissingText)?;

    let points = match obj.get("points") {
        None | Some(Value::Null) => 1,
        Some(v) => v
            .as_i64()
            .filter(|p| (0..=MAX_POINTS).contains(p))
            .ok_or(QuestionFormatError::InvalidPoints)?,
    };

    let data_source: Value = match obj.get("question_data").or_else(|| obj.get("questionData")) {
        Some(Value::Object(nested)) => Value::Object(nested.clone()),
        _ => Value::Object(
            obj.iter()
                .filter(|(k, _)| !META_FIELDS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<Map<String, Value>>(),
        ),
    };

    let question_type = resolve_type(type_name, obj, &data_source)?;
    let question_data = QuestionData::from_value(question_type, &data_source)?;

    Ok(NewQuestion {
        question_type,
        question_text,
        points,
        question_data,
    })
}

/// Maps the editor's type names onto `QuestionType`.
///
/// The editor labels every option-list question "multiple-choice"; those
/// become single choice unless more than one answer is marked correct.
fn resolve_type(
    type_name: &str,
    obj: &Map<String, Value>,
    data: &Value,
) -> Result<QuestionType, QuestionFormatError> {
    let normalized: String = type_name
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();

    let question_type = match normalized.as_str() {
        "singlechoice" | "single" | "radio" => QuestionType::SingleChoice,
        "multipleanswer" | "multiselect" | "checkbox" => QuestionType::MultipleChoice,
        "truefalse" | "boolean" | "tf" => QuestionType::TrueFalse,
        "shortanswer" | "text" | "fillblank" | "fillintheblank" => QuestionType::ShortAnswer,
        "dragdrop" | "draganddrop" | "matching" => QuestionType::DragDrop,
        "multiplechoice" | "mcq" => {
            if type_name == "multiple_choice" {
                QuestionType::MultipleChoice
            } else if marked_correct_count(obj, data) > 1 {
                QuestionType::MultipleChoice
            } else {
                QuestionType::SingleChoice
            }
        }
        _ => return Err(QuestionFormatError::UnknownType(type_name.to_string())),
    };

    Ok(question_type)
}

fn marked_correct_count(obj: &Map<String, Value>, data: &Value) -> usize {
    if obj.get("allowMultiple").and_then(Value::as_bool) == Some(true) {
        return usize::MAX;
    }

    let referenced = key_reference_count(data);
    if referenced > 0 {
        return referenced;
    }

    data.get("options")
        .and_then(Value::as_array)
        .map(|options| {
            options
                .iter()
                .filter(|o| o.get("isCorrect").and_then(Value::as_bool) == Some(true))
                .count()
        })
        .unwrap_or(0)
}
