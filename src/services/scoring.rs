// src/services/scoring.rs

use std::collections::HashMap;

use serde_json::Value;

use crate::services::answer_key::{AnswerKey, QuestionData, Response};

/// One question to grade: its id, its weight and its parsed answer key.
pub struct GradingItem<'a> {
    pub question_id: i64,
    pub points: i64,
    pub data: &'a QuestionData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredQuestion {
    pub question_id: i64,
    pub is_correct: bool,
    pub points_earned: i64,
    pub points_possible: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttemptScore {
    pub score: i64,
    pub max_score: i64,
    /// 0-100; 0 when the exam is worth nothing.
    pub percentage: f64,
    pub correct_count: usize,
    pub total_questions: usize,
    pub questions: Vec<ScoredQuestion>,
}

impl AttemptScore {
    pub fn passed(&self, passing_score: i64) -> bool {
        self.percentage >= passing_score as f64
    }
}

/// Compares a normalized response to the key. All-or-nothing: no partial
/// credit for multiple choice or drag-drop.
pub fn is_correct(key: &AnswerKey, response: &Response) -> bool {
    match (key, response) {
        (AnswerKey::Single(expected), Response::Choice(given)) => expected == given,
        (AnswerKey::Multiple(expected), Response::Choices(given)) => expected == given,
        (AnswerKey::Multiple(expected), Response::Choice(given)) => {
            expected.len() == 1 && expected.contains(given)
        }
        (
            AnswerKey::Text {
                accepted,
                case_sensitive,
            },
            Response::Text(given),
        ) => {
            let given = normalize_text(given, *case_sensitive);
            accepted
                .iter()
                .any(|candidate| normalize_text(candidate, *case_sensitive) == given)
        }
        (AnswerKey::Mapping(expected), Response::Mapping(given)) => expected == given,
        _ => false,
    }
}

/// Trims, collapses inner whitespace, and lowercases unless case matters.
fn normalize_text(text: &str, case_sensitive: bool) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if case_sensitive {
        collapsed
    } else {
        collapsed.to_lowercase()
    }
}

/// Grades a single raw answer. Missing or unusable answers are wrong.
pub fn grade_answer(data: &QuestionData, raw: Option<&Value>) -> bool {
    raw.and_then(|raw| data.normalize_response(raw))
        .is_some_and(|response| is_correct(&data.key, &response))
}

/// Scores a whole attempt.
///
/// Every question in `items` counts toward `max_score`, answered or not.
/// Answers for questions outside `items` are ignored.
pub fn score_attempt<'a>(
    items: impl IntoIterator<Item = GradingItem<'a>>,
    answers: &HashMap<i64, Value>,
) -> AttemptScore {
    let mut questions = Vec::new();
    let mut score: i64 = 0;
    let mut max_score: i64 = 0;
    let mut correct_count = 0;

    for item in items {
        let correct = grade_answer(item.data, answers.get(&item.question_id));
        let earned = if correct { item.points } else { 0 };

        score = score.saturating_add(earned);
        max_score = max_score.saturating_add(item.points);
        if correct {
            correct_count += 1;
        }

        questions.push(ScoredQuestion {
            question_id: item.question_id,
            is_correct: correct,
            points_earned: earned,
            points_possible: item.points,
        });
    }

    let percentage = if max_score > 0 {
        (score as f64 / max_score as f64) * 100.0
    } else {
        0.0
    };

    AttemptScore {
        score,
        max_score,
        percentage,
        correct_count,
        total_questions: questions.len(),
        questions,
    }
}
