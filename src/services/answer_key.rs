// src/services/answer_key.rs

//! Typed view over the `question_data` JSON blob.
//!
//! Rows written over the years carry the answer key in several shapes:
//! `correctAnswer` as an id, an option text, a letter or an index,
//! `correctAnswers` as a list, `isCorrect` flags on options, and drag-drop
//! `correctMappings` either as an object or as a list of pairs. Everything is
//! resolved here into option ids, and written back in one standardized form.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum QuestionType {
    SingleChoice,
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
    DragDrop,
}

impl QuestionType {
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::SingleChoice => "single_choice",
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::TrueFalse => "true_false",
            QuestionType::ShortAnswer => "short_answer",
            QuestionType::DragDrop => "drag_drop",
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub id: String,
    pub text: String,
}

/// The resolved correct answer of a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerKey {
    /// Exactly one option id (single choice, true/false).
    Single(String),
    /// A non-empty set of option ids.
    Multiple(BTreeSet<String>),
    /// Free text compared against any accepted answer.
    Text {
        accepted: Vec<String>,
        case_sensitive: bool,
    },
    /// Drag-drop item id -> target id.
    Mapping(BTreeMap<String, String>),
}

/// A student's answer after normalization against the question's options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Choice(String),
    Choices(BTreeSet<String>),
    Text(String),
    Mapping(BTreeMap<String, String>),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnswerKeyError {
    #[error("question_data must be a JSON object")]
    NotAnObject,
    #[error("{0} question needs at least two options")]
    TooFewOptions(QuestionType),
    #[error("invalid option: {0}")]
    InvalidOption(String),
    #[error("duplicate option id '{0}'")]
    DuplicateOptionId(String),
    #[error("{0} question has no correct answer")]
    MissingCorrectAnswer(QuestionType),
    #[error("correct answer '{0}' does not match any option")]
    UnknownOption(String),
    #[error("single-answer question has {0} correct answers")]
    AmbiguousAnswer(usize),
    #[error("drag-drop question needs items and targets")]
    MissingDragDropParts,
    #[error("drag-drop mapping refers to unknown item or target '{0}'")]
    UnknownMappingId(String),
}

/// Fields owned by the normalizer. Everything else in the blob is kept as is.
const KEY_FIELDS: &[&str] = &[
    "options",
    "items",
    "targets",
    "correctAnswer",
    "correct_answer",
    "correctAnswers",
    "correct_answers",
    "correctMappings",
    "correct_mappings",
    "acceptedAnswers",
    "accepted_answers",
    "caseSensitive",
    "case_sensitive",
];

/// Extra fields that give the answer away and are hidden from students.
const SOLUTION_FIELDS: &[&str] = &["explanation", "analysis", "solution"];

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionData {
    pub question_type: QuestionType,
    pub options: Vec<Choice>,
    pub items: Vec<Choice>,
    pub targets: Vec<Choice>,
    pub key: AnswerKey,
    pub extra: Map<String, Value>,
}

impl QuestionData {
    /// Parses any accepted legacy shape of `question_data`.
    pub fn from_value(question_type: QuestionType, raw: &Value) -> Result<Self, AnswerKeyError> {
        let obj = raw.as_object().ok_or(AnswerKeyError::NotAnObject)?;

        let extra: Map<String, Value> = obj
            .iter()
            .filter(|(k, _)| !KEY_FIELDS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut data = QuestionData {
            question_type,
            options: Vec::new(),
            items: Vec::new(),
            targets: Vec::new(),
            key: AnswerKey::Multiple(BTreeSet::new()),
            extra,
        };

        match question_type {
            QuestionType::SingleChoice | QuestionType::TrueFalse => {
                data.options = parse_choices(field(obj, "options"))?;
                if data.options.is_empty() && question_type == QuestionType::TrueFalse {
                    data.options = true_false_options();
                }
                if data.options.len() < 2 {
                    return Err(AnswerKeyError::TooFewOptions(question_type));
                }
                let ids = resolve_key_ids(obj, &data.options, question_type)?;
                if ids.len() != 1 {
                    return Err(AnswerKeyError::AmbiguousAnswer(ids.len()));
                }
                let id = ids.into_iter().next().ok_or(AnswerKeyError::MissingCorrectAnswer(question_type))?;
                data.key = AnswerKey::Single(id);
            }
            QuestionType::MultipleChoice => {
                data.options = parse_choices(field(obj, "options"))?;
                if data.options.len() < 2 {
                    return Err(AnswerKeyError::TooFewOptions(question_type));
                }
                data.key = AnswerKey::Multiple(resolve_key_ids(obj, &data.options, question_type)?);
            }
            QuestionType::ShortAnswer => {
                let mut accepted: Vec<String> = Vec::new();
                for source in [
                    field(obj, "acceptedAnswers"),
                    field(obj, "correctAnswer"),
                    field(obj, "correctAnswers"),
                ] {
                    for text in text_values(source) {
                        if !accepted.contains(&text) {
                            accepted.push(text);
                        }
                    }
                }
                if accepted.is_empty() {
                    return Err(AnswerKeyError::MissingCorrectAnswer(question_type));
                }
                let case_sensitive = field(obj, "caseSensitive")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                data.key = AnswerKey::Text {
                    accepted,
                    case_sensitive,
                };
            }
            QuestionType::DragDrop => {
                data.items = parse_choices(field(obj, "items"))?;
                data.targets = parse_choices(field(obj, "targets"))?;
                if data.items.is_empty() || data.targets.is_empty() {
                    return Err(AnswerKeyError::MissingDragDropParts);
                }
                let mapping = field(obj, "correctMappings")
                    .map(|raw| resolve_mapping(raw, &data.items, &data.targets, true))
                    .transpose()?
                    .unwrap_or_default();
                if mapping.is_empty() {
                    return Err(AnswerKeyError::MissingCorrectAnswer(question_type));
                }
                data.key = AnswerKey::Mapping(mapping);
            }
        }

        Ok(data)
    }

    /// The standardized JSON written back to `questions.question_data`.
    pub fn to_value(&self) -> Value {
        let mut obj = self.extra.clone();

        match &self.key {
            AnswerKey::Single(id) => {
                obj.insert("options".into(), json!(self.options));
                obj.insert("correctAnswer".into(), json!(id));
                obj.insert("correctAnswers".into(), json!([id]));
            }
            AnswerKey::Multiple(ids) => {
                obj.insert("options".into(), json!(self.options));
                obj.insert("correctAnswers".into(), json!(ids));
            }
            AnswerKey::Text {
                accepted,
                case_sensitive,
            } => {
                obj.insert("correctAnswer".into(), json!(accepted.first()));
                obj.insert("acceptedAnswers".into(), json!(accepted));
                obj.insert("caseSensitive".into(), json!(case_sensitive));
            }
            AnswerKey::Mapping(mapping) => {
                obj.insert("items".into(), json!(self.items));
                obj.insert("targets".into(), json!(self.targets));
                obj.insert("correctMappings".into(), json!(mapping));
            }
        }

        Value::Object(obj)
    }

    /// The answer key alone, as shown on a closed attempt's results.
    pub fn key_value(&self) -> Value {
        match &self.key {
            AnswerKey::Single(id) => json!(id),
            AnswerKey::Multiple(ids) => json!(ids),
            AnswerKey::Text { accepted, .. } => json!(accepted),
            AnswerKey::Mapping(mapping) => json!(mapping),
        }
    }

    /// `question_data` with every answer-revealing field removed.
    pub fn public_value(&self) -> Value {
        let mut obj: Map<String, Value> = self
            .extra
            .iter()
            .filter(|(k, _)| !SOLUTION_FIELDS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        match self.question_type {
            QuestionType::SingleChoice | QuestionType::MultipleChoice | QuestionType::TrueFalse => {
                obj.insert("options".into(), json!(self.options));
            }
            QuestionType::ShortAnswer => {}
            QuestionType::DragDrop => {
                obj.insert("items".into(), json!(self.items));
                obj.insert("targets".into(), json!(self.targets));
            }
        }

        Value::Object(obj)
    }

    /// Normalizes a submitted answer. Returns `None` for an empty or
    /// unusable submission, which is graded as unanswered.
    ///
    /// Unresolvable choice references are kept verbatim so they can never
    /// accidentally match the key.
    pub fn normalize_response(&self, raw: &Value) -> Option<Response> {
        match self.question_type {
            QuestionType::SingleChoice | QuestionType::TrueFalse => {
                let raw = match raw {
                    Value::Array(values) if values.len() == 1 => &values[0],
                    Value::Array(_) => return None,
                    other => other,
                };
                let reference = scalar_text(raw)?;
                Some(Response::Choice(
                    resolve_choice(raw, &self.options).unwrap_or(reference),
                ))
            }
            QuestionType::MultipleChoice => {
                let ids: BTreeSet<String> = choice_references(raw, &self.options)
                    .into_iter()
                    .map(|(value, resolved)| resolved.unwrap_or(value))
                    .collect();
                (!ids.is_empty()).then_some(Response::Choices(ids))
            }
            QuestionType::ShortAnswer => {
                let text = scalar_text(raw)?;
                (!text.trim().is_empty()).then_some(Response::Text(text))
            }
            QuestionType::DragDrop => {
                let mapping = resolve_mapping(raw, &self.items, &self.targets, false).ok()?;
                (!mapping.is_empty()).then_some(Response::Mapping(mapping))
            }
        }
    }
}

/// Looks a key up in camelCase, then snake_case. Null, blank strings and
/// empty arrays count as absent, so a cleared editor field falls through to
/// the next source.
fn field<'a>(obj: &'a Map<String, Value>, camel: &str) -> Option<&'a Value> {
    [obj.get(camel), obj.get(&to_snake_case(camel))]
        .into_iter()
        .flatten()
        .find(|v| !is_blank(v))
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(values) => values.is_empty(),
        _ => false,
    }
}

/// How many options the stored key names, split the way key resolution
/// splits it (`"a, c"` names two). Zero when no key field is set.
pub fn key_reference_count(raw: &Value) -> usize {
    let Some(obj) = raw.as_object() else {
        return 0;
    };
    let options = parse_choices(field(obj, "options")).unwrap_or_default();
    field(obj, "correctAnswers")
        .or_else(|| field(obj, "correctAnswer"))
        .map(|key| choice_references(key, &options).len())
        .unwrap_or(0)
}

fn to_snake_case(camel: &str) -> String {
    let mut out = String::with_capacity(camel.len() + 4);
    for ch in camel.chars() {
        if ch.is_ascii_uppercase() {
            out.push('_');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

fn true_false_options() -> Vec<Choice> {
    vec![
        Choice {
            id: "true".into(),
            text: "True".into(),
        },
        Choice {
            id: "false".into(),
            text: "False".into(),
        },
    ]
}

/// Ids handed out to options given as bare strings: a, b, c, ...
fn generated_id(index: usize) -> String {
    if index < 26 {
        ((b'a' + index as u8) as char).to_string()
    } else {
        format!("opt{}", index + 1)
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(obj) => obj.get("id").and_then(scalar_text),
        _ => None,
    }
}

fn parse_choices(raw: Option<&Value>) -> Result<Vec<Choice>, AnswerKeyError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    let values = raw
        .as_array()
        .ok_or_else(|| AnswerKeyError::InvalidOption("options must be a list".into()))?;

    let mut choices: Vec<Choice> = Vec::with_capacity(values.len());
    for (index, value) in values.iter().enumerate() {
        let choice = match value {
            Value::Object(obj) => {
                let text = ["text", "label", "value", "content"]
                    .iter()
                    .find_map(|k| obj.get(*k).and_then(scalar_text))
                    .ok_or_else(|| AnswerKeyError::InvalidOption(value.to_string()))?;
                let id = obj
                    .get("id")
                    .and_then(scalar_text)
                    .unwrap_or_else(|| generated_id(index));
                Choice { id, text }
            }
            Value::String(_) | Value::Number(_) | Value::Bool(_) => Choice {
                id: generated_id(index),
                text: scalar_text(value).unwrap_or_default(),
            },
            _ => return Err(AnswerKeyError::InvalidOption(value.to_string())),
        };
        if choices.iter().any(|c| c.id == choice.id) {
            return Err(AnswerKeyError::DuplicateOptionId(choice.id));
        }
        choices.push(choice);
    }
    Ok(choices)
}

/// Resolves a reference to one of `choices`: by id, then by text, then as a
/// letter (`"B"`), then as a 0-based index.
fn resolve_choice(value: &Value, choices: &[Choice]) -> Option<String> {
    if let Value::Number(n) = value {
        return n
            .as_u64()
            .and_then(|i| choices.get(i as usize))
            .map(|c| c.id.clone());
    }

    let reference = scalar_text(value)?;
    let reference = reference.trim();

    if let Some(c) = choices.iter().find(|c| c.id == reference) {
        return Some(c.id.clone());
    }
    if let Some(c) = choices
        .iter()
        .find(|c| c.id.eq_ignore_ascii_case(reference) || c.text.trim().eq_ignore_ascii_case(reference))
    {
        return Some(c.id.clone());
    }

    let mut chars = reference.chars();
    if let (Some(letter), None) = (chars.next(), chars.next()) {
        if letter.is_ascii_alphabetic() {
            let index = (letter.to_ascii_lowercase() as u8 - b'a') as usize;
            if let Some(c) = choices.get(index) {
                return Some(c.id.clone());
            }
        }
    }

    reference
        .parse::<usize>()
        .ok()
        .and_then(|i| choices.get(i))
        .map(|c| c.id.clone())
}

/// Splits a submitted or stored choice list into references, each paired
/// with its resolved option id (if any).
fn choice_references(raw: &Value, choices: &[Choice]) -> Vec<(String, Option<String>)> {
    match raw {
        Value::Array(values) => values
            .iter()
            .filter_map(|v| scalar_text(v).map(|text| (text, resolve_choice(v, choices))))
            .collect(),
        Value::String(s) => {
            if let Some(id) = resolve_choice(raw, choices) {
                return vec![(s.clone(), Some(id))];
            }
            s.split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| {
                    let part_value = Value::String(part.to_string());
                    (part.to_string(), resolve_choice(&part_value, choices))
                })
                .collect()
        }
        Value::Null => Vec::new(),
        other => scalar_text(other)
            .map(|text| vec![(text, resolve_choice(other, choices))])
            .unwrap_or_default(),
    }
}

fn resolve_key_ids(
    obj: &Map<String, Value>,
    options: &[Choice],
    question_type: QuestionType,
) -> Result<BTreeSet<String>, AnswerKeyError> {
    let source = if question_type == QuestionType::MultipleChoice {
        field(obj, "correctAnswers").or_else(|| field(obj, "correctAnswer"))
    } else {
        field(obj, "correctAnswer").or_else(|| field(obj, "correctAnswers"))
    };

    let mut ids = BTreeSet::new();
    match source {
        Some(raw) => {
            for (reference, resolved) in choice_references(raw, options) {
                ids.insert(resolved.ok_or(AnswerKeyError::UnknownOption(reference))?);
            }
        }
        None => {
            // Legacy editor rows flag the correct options inline.
            if let Some(Value::Array(raw_options)) = field(obj, "options") {
                for (option, choice) in raw_options.iter().zip(options) {
                    let flagged = option
                        .get("isCorrect")
                        .or_else(|| option.get("is_correct"))
                        .and_then(Value::as_bool)
                        .unwrap_or(false);
                    if flagged {
                        ids.insert(choice.id.clone());
                    }
                }
            }
        }
    }

    if ids.is_empty() {
        return Err(AnswerKeyError::MissingCorrectAnswer(question_type));
    }
    Ok(ids)
}

fn text_values(raw: Option<&Value>) -> Vec<String> {
    let values: Vec<String> = match raw {
        Some(Value::Array(values)) => values.iter().filter_map(scalar_text).collect(),
        Some(value) => scalar_text(value).into_iter().collect(),
        None => Vec::new(),
    };
    values
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Reads a mapping given as `{item: target}` or as a list of
/// `{itemId, targetId}` objects / `[item, target]` pairs.
///
/// With `strict`, unknown ids are an error (answer keys). Without it they are
/// kept verbatim (student submissions).
fn resolve_mapping(
    raw: &Value,
    items: &[Choice],
    targets: &[Choice],
    strict: bool,
) -> Result<BTreeMap<String, String>, AnswerKeyError> {
    let pairs: Vec<(Value, Value)> = match raw {
        Value::Object(obj) => obj
            .iter()
            .map(|(k, v)| (Value::String(k.clone()), v.clone()))
            .collect(),
        Value::Array(entries) => entries
            .iter()
            .filter_map(|entry| match entry {
                Value::Object(pair) => {
                    let item = ["itemId", "item_id", "item", "source", "draggableId"]
                        .iter()
                        .find_map(|k| pair.get(*k))?;
                    let target = ["targetId", "target_id", "target", "zone", "dropZoneId"]
                        .iter()
                        .find_map(|k| pair.get(*k))?;
                    Some((item.clone(), target.clone()))
                }
                Value::Array(pair) if pair.len() == 2 => Some((pair[0].clone(), pair[1].clone())),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };

    let mut mapping = BTreeMap::new();
    for (item, target) in pairs {
        let item_ref = scalar_text(&item).unwrap_or_default();
        let target_ref = scalar_text(&target).unwrap_or_default();
        let item_id = match resolve_choice(&item, items) {
            Some(id) => id,
            None if strict => return Err(AnswerKeyError::UnknownMappingId(item_ref)),
            None => item_ref,
        };
        let target_id = match resolve_choice(&target, targets) {
            Some(id) => id,
            None if strict => return Err(AnswerKeyError::UnknownMappingId(target_ref)),
            None => target_ref,
        };
        mapping.insert(item_id, target_id);
    }
    Ok(mapping)
}
