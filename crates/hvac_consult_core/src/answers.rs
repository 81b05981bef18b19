//! crates/hvac_consult_core/src/answers.rs
//!
//! Turns a raw answer submission (question id -> arbitrary JSON) into typed
//! answers checked against the question catalog.

use crate::domain::{AnswerValue, InputType, Question, QuizAnswer};
use crate::error::ValidationError;
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// A submission as it arrives from the client.
pub type RawAnswers = BTreeMap<String, Value>;

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Validates a full submission. Required questions are checked first, then
/// unknown ids, then each answer against its question's input type.
pub fn validate_answers(
    questions: &[Question],
    raw: &RawAnswers,
) -> Result<BTreeMap<Uuid, QuizAnswer>, ValidationError> {
    let mut by_id: BTreeMap<Uuid, &Value> = BTreeMap::new();
    let mut unknown: Option<&String> = None;
    for (key, value) in raw {
        match Uuid::parse_str(key) {
            Ok(id) if questions.iter().any(|q| q.id == id) => {
                by_id.insert(id, value);
            }
            _ => {
                unknown.get_or_insert(key);
            }
        }
    }

    let mut ordered: Vec<&Question> = questions.iter().collect();
    ordered.sort_by_key(|q| q.order);

    for question in &ordered {
        let provided = by_id.get(&question.id).is_some_and(|v| !is_blank(v));
        if question.is_required && !provided {
            return Err(ValidationError::MissingAnswer(question.question_text.clone()));
        }
    }
    if let Some(key) = unknown {
        return Err(ValidationError::UnknownQuestion(key.clone()));
    }

    let mut answers = BTreeMap::new();
    for question in ordered {
        let Some(value) = by_id.get(&question.id) else {
            continue;
        };
        if let Some(answer) = parse_answer(question, value)? {
            answers.insert(
                question.id,
                QuizAnswer {
                    question_text: question.question_text.clone(),
                    input_type: question.input_type,
                    order: question.order,
                    answer,
                },
            );
        }
    }
    Ok(answers)
}

/// Parses one answer. `Ok(None)` means an optional question was left blank.
pub fn parse_answer(question: &Question, value: &Value) -> Result<Option<AnswerValue>, ValidationError> {
    if value.is_null() {
        return Ok(None);
    }
    let invalid = |reason: &str| ValidationError::InvalidAnswer {
        question: question.question_text.clone(),
        reason: reason.to_string(),
    };
    let allowed = |choice: &str| {
        question
            .options
            .as_ref()
            .map_or(true, |options| options.iter().any(|o| o == choice))
    };

    let answer = match question.input_type {
        InputType::Text | InputType::Email | InputType::Tel => match value {
            Value::String(s) => AnswerValue::Text(s.clone()),
            Value::Number(n) => AnswerValue::Text(n.to_string()),
            _ => return Err(invalid("must be text")),
        },
        InputType::Number => {
            let number = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            match number {
                Some(n) if n.is_finite() => AnswerValue::Number(n),
                _ => return Err(invalid("must be a number")),
            }
        }
        InputType::Radio => match value {
            Value::String(s) if allowed(s.as_str()) => AnswerValue::Choice(s.clone()),
            _ => return Err(invalid("must be one of the provided options")),
        },
        InputType::Checkbox => {
            let Value::Array(items) = value else {
                return Err(invalid("must be a list of options"));
            };
            let mut choices = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => choices.push(s.clone()),
                    _ => return Err(invalid("must be a list of options")),
                }
            }
            let rejected: Vec<String> = choices.iter().filter(|c| !allowed(c.as_str())).cloned().collect();
            if !rejected.is_empty() {
                return Err(ValidationError::InvalidOption {
                    question: question.question_text.clone(),
                    options: rejected,
                });
            }
            AnswerValue::Choices(choices)
        }
    };
    Ok(Some(answer))
}
