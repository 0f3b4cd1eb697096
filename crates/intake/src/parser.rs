//! Turns a chat message into a [`ConsultationRecord`].
//!
//! Two shapes are accepted: a JSON object, or human-typed `Label: value`
//! lines with an optional "New consultation request" title line.

use serde_json::{Map, Value};
use shared::domain::{ConsultationRecord, ValidationPolicy};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("message looks like JSON but is not a valid object: {0}")]
    InvalidJson(String),
    #[error("no fields found")]
    NoFields,
    #[error("missing required fields: {}", .0.join(", "))]
    MissingRequired(Vec<&'static str>),
}

const TITLE_LINES: [&str; 2] = ["new consultation request", "consultation request"];

/// Label drift seen in typed submissions, keyed by the lowercased label with
/// whitespace collapsed to single spaces.
const SYNONYMS: &[(&str, &str)] = &[
    ("consultation type", "consultation_type"),
    ("type of consultation", "consultation_type"),
    ("consultation", "consultation_type"),
    ("full name", "name"),
    ("patient name", "name"),
    ("patient", "name"),
    ("phone number", "phone"),
    ("telephone", "phone"),
    ("mobile", "phone"),
    ("tel", "phone"),
    ("e-mail", "email"),
    ("email address", "email"),
    ("mail", "email"),
    ("preferred date", "date"),
    ("appointment date", "date"),
    ("comment", "message"),
    ("comments", "message"),
    ("details", "message"),
];

/// Parses with the default [`ValidationPolicy`].
pub fn parse(text: &str) -> Option<ConsultationRecord> {
    parse_with_policy(text, ValidationPolicy::default()).ok()
}

pub fn parse_with_policy(
    text: &str,
    policy: ValidationPolicy,
) -> Result<ConsultationRecord, ParseError> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        return parse_json(trimmed);
    }

    let record = parse_lines(trimmed)?;
    let missing = record.missing_required(policy);
    if !missing.is_empty() {
        return Err(ParseError::MissingRequired(missing));
    }
    Ok(record)
}

/// Lowercases a label, maps known synonyms onto field names and joins any
/// remaining words with underscores.
pub fn normalize_key(raw: &str) -> String {
    let collapsed = raw
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    SYNONYMS
        .iter()
        .find(|(label, _)| *label == collapsed)
        .map(|(_, field)| field.to_string())
        .unwrap_or_else(|| collapsed.replace(' ', "_"))
}

fn parse_json(text: &str) -> Result<ConsultationRecord, ParseError> {
    let object: Map<String, Value> =
        serde_json::from_str(text).map_err(|e| ParseError::InvalidJson(e.to_string()))?;

    let mut record = ConsultationRecord::default();
    for (key, value) in object {
        match value {
            Value::Null => {}
            Value::String(text) => record.set(&key, text),
            other => record.set(&key, other.to_string()),
        }
    }

    if record.is_empty() {
        return Err(ParseError::NoFields);
    }
    Ok(record)
}

fn parse_lines(text: &str) -> Result<ConsultationRecord, ParseError> {
    let mut lines = text.lines().peekable();
    if lines.peek().is_some_and(|first| is_title_line(first)) {
        lines.next();
    }

    let mut record = ConsultationRecord::default();
    for line in lines {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = normalize_key(key);
        let value = value.trim();
        if key.is_empty() || value.is_empty() {
            continue;
        }
        record.set(&key, value);
    }

    if record.is_empty() {
        return Err(ParseError::NoFields);
    }
    Ok(record)
}

fn is_title_line(line: &str) -> bool {
    let line = line.trim().trim_end_matches(':').trim();
    TITLE_LINES
        .iter()
        .any(|title| line.eq_ignore_ascii_case(title))
}

#[cfg(test)]
#[path = "tests/parser_tests.rs"]
mod tests;
