//! Structured parsing of free-text model output.
//!
//! Generation models are asked for JSON but regularly wrap it in prose or
//! return plain text. Every parser here returns a [`Parsed`] value: either
//! the structured result or the untouched [`RawText`], and each enrichment
//! field has an explicit fallback for the raw branch. Malformed output is
//! never an error.

use serde_json::Value;

use crate::models::{ClauseType, PolicyType};

/// Model output that could not be parsed as the requested structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawText(pub String);

pub type Parsed<T> = Result<T, RawText>;

/// Slice from the first `[` to the last `]`, if any.
pub fn json_array_span(text: &str) -> Option<&str> {
    span(text, '[', ']')
}

/// Slice from the first `{` to the last `}`, if any.
pub fn json_object_span(text: &str) -> Option<&str> {
    span(text, '{', '}')
}

fn span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

/// Parse a JSON array of strings embedded anywhere in `text`.
///
/// Non-string elements are stringified; blank elements are dropped.
pub fn parse_string_list(text: &str) -> Parsed<Vec<String>> {
    let raw = || RawText(text.to_string());
    let slice = json_array_span(text).ok_or_else(raw)?;
    let values: Vec<Value> = serde_json::from_str(slice).map_err(|_| raw())?;
    Ok(values
        .into_iter()
        .map(|v| match v {
            Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        })
        .filter(|s| !s.is_empty())
        .collect())
}

/// Parse a JSON object embedded anywhere in `text`.
pub fn parse_object(text: &str) -> Parsed<serde_json::Map<String, Value>> {
    let raw = || RawText(text.to_string());
    let slice = json_object_span(text).ok_or_else(raw)?;
    serde_json::from_str(slice).map_err(|_| raw())
}

/// Keywords: JSON array, else comma-separated.
pub fn keywords(text: &str) -> Vec<String> {
    parse_string_list(text).unwrap_or_else(|RawText(raw)| {
        raw.split(',')
            .map(clean_item)
            .filter(|s| !s.is_empty())
            .collect()
    })
}

/// Questions: JSON array, else every line containing a `?`.
pub fn questions(text: &str) -> Vec<String> {
    parse_string_list(text).unwrap_or_else(|RawText(raw)| {
        raw.lines()
            .filter(|line| line.contains('?'))
            .map(clean_item)
            .filter(|s| !s.is_empty())
            .collect()
    })
}

/// Requirements: JSON array, else the whole text as a single requirement.
pub fn requirements(text: &str) -> Vec<String> {
    parse_string_list(text).unwrap_or_else(|RawText(raw)| {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![trimmed.to_string()]
        }
    })
}

/// `(policy_type, clause_type)` from a JSON object, each defaulting
/// independently to `General` / `Requirement`.
pub fn classification(text: &str) -> (PolicyType, ClauseType) {
    match parse_object(text) {
        Ok(obj) => {
            let policy = obj
                .get("policy_type")
                .and_then(Value::as_str)
                .and_then(PolicyType::parse_lenient)
                .unwrap_or_default();
            let clause = obj
                .get("clause_type")
                .and_then(Value::as_str)
                .and_then(ClauseType::parse_lenient)
                .unwrap_or_default();
            (policy, clause)
        }
        Err(_) => (PolicyType::default(), ClauseType::default()),
    }
}

/// Trim whitespace, list markers and quotes from one fallback item.
fn clean_item(item: &str) -> String {
    let mut s = item.trim();
    // Numbered markers: "1." or "2)"
    let digits = s.len() - s.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits > 0 {
        let rest = &s[digits..];
        if let Some(r) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            s = r.trim_start();
        }
    }
    s = s.trim_start_matches(['-', '*', '•']).trim();
    s.trim_matches(['"', '\'']).trim().to_string()
}
