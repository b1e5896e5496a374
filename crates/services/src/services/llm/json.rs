//! Tolerant extraction of JSON payloads from model output.
//!
//! Models wrap JSON in code fences, prefix it with prose, or return a list
//! where an object was asked for. Everything that cannot be coerced into the
//! expected shape becomes [`LlmError::Parse`].

use serde_json::{Map, Value};

use super::LlmError;

/// Removes a surrounding Markdown code fence (```json ... ```), if any.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json", "JSON", ...) up to the first newline.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// Parses the first JSON value found in `raw`.
pub fn extract_json(raw: &str) -> Result<Value, LlmError> {
    let cleaned = strip_code_fence(raw);
    if cleaned.is_empty() {
        return Err(LlmError::Parse("empty response".to_string()));
    }

    if let Ok(value) = serde_json::from_str::<Value>(cleaned) {
        return Ok(value);
    }

    // Prose around the payload: take the widest {...} or [...] span.
    let start = cleaned.find(['{', '[']);
    let end = cleaned.rfind(['}', ']']);
    if let (Some(start), Some(end)) = (start, end) {
        if end > start {
            if let Ok(value) = serde_json::from_str::<Value>(&cleaned[start..=end]) {
                return Ok(value);
            }
        }
    }

    Err(LlmError::Parse(format!(
        "response is not JSON: {}",
        cleaned.chars().take(120).collect::<String>()
    )))
}

/// Coerces a parsed value into an object, taking the first element of a list.
pub fn expect_object(value: Value) -> Result<Map<String, Value>, LlmError> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Array(items) => match items.into_iter().next() {
            Some(Value::Object(map)) => Ok(map),
            Some(other) => Err(LlmError::Parse(format!(
                "list element is not an object: {}",
                type_name(&other)
            ))),
            None => Err(LlmError::Parse("empty list".to_string())),
        },
        other => Err(LlmError::Parse(format!(
            "expected an object, got {}",
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
