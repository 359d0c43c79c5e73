use log::debug;
use serde_json::{Map, Value};

use crate::error::{DevPulseError, Result};
use crate::models::InsightCandidate;

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_TEXT_CHARS: usize = 2000;
pub const PRIORITY_RANGE: std::ops::RangeInclusive<i64> = 1..=5;

const DOCUMENT: &str = "<document>";
const FIELDS: [&str; 4] = ["title", "description", "recommendation", "priority"];

/// Turns raw model output into an [`InsightCandidate`].
///
/// Anything short of a JSON object with `title`, `description`,
/// `recommendation` and `priority` is a [`DevPulseError::SchemaViolation`]
/// naming the offending field and carrying the raw text. Values are never
/// coerced: an out-of-range or non-integer priority is rejected, not clamped.
pub fn validate(raw: &str) -> Result<InsightCandidate> {
    let body = strip_code_fence(raw);

    let value: Value = serde_json::from_str(body)
        .map_err(|e| DevPulseError::schema(DOCUMENT, format!("not valid JSON: {e}"), raw))?;

    let Value::Object(fields) = value else {
        return Err(DevPulseError::schema(DOCUMENT, "expected a JSON object", raw));
    };

    let ignored = ignored_fields(&fields);
    if !ignored.is_empty() {
        debug!("Ignoring extra fields in model output: {}", ignored.join(", "));
    }

    Ok(InsightCandidate {
        title: text_field(&fields, "title", MAX_TITLE_CHARS, raw)?,
        description: text_field(&fields, "description", MAX_TEXT_CHARS, raw)?,
        recommendation: text_field(&fields, "recommendation", MAX_TEXT_CHARS, raw)?,
        priority: priority_field(&fields, raw)?,
    })
}

fn ignored_fields(fields: &Map<String, Value>) -> Vec<&str> {
    fields
        .keys()
        .map(String::as_str)
        .filter(|key| !FIELDS.contains(key))
        .collect()
}

/// Models often wrap JSON in a markdown fence; accept that one wrapping only.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(inner) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. `json`) on the opening line.
    match inner.split_once('\n') {
        Some((_, body)) => body.trim(),
        None => inner.trim(),
    }
}

fn text_field(fields: &Map<String, Value>, name: &str, max_chars: usize, raw: &str) -> Result<String> {
    let value = fields
        .get(name)
        .ok_or_else(|| DevPulseError::schema(name, "missing", raw))?;

    let Value::String(text) = value else {
        return Err(DevPulseError::schema(
            name,
            format!("expected a string, got {}", type_name(value)),
            raw,
        ));
    };

    let text = text.trim();
    if text.is_empty() {
        return Err(DevPulseError::schema(name, "must not be empty", raw));
    }

    let chars = text.chars().count();
    if chars > max_chars {
        return Err(DevPulseError::schema(
            name,
            format!("{chars} characters exceeds the limit of {max_chars}"),
            raw,
        ));
    }

    Ok(text.to_string())
}

fn priority_field(fields: &Map<String, Value>, raw: &str) -> Result<u8> {
    let value = fields
        .get("priority")
        .ok_or_else(|| DevPulseError::schema("priority", "missing", raw))?;

    let priority = match value {
        Value::Number(n) => n.as_i64().ok_or_else(|| {
            DevPulseError::schema("priority", format!("expected an integer, got {n}"), raw)
        })?,
        other => {
            return Err(DevPulseError::schema(
                "priority",
                format!("expected an integer, got {}", type_name(other)),
                raw,
            ))
        }
    };

    if !PRIORITY_RANGE.contains(&priority) {
        return Err(DevPulseError::schema(
            "priority",
            format!(
                "{priority} is outside {}..={}",
                PRIORITY_RANGE.start(),
                PRIORITY_RANGE.end()
            ),
            raw,
        ));
    }

    // In range 1..=5, so the narrowing is lossless.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok(priority as u8)
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
