//! Structured output parsing
//!
//! Models are asked for "JSON only" but routinely wrap it in prose or a
//! markdown fence. Every stage that consumes structured output goes through
//! these functions and decides its own fallback on `Err`.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Failure to recover structured data from model output
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum StructuredOutputError {
    #[error("no JSON {0} found in output")]
    NotFound(&'static str),

    #[error("invalid JSON: {0}")]
    Invalid(String),

    #[error("expected {expected}, got {found}")]
    WrongShape {
        expected: &'static str,
        found: &'static str,
    },
}

/// Parse the first JSON object in `content`.
pub fn parse_json_object(content: &str) -> Result<Map<String, Value>, StructuredOutputError> {
    match parse_json_value(content, '{', '}', "object")? {
        Value::Object(map) => Ok(map),
        other => Err(StructuredOutputError::WrongShape {
            expected: "object",
            found: shape_of(&other),
        }),
    }
}

/// Parse the first JSON array in `content`.
pub fn parse_json_array(content: &str) -> Result<Vec<Value>, StructuredOutputError> {
    match parse_json_value(content, '[', ']', "array")? {
        Value::Array(items) => Ok(items),
        other => Err(StructuredOutputError::WrongShape {
            expected: "array",
            found: shape_of(&other),
        }),
    }
}

/// Parse the first JSON array in `content` into typed items.
pub fn parse_json_list<T: DeserializeOwned>(content: &str) -> Result<Vec<T>, StructuredOutputError> {
    let items = parse_json_array(content)?;
    serde_json::from_value(Value::Array(items))
        .map_err(|e| StructuredOutputError::Invalid(e.to_string()))
}

fn parse_json_value(
    content: &str,
    open: char,
    close: char,
    label: &'static str,
) -> Result<Value, StructuredOutputError> {
    let trimmed = content.trim();

    // Whole response is the payload
    if trimmed.starts_with(open) {
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            return Ok(value);
        }
    }

    let candidate = extract_fenced(trimmed)
        .filter(|body| body.trim_start().starts_with(open))
        .or_else(|| extract_balanced(trimmed, open, close))
        .ok_or(StructuredOutputError::NotFound(label))?;

    serde_json::from_str(candidate.trim()).map_err(|e| StructuredOutputError::Invalid(e.to_string()))
}

/// Body of the first ``` fence, with or without a language tag.
fn extract_fenced(content: &str) -> Option<&str> {
    let start = content.find("```")?;
    let after = &content[start + 3..];
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after[body_start..];
    let end = body.find("```")?;
    Some(&body[..end])
}

/// First balanced `open`..`close` span, skipping delimiters inside strings.
fn extract_balanced(content: &str, open: char, close: char) -> Option<&str> {
    let start = content.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in content[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&content[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

fn shape_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_plain_object() {
        let map = parse_json_object(r#"{"party_a": "Acme"}"#).unwrap();
        assert_eq!(map["party_a"], "Acme");
    }

    #[test]
    fn test_object_in_prose() {
        let map = parse_json_object("Sure! Here are the facts: {\"term\": \"12 months\"} Hope it helps.")
            .unwrap();
        assert_eq!(map["term"], "12 months");
    }

    #[test]
    fn test_fenced_array() {
        let content = "```json\n[{\"date\": \"2024-03-01\", \"description\": \"Delivery\"}]\n```";
        let items = parse_json_array(content).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_braces_inside_strings() {
        let map = parse_json_object(r#"note {"clause": "use {{name}} here"} end"#).unwrap();
        assert_eq!(map["clause"], "use {{name}} here");
    }

    #[test]
    fn test_missing_payload() {
        assert_eq!(
            parse_json_array("no structure here"),
            Err(StructuredOutputError::NotFound("array"))
        );
    }

    #[test]
    fn test_truncated_payload_is_not_found() {
        assert!(parse_json_object(r#"{"a": 1"#).is_err());
    }

    #[test]
    fn test_typed_list() {
        #[derive(Deserialize)]
        struct Item {
            date: String,
        }

        let items: Vec<Item> = parse_json_list(r#"[{"date": "20240301"}]"#).unwrap();
        assert_eq!(items[0].date, "20240301");

        let bad: Result<Vec<Item>, _> = parse_json_list(r#"[{"when": 1}]"#);
        assert!(matches!(bad, Err(StructuredOutputError::Invalid(_))));
    }
}
