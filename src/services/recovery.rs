// src/services/recovery.rs
//! Recovers the JSON object a model was asked to return from its raw text.

use serde_json::{Map, Value};

use crate::errors::AnalyzerError;

/// Parses model text that may be wrapped in a code fence or surrounded by
/// prose. Succeeds only with a fully valid JSON document.
pub fn recover_json(raw: &str) -> Result<Value, AnalyzerError> {
    let cleaned = strip_code_fence(raw.trim());

    let direct_err = match serde_json::from_str::<Value>(cleaned) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if start < end {
            return serde_json::from_str(&cleaned[start..=end]).map_err(|e| {
                AnalyzerError::MalformedPayload(format!("invalid JSON object: {}", e))
            });
        }
    }

    Err(AnalyzerError::MalformedPayload(format!(
        "no JSON object found: {}",
        direct_err
    )))
}

/// Like [`recover_json`], but the document must be an object.
pub fn recover_object(raw: &str) -> Result<Map<String, Value>, AnalyzerError> {
    match recover_json(raw)? {
        Value::Object(map) => Ok(map),
        other => Err(AnalyzerError::MalformedPayload(format!(
            "expected a JSON object, got {}",
            kind_of(&other)
        ))),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.trim_start_matches('`');
    // drop an info string such as "json" on the opening line
    let rest = match rest.find('\n') {
        Some(newline) if !rest[..newline].contains('{') => &rest[newline + 1..],
        _ => rest,
    };
    rest.trim_end().trim_end_matches('`').trim()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_object() {
        assert_eq!(recover_json(r#"{"a": 1}"#).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn fenced_object_after_prose() {
        let text = "Here you go:\n```json\n{\"a\":1}\n```";
        assert_eq!(recover_json(text).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn fenced_object_with_language_tag() {
        let text = "```json\n{\"title\": \"Switch\", \"prices\": [1, 2]}\n```";
        assert_eq!(
            recover_object(text).unwrap().get("title"),
            Some(&json!("Switch"))
        );
    }

    #[test]
    fn fence_without_newline() {
        assert_eq!(recover_json("```{\"a\":2}```").unwrap(), json!({"a": 2}));
    }

    #[test]
    fn trailing_prose() {
        let text = "{\"a\": {\"b\": true}} hope this helps!";
        assert_eq!(recover_json(text).unwrap(), json!({"a": {"b": true}}));
    }

    #[test]
    fn no_braces_fails() {
        let err = recover_json("I could not identify the item.").unwrap_err();
        assert!(matches!(err, AnalyzerError::MalformedPayload(_)));
    }

    #[test]
    fn broken_object_fails_instead_of_partial() {
        let err = recover_json("result: {\"a\": 1, \"b\": } done").unwrap_err();
        assert!(matches!(err, AnalyzerError::MalformedPayload(_)));
    }

    #[test]
    fn non_object_payload_rejected_for_object_consumers() {
        assert_eq!(recover_json("[1, 2]").unwrap(), json!([1, 2]));
        assert!(matches!(
            recover_object("[1, 2]"),
            Err(AnalyzerError::MalformedPayload(_))
        ));
    }
}
