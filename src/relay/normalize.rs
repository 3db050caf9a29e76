//! Turning a notification's `Message` into a broadcast payload.
//!
//! Publishers of this topic emit Python-style literals (`{'opinionId': '42'}`)
//! rather than JSON. Normalization rewrites every single quote to a double
//! quote and then parses the result. This is a textual substitution, not a
//! parser: an apostrophe inside a text value (`'it's'`) becomes a stray
//! quote and the message is rejected or mangled.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("notification has no Message")]
    Missing,

    #[error("Message must be a string, found {found}")]
    NotText { found: &'static str },

    #[error("Message is not valid JSON after quote rewrite: {0}")]
    Json(#[from] serde_json::Error),
}

/// Article and name of a JSON value's type, for error messages.
pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Borrows the text of an envelope's `Message` field.
pub fn message_text(message: Option<&Value>) -> Result<&str, NormalizeError> {
    match message {
        None | Some(Value::Null) => Err(NormalizeError::Missing),
        Some(Value::String(text)) => Ok(text),
        Some(other) => Err(NormalizeError::NotText {
            found: kind_of(other),
        }),
    }
}

/// Rewrites single quotes to double quotes.
pub fn rewrite_quotes(raw: &str) -> String {
    raw.replace('\'', "\"")
}

/// Parses `raw` as JSON after [`rewrite_quotes`].
pub fn normalize(raw: &str) -> Result<Value, NormalizeError> {
    Ok(serde_json::from_str(&rewrite_quotes(raw))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn python_style_literal() {
        let value = normalize("{'opinionId':'42','opinions':['x']}").unwrap();
        assert_eq!(value, json!({"opinionId": "42", "opinions": ["x"]}));
        assert_eq!(
            serde_json::to_string(&value).unwrap(),
            r#"{"opinionId":"42","opinions":["x"]}"#
        );
    }

    #[test]
    fn already_valid_json_is_unchanged() {
        let value = normalize(r#"{"opinionId": "7", "opinions": []}"#).unwrap();
        assert_eq!(value, json!({"opinionId": "7", "opinions": []}));
    }

    #[test]
    fn quoting_convention_does_not_change_the_payload() {
        let single = normalize("{'a': ['b', 'c'], 'n': 1}").unwrap();
        let double = normalize(r#"{"a": ["b", "c"], "n": 1}"#).unwrap();
        assert_eq!(single, double);
    }

    #[test]
    fn apostrophe_in_text_breaks_the_heuristic() {
        assert!(matches!(
            normalize("{'note': 'it's up'}"),
            Err(NormalizeError::Json(_))
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(normalize("hello"), Err(NormalizeError::Json(_))));
        assert!(matches!(normalize(""), Err(NormalizeError::Json(_))));
    }

    #[test]
    fn message_text_requires_a_string() {
        assert_eq!(message_text(Some(&json!("x"))).unwrap(), "x");
        assert!(matches!(message_text(None), Err(NormalizeError::Missing)));
        assert!(matches!(
            message_text(Some(&Value::Null)),
            Err(NormalizeError::Missing)
        ));
        assert!(matches!(
            message_text(Some(&json!({"a": 1}))),
            Err(NormalizeError::NotText { found: "an object" })
        ));
    }
}
