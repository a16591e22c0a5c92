//! Structured replies returned by prompts under test
//!
//! Models are asked for a JSON object, but nothing guarantees they comply.
//! Only text that is not JSON, or JSON that is not an object, is rejected.
//! Every field is read leniently: absent or oddly typed values fall back to
//! their defaults.

use serde::Serialize;
use serde_json::{Map, Value};

/// Parsed form of a structured model reply.
///
/// Only `is_end` and `message` drive the simulation; the quiz bookkeeping
/// fields are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuredReply {
    pub total_round: i64,
    pub answer_count: i64,
    pub current_answer: String,
    pub hint: Vec<String>,
    pub check_answer: bool,
    pub is_end: bool,
    pub message: String,
}

impl Default for StructuredReply {
    fn default() -> Self {
        Self {
            total_round: 1,
            answer_count: 0,
            current_answer: String::new(),
            hint: Vec::new(),
            check_answer: false,
            is_end: false,
            message: String::new(),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ReplyParseError {
    #[error("reply is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("reply is a JSON {0}, expected an object")]
    NotAnObject(&'static str),
}

impl StructuredReply {
    pub fn parse(raw: &str) -> Result<Self, ReplyParseError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| ReplyParseError::InvalidJson(e.to_string()))?;

        match value {
            Value::Object(fields) => Ok(Self::from_fields(&fields)),
            other => Err(ReplyParseError::NotAnObject(json_kind(&other))),
        }
    }

    fn from_fields(fields: &Map<String, Value>) -> Self {
        let defaults = Self::default();
        Self {
            total_round: read(fields, "total_round", as_count).unwrap_or(defaults.total_round),
            answer_count: read(fields, "answer_count", as_count).unwrap_or(defaults.answer_count),
            current_answer: read(fields, "current_answer", as_text)
                .unwrap_or(defaults.current_answer),
            hint: read(fields, "hint", as_hints).unwrap_or(defaults.hint),
            check_answer: read(fields, "check_answer", as_flag).unwrap_or(defaults.check_answer),
            is_end: read(fields, "is_end", as_flag).unwrap_or(defaults.is_end),
            message: read(fields, "message", as_text).unwrap_or(defaults.message),
        }
    }
}

fn read<T>(
    fields: &Map<String, Value>,
    name: &str,
    convert: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    let value = fields.get(name)?;
    let converted = convert(value);
    if converted.is_none() && !value.is_null() {
        tracing::debug!(field = name, kind = json_kind(value), "ignoring reply field of unexpected type");
    }
    converted
}

/// Integers, integral floats and numeric strings
fn as_count(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Only real booleans; `"true"` is not a flag
fn as_flag(value: &Value) -> Option<bool> {
    value.as_bool()
}

/// Strings as-is, scalars and containers as their JSON text
fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// A list of hints, or a single hint given as a bare string
fn as_hints(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => Some(items.iter().filter_map(as_text).collect()),
        Value::String(s) => Some(vec![s.clone()]),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_take_defaults() {
        let reply = StructuredReply::parse("{}").unwrap();
        assert_eq!(reply, StructuredReply::default());
        assert_eq!(reply.total_round, 1);
        assert_eq!(reply.answer_count, 0);
        assert!(reply.hint.is_empty());
        assert!(!reply.is_end);
        assert_eq!(reply.message, "");
    }

    #[test]
    fn test_partial_reply_keeps_given_fields() {
        let reply = StructuredReply::parse(r#"{"message":"bye","is_end":true}"#).unwrap();
        assert_eq!(reply.message, "bye");
        assert!(reply.is_end);
        assert_eq!(reply.total_round, 1);
        assert!(!reply.check_answer);
    }

    #[test]
    fn test_full_reply() {
        let raw = r#"{
            "total_round": 3,
            "answer_count": 2,
            "current_answer": "Paris",
            "hint": ["capital", "France"],
            "check_answer": true,
            "is_end": false,
            "message": "Correct!",
            "extra": "ignored"
        }"#;
        let reply = StructuredReply::parse(raw).unwrap();
        assert_eq!(reply.total_round, 3);
        assert_eq!(reply.hint, vec!["capital", "France"]);
        assert!(reply.check_answer);
        assert_eq!(reply.current_answer, "Paris");
    }

    #[test]
    fn test_plain_text_is_rejected() {
        let err = StructuredReply::parse("not json").unwrap_err();
        assert!(matches!(err, ReplyParseError::InvalidJson(_)));
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert!(matches!(
            StructuredReply::parse(r#"["hi", true]"#).unwrap_err(),
            ReplyParseError::NotAnObject("array")
        ));
        assert!(matches!(
            StructuredReply::parse(r#""hello""#).unwrap_err(),
            ReplyParseError::NotAnObject("string")
        ));
    }

    #[test]
    fn test_null_fields_take_defaults() {
        let reply = StructuredReply::parse(
            r#"{"message":"hi","is_end":true,"hint":null,"total_round":null,"current_answer":null}"#,
        )
        .unwrap();
        assert_eq!(reply.message, "hi");
        assert!(reply.is_end);
        assert!(reply.hint.is_empty());
        assert_eq!(reply.total_round, 1);
        assert_eq!(reply.current_answer, "");
    }

    #[test]
    fn test_counts_accept_floats_and_numeric_strings() {
        let reply =
            StructuredReply::parse(r#"{"total_round":2.0,"answer_count":"3","message":"ok"}"#)
                .unwrap();
        assert_eq!(reply.total_round, 2);
        assert_eq!(reply.answer_count, 3);

        let reply = StructuredReply::parse(r#"{"total_round":2.5,"answer_count":"many"}"#).unwrap();
        assert_eq!(reply.total_round, 1);
        assert_eq!(reply.answer_count, 0);
    }

    #[test]
    fn test_single_hint_string_becomes_list() {
        let reply = StructuredReply::parse(r#"{"hint":"try harder"}"#).unwrap();
        assert_eq!(reply.hint, vec!["try harder"]);

        let reply = StructuredReply::parse(r#"{"hint":["a", 2, null]}"#).unwrap();
        assert_eq!(reply.hint, vec!["a", "2"]);

        let reply = StructuredReply::parse(r#"{"hint":{"first":"a"}}"#).unwrap();
        assert!(reply.hint.is_empty());
    }

    #[test]
    fn test_flags_require_booleans() {
        let reply = StructuredReply::parse(r#"{"is_end":"yes","check_answer":1}"#).unwrap();
        assert!(!reply.is_end);
        assert!(!reply.check_answer);
    }

    #[test]
    fn test_non_string_message_is_kept_as_json_text() {
        let reply = StructuredReply::parse(r#"{"message":4}"#).unwrap();
        assert_eq!(reply.message, "4");

        let reply = StructuredReply::parse(r#"{"message":{"text":"hi"}}"#).unwrap();
        assert_eq!(reply.message, r#"{"text":"hi"}"#);
    }
}
