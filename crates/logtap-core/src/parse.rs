// ABOUTME: Sanitizes extracted candidates and parses them into records.
// ABOUTME: Strips C0 control characters first so stray bytes from the source don't reject valid objects.

use serde_json::Value;
use thiserror::Error;

use crate::record::NewRecord;

/// Why a candidate was rejected.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a json object, got {0}")]
    NotAnObject(&'static str),
}

/// Remove every character in the C0 control range (U+0000..=U+001F).
///
/// Newlines and tabs go too. Between tokens they are insignificant, and inside
/// string literals they would be rejected by the parser.
pub fn sanitize(candidate: &str) -> String {
    candidate.chars().filter(|c| !matches!(c, '\u{0}'..='\u{1f}')).collect()
}

/// Sanitize and parse a candidate. The creation timestamp is taken here, at
/// the moment parsing succeeds.
pub fn parse_candidate(candidate: &str) -> Result<NewRecord, ParseError> {
    let cleaned = sanitize(candidate);
    match serde_json::from_str::<Value>(&cleaned)? {
        Value::Object(payload) => Ok(NewRecord::new(payload)),
        other => Err(ParseError::NotAnObject(kind_name(&other))),
    }
}

fn kind_name(value: &Value) -> &'static str {
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
    fn sanitize_strips_control_characters() {
        assert_eq!(sanitize("{\u{1}\"a\"\t:\r\n1\u{1f}}"), r#"{"a":1}"#);
    }

    #[test]
    fn sanitize_keeps_printable_and_unicode() {
        let s = r#"{"msg":"héllo ✓ \u0007"}"#;
        assert_eq!(sanitize(s), s);
    }

    #[test]
    fn raw_control_bytes_inside_strings_are_tolerated() {
        let record = parse_candidate("{\"msg\":\"line one\u{7}\nline two\"}").unwrap();
        assert_eq!(record.payload["msg"], "line oneline two");
    }

    #[test]
    fn escaped_controls_survive() {
        let record = parse_candidate(r#"{"msg":"tab\there"}"#).unwrap();
        assert_eq!(record.payload["msg"], "tab\there");
    }

    #[test]
    fn malformed_candidate_is_an_error() {
        let err = parse_candidate(r#"{"a": 1,}"#).unwrap_err();
        assert!(matches!(err, ParseError::Json(_)));
        assert!(err.to_string().starts_with("invalid json"));
    }

    #[test]
    fn non_object_is_rejected() {
        let err = parse_candidate("[1, 2]").unwrap_err();
        assert!(matches!(err, ParseError::NotAnObject("array")));
    }

    #[test]
    fn timestamp_is_taken_at_parse_time() {
        let before = chrono::Utc::now();
        let record = parse_candidate(r#"{"a":1}"#).unwrap();
        let after = chrono::Utc::now();
        assert!(record.created_at >= before && record.created_at <= after);
    }
}
