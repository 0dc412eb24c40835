//! Tolerant parsing of model output.

use serde_json::{json, Deserializer, Map, Value};
use tracing::warn;

use crate::metrics;

pub const NO_STRUCTURE_MESSAGE: &str = "Could not parse structured response from LLM";

/// Result of parsing a raw model response.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// A JSON object found in the response.
    Structured(Value),
    /// No usable object; the raw text is kept with a diagnostic.
    Fallback { raw: String, reason: String },
}

impl ParseOutcome {
    pub fn is_fallback(&self) -> bool {
        matches!(self, ParseOutcome::Fallback { .. })
    }

    /// The value stored as the analysis result.
    pub fn into_value(self) -> Value {
        match self {
            ParseOutcome::Structured(value) => value,
            ParseOutcome::Fallback { raw, reason } => json!({
                "summary": raw,
                "parse_error": reason,
            }),
        }
    }
}

/// Extract the JSON object that starts at the first `{`.
///
/// Malformed output never fails: it produces [`ParseOutcome::Fallback`].
pub fn parse_response(raw: &str) -> ParseOutcome {
    let outcome = find_object(raw);
    if let ParseOutcome::Fallback { reason, .. } = &outcome {
        warn!(reason = %reason, "Model response was not structured");
        metrics::PARSER_FALLBACKS.inc();
    }
    outcome
}

fn find_object(raw: &str) -> ParseOutcome {
    let Some(start) = raw.find('{') else {
        return fallback(raw, NO_STRUCTURE_MESSAGE.to_string());
    };
    if !raw[start..].contains('}') {
        return fallback(raw, NO_STRUCTURE_MESSAGE.to_string());
    }

    // One streaming pass; whatever follows the object is ignored.
    let mut values = Deserializer::from_str(&raw[start..]).into_iter::<Map<String, Value>>();
    match values.next() {
        Some(Ok(object)) => ParseOutcome::Structured(Value::Object(object)),
        Some(Err(e)) => fallback(raw, format!("Invalid JSON in LLM response: {}", e)),
        None => fallback(raw, NO_STRUCTURE_MESSAGE.to_string()),
    }
}

fn fallback(raw: &str, reason: String) -> ParseOutcome {
    ParseOutcome::Fallback {
        raw: raw.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_object() {
        let outcome = parse_response(r#"{"summary": "X"}"#);
        assert_eq!(outcome, ParseOutcome::Structured(json!({"summary": "X"})));
    }

    #[test]
    fn test_object_surrounded_by_prose() {
        let outcome = parse_response(r#"Here you go: {"summary":"Y"} thanks"#);
        assert_eq!(outcome.into_value(), json!({"summary": "Y"}));
    }

    #[test]
    fn test_nested_object_is_kept_whole() {
        let raw = r#"Result: {"personal_info": {"name": "Jane"}, "skills": {"technical": ["Rust"]}}"#;
        let value = parse_response(raw).into_value();
        assert_eq!(value["personal_info"]["name"], "Jane");
        assert_eq!(value["skills"]["technical"][0], "Rust");
    }

    #[test]
    fn test_trailing_brace_in_prose_is_skipped() {
        let raw = r#"{"summary": "Z"} (note: ignore the } here)"#;
        assert_eq!(parse_response(raw).into_value(), json!({"summary": "Z"}));
    }

    #[test]
    fn test_code_fence_is_tolerated() {
        let raw = "```json\n{\"summary\": \"fenced\"}\n```";
        assert_eq!(parse_response(raw).into_value()["summary"], "fenced");
    }

    #[test]
    fn test_plain_text_falls_back() {
        let outcome = parse_response("plain text");
        assert!(outcome.is_fallback());

        let value = outcome.into_value();
        assert_eq!(value["summary"], "plain text");
        assert_eq!(value["parse_error"], NO_STRUCTURE_MESSAGE);
    }

    #[test]
    fn test_invalid_json_falls_back_with_diagnostic() {
        let value = parse_response("{summary: unquoted}").into_value();
        assert_eq!(value["summary"], "{summary: unquoted}");
        assert!(value["parse_error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid JSON in LLM response: "));
    }

    #[test]
    fn test_open_brace_without_close() {
        let value = parse_response("{ never closed").into_value();
        assert_eq!(value["parse_error"], NO_STRUCTURE_MESSAGE);
    }

    #[test]
    fn test_broken_object_followed_by_many_braces() {
        let raw = format!("{{oops {}", "} ".repeat(20_000));
        let outcome = parse_response(&raw);
        assert!(outcome.is_fallback());
        assert!(outcome.into_value()["parse_error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid JSON in LLM response: "));
    }

    #[test]
    fn test_second_object_is_ignored() {
        let raw = r#"{"summary": "first"} and {"summary": "second"}"#;
        assert_eq!(parse_response(raw).into_value(), json!({"summary": "first"}));
    }

    #[test]
    fn test_empty_response() {
        let value = parse_response("").into_value();
        assert_eq!(value["summary"], "");
        assert_eq!(value["parse_error"], NO_STRUCTURE_MESSAGE);
    }
}
