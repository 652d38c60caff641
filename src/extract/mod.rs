//! Structured-response extraction from free-form model output.
//!
//! Generative models asked for JSON routinely wrap it in prose or markdown
//! fences, or return nothing at all. This module turns such text into
//! validated `serde_json::Value`s and, via [`retry::extract_with_retry`],
//! bounds the damage a misbehaving model can do to a single degraded
//! fallback value.

mod retry;

pub use retry::{extract_with_retry, Extracted};

use crate::error::{ExtractError, ExtractResult};

/// Maximum characters of offending text carried in a malformed-response error.
const PREVIEW_LEN: usize = 200;

/// The structural kind a caller expects from an extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedShape {
    Array,
    Object,
}

impl std::fmt::Display for ExpectedShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExpectedShape::Array => write!(f, "array"),
            ExpectedShape::Object => write!(f, "object"),
        }
    }
}

/// Extract a JSON structure of the expected shape from raw model text.
///
/// Empty or whitespace-only input fails with `EmptyResponse`. If the text
/// contains a fenced code block, only the innermost fenced content is
/// parsed. A successful parse of the wrong kind fails with `ShapeMismatch`;
/// no coercion between shapes is attempted - callers decide the fallback.
pub fn extract_structured(raw: &str, shape: ExpectedShape) -> ExtractResult<serde_json::Value> {
    if raw.trim().is_empty() {
        return Err(ExtractError::EmptyResponse);
    }

    let candidate = strip_code_fence(raw);

    let value: serde_json::Value =
        serde_json::from_str(candidate.trim()).map_err(|_| ExtractError::Malformed {
            preview: preview(candidate),
        })?;

    let found = match &value {
        serde_json::Value::Array(_) => ExpectedShape::Array,
        serde_json::Value::Object(_) => ExpectedShape::Object,
        other => {
            return Err(ExtractError::Malformed {
                preview: preview(&other.to_string()),
            })
        }
    };

    if found != shape {
        return Err(ExtractError::ShapeMismatch {
            expected: shape.to_string(),
            found: found.to_string(),
        });
    }

    Ok(value)
}

/// Return the innermost fenced content if the text carries a code fence,
/// otherwise the text unchanged.
fn strip_code_fence(raw: &str) -> &str {
    let mut inner = raw;
    loop {
        let Some(open) = inner.find("```") else {
            return inner;
        };
        let after_open = &inner[open + 3..];
        // Skip the language tag line (e.g. ```json)
        let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after_open[body_start..];
        let Some(close) = body.find("```") else {
            // Unterminated fence; parse what follows the opener
            return body;
        };
        inner = &body[..close];
    }
}

fn preview(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.len() <= PREVIEW_LEN {
        trimmed.to_string()
    } else {
        let mut end = PREVIEW_LEN;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &trimmed[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_input_is_empty_response() {
        for raw in ["", "   ", "\n\t \n"] {
            let err = extract_structured(raw, ExpectedShape::Array).unwrap_err();
            assert!(matches!(err, ExtractError::EmptyResponse), "input: {:?}", raw);
        }
    }

    #[test]
    fn test_plain_array() {
        let value = extract_structured("[1, 2, 3]", ExpectedShape::Array).unwrap();
        assert_eq!(value, json!([1, 2, 3]));
    }

    #[test]
    fn test_plain_object() {
        let value = extract_structured(r#"{"a": 1}"#, ExpectedShape::Object).unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn test_fenced_block_with_prose() {
        let raw = "Sure! Here's the JSON: ```json\n[1,2,3]\n```";
        let value = extract_structured(raw, ExpectedShape::Array).unwrap();
        assert_eq!(value, json!([1, 2, 3]));
    }

    #[test]
    fn test_fence_stripping_is_lossless() {
        let unwrapped = extract_structured(r#"{"k": "v"}"#, ExpectedShape::Object).unwrap();
        let wrapped =
            extract_structured("```json\n{\"k\": \"v\"}\n```", ExpectedShape::Object).unwrap();
        assert_eq!(unwrapped, wrapped);
    }

    #[test]
    fn test_nested_fences_take_innermost() {
        let raw = "````\nouter\n```json\n[true]\n```\n````";
        let value = extract_structured(raw, ExpectedShape::Array).unwrap();
        assert_eq!(value, json!([true]));
    }

    #[test]
    fn test_shape_mismatch_object_for_array() {
        let err = extract_structured(r#"{"a": 1}"#, ExpectedShape::Array).unwrap_err();
        match err {
            ExtractError::ShapeMismatch { expected, found } => {
                assert_eq!(expected, "array");
                assert_eq!(found, "object");
            }
            other => panic!("expected ShapeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_scalar_is_malformed_not_mismatch() {
        let err = extract_structured("42", ExpectedShape::Array).unwrap_err();
        assert!(matches!(err, ExtractError::Malformed { .. }));
    }

    #[test]
    fn test_malformed_carries_bounded_preview() {
        let garbage = "x".repeat(5000);
        let err = extract_structured(&garbage, ExpectedShape::Object).unwrap_err();
        match err {
            ExtractError::Malformed { preview } => {
                assert!(preview.len() <= PREVIEW_LEN + 3);
                assert!(preview.ends_with("..."));
            }
            other => panic!("expected Malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_unterminated_fence_still_parses() {
        let raw = "```json\n[1]";
        let value = extract_structured(raw, ExpectedShape::Array).unwrap();
        assert_eq!(value, json!([1]));
    }
}
