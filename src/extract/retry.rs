use std::future::Future;

use tracing::{debug, warn};

use super::{extract_structured, ExpectedShape};
use crate::error::ModelResult;

/// Outcome of a retried structured extraction.
///
/// `degraded` is true when every attempt failed and `value` is the
/// caller-supplied fallback; confidence scoring lowers the relevant factor
/// for degraded results.
#[derive(Debug, Clone)]
pub struct Extracted {
    pub value: serde_json::Value,
    pub degraded: bool,
    pub attempts: u32,
}

/// Run a raw-text-producing model operation through the extractor with a
/// bounded number of attempts, returning the fallback on exhaustion.
///
/// Transport failures (`ModelError`) consume an attempt the same way
/// extraction failures do; neither escapes this function. Retries are
/// immediate - failures here are attributed to output variance, not rate
/// limiting.
pub async fn extract_with_retry<F, Fut>(
    op: F,
    shape: ExpectedShape,
    fallback: serde_json::Value,
    max_attempts: u32,
) -> Extracted
where
    F: Fn() -> Fut,
    Fut: Future<Output = ModelResult<String>>,
{
    let max_attempts = max_attempts.max(1);

    for attempt in 1..=max_attempts {
        let raw = match op().await {
            Ok(text) => text,
            Err(e) => {
                warn!(attempt, error = %e, "model invocation failed");
                continue;
            }
        };

        match extract_structured(&raw, shape) {
            Ok(value) => {
                debug!(attempt, %shape, "structured extraction succeeded");
                return Extracted {
                    value,
                    degraded: false,
                    attempts: attempt,
                };
            }
            Err(e) => {
                warn!(attempt, %shape, error = %e, "structured extraction failed");
            }
        }
    }

    warn!(
        attempts = max_attempts,
        %shape,
        "extraction attempts exhausted, using fallback"
    );

    Extracted {
        value: fallback,
        degraded: true,
        attempts: max_attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_first_attempt_success_stops_retrying() {
        let calls = AtomicU32::new(0);
        let result = extract_with_retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok("[1, 2]".to_string()) }
            },
            ExpectedShape::Array,
            json!([]),
            3,
        )
        .await;

        assert!(!result.degraded);
        assert_eq!(result.value, json!([1, 2]));
        assert_eq!(result.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_exact_fallback() {
        let calls = AtomicU32::new(0);
        let fallback = json!({"queries": ["default"]});
        let result = extract_with_retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok("not json at all".to_string()) }
            },
            ExpectedShape::Object,
            fallback.clone(),
            3,
        )
        .await;

        assert!(result.degraded);
        assert_eq!(result.value, fallback);
        assert_eq!(result.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_recovers_on_later_attempt() {
        let calls = AtomicU32::new(0);
        let result = extract_with_retry(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Ok("".to_string())
                    } else {
                        Ok("```json\n{\"ok\": true}\n```".to_string())
                    }
                }
            },
            ExpectedShape::Object,
            json!({}),
            3,
        )
        .await;

        assert!(!result.degraded);
        assert_eq!(result.value, json!({"ok": true}));
        assert_eq!(result.attempts, 3);
    }

    #[tokio::test]
    async fn test_model_error_consumes_attempt() {
        let calls = AtomicU32::new(0);
        let result = extract_with_retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ModelError::Timeout { timeout_ms: 10 }) }
            },
            ExpectedShape::Array,
            json!([]),
            2,
        )
        .await;

        assert!(result.degraded);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_attempt_bound_is_clamped_to_one() {
        let calls = AtomicU32::new(0);
        let result = extract_with_retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok("[]".to_string()) }
            },
            ExpectedShape::Array,
            json!(null),
            0,
        )
        .await;

        assert!(!result.degraded);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shape_mismatch_is_retried_not_coerced() {
        let calls = AtomicU32::new(0);
        let result = extract_with_retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok("{\"an\": \"object\"}".to_string()) }
            },
            ExpectedShape::Array,
            json!(["fallback"]),
            3,
        )
        .await;

        assert!(result.degraded);
        assert_eq!(result.value, json!(["fallback"]));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
