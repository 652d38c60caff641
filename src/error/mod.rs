use thiserror::Error;

use crate::pipeline::StageName;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Stage failure: {0}")]
    Stage(#[from] StageError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Structured-extraction failures, always handled locally by the retrying
/// invoker and never propagated past a stage boundary.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Empty response")]
    EmptyResponse,

    #[error("Shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch { expected: String, found: String },

    #[error("Malformed response: {preview}")]
    Malformed { preview: String },
}

/// Model invocation errors
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Per-page fetch errors during the scraping pass. One failed fetch is
/// recorded and skipped; it never aborts the crawl.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Fetch timeout after {timeout_ms}ms: {url}")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("HTTP status {status}: {url}")]
    Status { url: String, status: u16 },

    #[error("URL blocked or invalid: {url}")]
    Blocked { url: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Serialization failed: {message}")]
    Serialize { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// A stage exhausted its recovery options. The only error the state
/// machine records as session-fatal; the session moves to `error`, the
/// process keeps running.
#[derive(Debug, Error)]
#[error("Stage {stage} failed: {message}")]
pub struct StageError {
    pub stage: StageName,
    pub message: String,
}

impl StageError {
    pub fn new(stage: StageName, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for extraction operations
pub type ExtractResult<T> = Result<T, ExtractError>;

/// Result type alias for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// Result type alias for page fetches
pub type FetchResult<T> = Result<T, FetchError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_error_display() {
        assert_eq!(ExtractError::EmptyResponse.to_string(), "Empty response");

        let err = ExtractError::ShapeMismatch {
            expected: "array".to_string(),
            found: "object".to_string(),
        };
        assert_eq!(err.to_string(), "Shape mismatch: expected array, found object");

        let err = ExtractError::Malformed {
            preview: "not json".to_string(),
        };
        assert_eq!(err.to_string(), "Malformed response: not json");
    }

    #[test]
    fn test_model_error_display() {
        let err = ModelError::Unavailable {
            message: "server down".to_string(),
            retries: 3,
        };
        assert_eq!(err.to_string(), "Model unavailable: server down (retries: 3)");

        let err = ModelError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Request timeout after 5000ms");

        let err = ModelError::Api {
            status: 429,
            message: "rate limited".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 429 - rate limited");
    }

    #[test]
    fn test_fetch_error_display() {
        let err = FetchError::Status {
            url: "https://example.com/missing".to_string(),
            status: 404,
        };
        assert_eq!(
            err.to_string(),
            "HTTP status 404: https://example.com/missing"
        );

        let err = FetchError::Blocked {
            url: "ftp://x".to_string(),
        };
        assert_eq!(err.to_string(), "URL blocked or invalid: ftp://x");
    }

    #[test]
    fn test_stage_error_display() {
        let err = StageError::new(StageName::DataGathering, "all tiers failed");
        assert_eq!(err.to_string(), "Stage data_gathering failed: all tiers failed");
    }

    #[test]
    fn test_storage_error_conversion_to_app_error() {
        let storage_err = StorageError::SessionNotFound {
            session_id: "sess-123".to_string(),
        };
        let app_err: AppError = storage_err.into();
        assert!(matches!(app_err, AppError::Storage(_)));
        assert!(app_err.to_string().contains("sess-123"));
    }

    #[test]
    fn test_stage_error_conversion_to_app_error() {
        let err = StageError::new(StageName::Analysis, "boom");
        let app_err: AppError = err.into();
        assert!(matches!(app_err, AppError::Stage(_)));
    }
}
