use std::env;
use std::path::PathBuf;

use crate::error::AppError;

/// Application configuration loaded from environment variables.
///
/// Built once in `main` and passed by reference into the engine and the
/// source coordinator; no component reads the environment after startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub model: ModelConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub gather: GatherConfig,
    pub confidence: ConfidenceConfig,
    pub report_dir: PathBuf,
}

/// Gemini API configuration
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub api_key: String,
    pub base_url: String,
    pub model_name: String,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request and structured-extraction retry configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Attempt bound for the retrying invoker (structured extraction).
    pub max_extract_attempts: u32,
}

/// Data-gathering limits enforced by the source coordinator
#[derive(Debug, Clone)]
pub struct GatherConfig {
    /// Maximum crawl depth; seed pages are depth 0.
    pub max_scrape_depth: u32,
    /// Ceiling on simultaneous page fetches within one depth level.
    pub max_concurrent_fetches: usize,
    /// Per-page fetch timeout.
    pub fetch_timeout_ms: u64,
    pub max_search_queries: usize,
    pub max_seed_urls: usize,
    pub max_links_per_page: usize,
    /// Research questions answered from internal knowledge.
    pub max_internal_questions: usize,
}

/// Confidence thresholds, band boundaries, and stage weights
#[derive(Debug, Clone)]
pub struct ConfidenceConfig {
    /// Below this, recommendations are emitted and clarification is asked.
    pub threshold: f64,
    /// Scores at or above this band are High.
    pub high_band: f64,
    /// Scores at or above this band (and below high) are Medium.
    pub medium_band: f64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let model = ModelConfig {
            api_key: env::var("GEMINI_API_KEY").map_err(|_| AppError::Config {
                message: "GEMINI_API_KEY is required".to_string(),
            })?,
            base_url: env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string()),
            model_name: env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-2.0-flash-001".to_string()),
        };

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/sessions.db".to_string()),
            ),
            max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: env_parse("REQUEST_TIMEOUT_MS", 30000),
            max_retries: env_parse("MAX_RETRIES", 3),
            retry_delay_ms: env_parse("RETRY_DELAY_MS", 1000),
            max_extract_attempts: env_parse("MAX_EXTRACT_ATTEMPTS", 3),
        };

        let gather = GatherConfig {
            max_scrape_depth: env_parse("MAX_SCRAPE_DEPTH", 3),
            max_concurrent_fetches: env_parse("MAX_CONCURRENT_FETCHES", 5),
            fetch_timeout_ms: env_parse("FETCH_TIMEOUT_MS", 15000),
            max_search_queries: env_parse("MAX_SEARCH_QUERIES", 3),
            max_seed_urls: env_parse("MAX_SEED_URLS", 10),
            max_links_per_page: env_parse("MAX_LINKS_PER_PAGE", 20),
            max_internal_questions: env_parse("MAX_INTERNAL_QUESTIONS", 5),
        };

        let confidence = ConfidenceConfig {
            threshold: env_parse("CONFIDENCE_THRESHOLD", 70.0),
            high_band: env_parse("CONFIDENCE_HIGH_BAND", 85.0),
            medium_band: env_parse("CONFIDENCE_MEDIUM_BAND", 60.0),
        };

        let report_dir = PathBuf::from(
            env::var("REPORT_DIR").unwrap_or_else(|_| "./reports".to_string()),
        );

        Ok(Config {
            model,
            database,
            logging,
            request,
            gather,
            confidence,
            report_dir,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
            max_extract_attempts: 3,
        }
    }
}

impl Default for GatherConfig {
    fn default() -> Self {
        Self {
            max_scrape_depth: 3,
            max_concurrent_fetches: 5,
            fetch_timeout_ms: 15000,
            max_search_queries: 3,
            max_seed_urls: 10,
            max_links_per_page: 20,
            max_internal_questions: 5,
        }
    }
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            threshold: 70.0,
            high_band: 85.0,
            medium_band: 60.0,
        }
    }
}
