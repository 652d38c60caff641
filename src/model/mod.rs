//! Generative-model invocation.
//!
//! The pipeline talks to the model only through [`ModelInvoker`], so tests
//! and alternative backends can swap in a scripted implementation. The
//! production implementation is [`GeminiClient`].

mod gemini;

pub use gemini::GeminiClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ModelResult;

/// One grounded-search result: a URL plus the snippet the search surfaced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub snippet: String,
}

/// Model invocation boundary.
///
/// `invoke` produces free-form text for a prompt; `search` runs a
/// grounded-search query and may legitimately return no hits.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    async fn invoke(&self, prompt: &str) -> ModelResult<String>;

    async fn search(&self, query: &str) -> ModelResult<Vec<SearchHit>>;
}
