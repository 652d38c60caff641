use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::{ModelInvoker, SearchHit};
use crate::config::{ModelConfig, RequestConfig};
use crate::error::{ModelError, ModelResult};

/// Client for the Gemini `generateContent` API, with optional
/// google-search grounding.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model_name: String,
    request_config: RequestConfig,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f64,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Tool {
    #[serde(rename = "googleSearch")]
    google_search: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
    #[serde(rename = "groundingMetadata")]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct GroundingMetadata {
    #[serde(rename = "groundingChunks", default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<WebSource>,
}

#[derive(Debug, Deserialize)]
struct WebSource {
    uri: Option<String>,
    title: Option<String>,
}

impl GeminiClient {
    /// Create a new Gemini client
    pub fn new(config: &ModelConfig, request_config: RequestConfig) -> ModelResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(ModelError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model_name: config.model_name.clone(),
            request_config,
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue a generateContent call with transport-level retries.
    async fn generate(&self, prompt: &str, grounded: bool) -> ModelResult<GenerateResponse> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model_name, self.api_key
        );

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.5,
                max_output_tokens: 8192,
            },
            tools: grounded.then(|| {
                vec![Tool {
                    google_search: serde_json::json!({}),
                }]
            }),
        };

        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(retries - 1)),
                );
                warn!(
                    model = %self.model_name,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying Gemini request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_request(&url, &request).await {
                Ok(response) => {
                    let latency = start.elapsed();
                    info!(
                        model = %self.model_name,
                        grounded,
                        latency_ms = latency.as_millis(),
                        "Gemini call succeeded"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    let latency = start.elapsed();
                    error!(
                        model = %self.model_name,
                        error = %e,
                        latency_ms = latency.as_millis(),
                        retry = retries,
                        "Gemini call failed"
                    );
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        Err(ModelError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries,
        })
    }

    /// Execute a single request (internal)
    async fn execute_request(
        &self,
        url: &str,
        request: &GenerateRequest,
    ) -> ModelResult<GenerateResponse> {
        debug!(model = %self.model_name, "Calling Gemini generateContent");

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    ModelError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let parsed: GenerateResponse =
            response
                .json()
                .await
                .map_err(|e| ModelError::InvalidResponse {
                    message: format!("Failed to parse response: {}", e),
                })?;

        Ok(parsed)
    }
}

fn first_candidate_text(response: &GenerateResponse) -> ModelResult<String> {
    response
        .candidates
        .as_ref()
        .and_then(|c| c.first())
        .and_then(|c| c.content.as_ref())
        .and_then(|c| c.parts.first())
        .map(|p| p.text.clone())
        .ok_or_else(|| ModelError::InvalidResponse {
            message: "response contained no candidate text".to_string(),
        })
}

#[async_trait]
impl ModelInvoker for GeminiClient {
    async fn invoke(&self, prompt: &str) -> ModelResult<String> {
        let response = self.generate(prompt, false).await?;
        first_candidate_text(&response)
    }

    async fn search(&self, query: &str) -> ModelResult<Vec<SearchHit>> {
        let response = self.generate(query, true).await?;

        let snippet = first_candidate_text(&response).unwrap_or_default();

        let hits = response
            .candidates
            .as_ref()
            .and_then(|c| c.first())
            .and_then(|c| c.grounding_metadata.as_ref())
            .map(|meta| {
                meta.grounding_chunks
                    .iter()
                    .filter_map(|chunk| chunk.web.as_ref())
                    .filter_map(|web| {
                        web.uri.as_ref().map(|uri| SearchHit {
                            url: uri.clone(),
                            snippet: web.title.clone().unwrap_or_else(|| snippet.clone()),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let config = ModelConfig {
            api_key: "test_key".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            model_name: "gemini-2.0-flash-001".to_string(),
        };

        let client = GeminiClient::new(&config, RequestConfig::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = ModelConfig {
            api_key: "k".to_string(),
            base_url: "https://example.com/".to_string(),
            model_name: "m".to_string(),
        };

        let client = GeminiClient::new(&config, RequestConfig::default()).unwrap();
        assert_eq!(client.base_url(), "https://example.com");
    }

    #[test]
    fn test_grounding_metadata_parsing() {
        let body = serde_json::json!({
            "candidates": [{
                "content": {"parts": [{"text": "summary"}]},
                "groundingMetadata": {
                    "groundingChunks": [
                        {"web": {"uri": "https://a.example", "title": "A"}},
                        {"web": {"uri": "https://b.example"}},
                        {"web": null}
                    ]
                }
            }]
        });

        let parsed: GenerateResponse = serde_json::from_value(body).unwrap();
        let meta = parsed.candidates.as_ref().unwrap()[0]
            .grounding_metadata
            .as_ref()
            .unwrap();
        assert_eq!(meta.grounding_chunks.len(), 3);
        assert_eq!(
            meta.grounding_chunks[0].web.as_ref().unwrap().uri.as_deref(),
            Some("https://a.example")
        );
    }
}
