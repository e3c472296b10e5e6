//! Gemini `embedContent` HTTP provider.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use catalog_core::error::{Error, ProviderError, Result};
use catalog_core::traits::EmbeddingProvider;
use catalog_core::types::EMBEDDING_DIM;

/// Async embeddings client that talks to Gemini-compatible endpoints.
#[derive(Clone)]
pub struct GeminiProvider {
    client: Client,
    endpoint: String,
    model: String,
    id: String,
}

impl GeminiProvider {
    /// Builds a new Gemini embeddings client.
    ///
    /// * `api_key` - sent as the `x-goog-api-key` header
    /// * `base_url` - API root, e.g. `https://generativelanguage.googleapis.com/v1beta`
    /// * `model` - model name without the `models/` prefix, e.g. `text-embedding-004`
    pub fn new(api_key: &str, base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::InvalidConfig("missing embedding API key".to_string()));
        }
        if model.trim().is_empty() {
            return Err(Error::InvalidConfig("missing embedding model name".to_string()));
        }
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(api_key.trim()).map_err(|_| Error::InvalidConfig("invalid embedding API key".to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("failed to build embedding HTTP client: {}", e)))?;
        let model = model.trim().trim_start_matches("models/").to_string();
        let endpoint = format!("{}/models/{}:embedContent", base_url.trim_end_matches('/'), model);
        let id = format!("gemini:{}", model);
        Ok(Self { client, endpoint, model, id })
    }

    pub fn endpoint(&self) -> &str { &self.endpoint }
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    fn provider_id(&self) -> &str { &self.id }

    fn dim(&self) -> usize { EMBEDDING_DIM }

    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError> {
        let request = EmbedContentRequest {
            model: format!("models/{}", self.model),
            content: Content { parts: vec![Part { text }] },
            output_dimensionality: EMBEDDING_DIM,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::rejected(format!("embedding request failed: {}", e)))?;
        let status = resp.status();
        if status.is_success() {
            let parsed: EmbedContentResponse = resp
                .json()
                .await
                .map_err(|e| ProviderError::rejected(format!("failed to parse embedding response: {}", e)))?;
            return Ok(parsed.embedding.values);
        }
        let body = resp.text().await.unwrap_or_else(|_| "<body unavailable>".to_string());
        let message = format!("embedding request failed ({}): {}", status, body);
        if is_rate_limited(status, &body) {
            Err(ProviderError::rate_limited(message))
        } else {
            Err(ProviderError::rejected(message))
        }
    }
}

fn is_rate_limited(status: StatusCode, body: &str) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || body.contains("RESOURCE_EXHAUSTED")
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
    output_dimensionality: usize,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}
