//! Embedding providers and the retrying client the pipeline calls.
//!
//! `provider_from_config` picks the remote Gemini provider or the offline
//! hashing provider; [`EmbeddingClient`] adds the rate-limit backoff policy.
use std::sync::Arc;
use std::time::Duration;

use catalog_core::config::{EmbeddingConfig, ProviderKind};
use catalog_core::error::{Error, Result};
use catalog_core::traits::EmbeddingProvider;

pub mod client;
pub mod gemini;
pub mod hashing;

pub use client::{EmbeddingClient, RetryPolicy};
pub use gemini::GeminiProvider;
pub use hashing::HashingProvider;

pub fn provider_from_config(cfg: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match cfg.provider {
        ProviderKind::Gemini => {
            let api_key = cfg
                .api_key
                .as_deref()
                .ok_or_else(|| Error::InvalidConfig("embedding.api_key is required".to_string()))?;
            let provider = GeminiProvider::new(api_key, &cfg.base_url, &cfg.model, Duration::from_secs(cfg.timeout_secs.max(1)))?;
            Ok(Arc::new(provider))
        }
        ProviderKind::Hashing => Ok(Arc::new(HashingProvider::new())),
    }
}
