use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use twox_hash::XxHash64;

use catalog_core::error::ProviderError;
use catalog_core::traits::EmbeddingProvider;
use catalog_core::types::EMBEDDING_DIM;

const PROVIDER_ID: &str = "hashing:xxh64:d768";

/// Deterministic token-hashing embedder for offline runs and tests.
/// Vectors are L2-normalized, `EMBEDDING_DIM` wide; identical text gives identical vectors.
#[derive(Debug, Clone, Copy)]
pub struct HashingProvider;

impl HashingProvider {
    pub fn new() -> Self { Self }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; EMBEDDING_DIM];
        for (i, token) in text.split_whitespace().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % EMBEDDING_DIM;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        v
    }
}

impl Default for HashingProvider {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl EmbeddingProvider for HashingProvider {
    fn provider_id(&self) -> &str { PROVIDER_ID }
    fn dim(&self) -> usize { EMBEDDING_DIM }
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> { Ok(self.embed_text(text)) }
}
