//! Retry-with-backoff wrapper around an [`EmbeddingProvider`].
//!
//! Only provider errors flagged `rate_limited` are retried. Anything else is
//! surfaced at once as `EmbeddingRejected`; running out of attempts while
//! still rate limited is `EmbeddingUnavailable`.
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use catalog_core::config::RetryConfig;
use catalog_core::error::{Error, Result};
use catalog_core::traits::EmbeddingProvider;
use catalog_core::types::EMBEDDING_DIM;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &RetryConfig) -> Self {
        Self { max_attempts: cfg.max_attempts.max(1), base_delay: cfg.base_delay(), max_delay: cfg.max_delay() }
    }

    /// Wait before retrying after the zero-based `attempt` was rate limited:
    /// `min(base_delay * 2^attempt, max_delay)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self { Self::from_config(&RetryConfig::default()) }
}

#[derive(Clone)]
pub struct EmbeddingClient {
    provider: Arc<dyn EmbeddingProvider>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl EmbeddingClient {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy, cancel: CancellationToken::new() }
    }

    /// Backoff sleeps end early with `Error::Cancelled` once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn provider_id(&self) -> &str { self.provider.provider_id() }

    pub fn policy(&self) -> &RetryPolicy { &self.policy }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(Error::EmbeddingRejected("empty embedding text".to_string()));
        }
        let mut attempt = 0u32;
        loop {
            match self.provider.embed(text).await {
                Ok(vector) => {
                    if vector.len() != EMBEDDING_DIM {
                        return Err(Error::EmbeddingRejected(format!(
                            "provider returned {} dimensions, expected {}",
                            vector.len(),
                            EMBEDDING_DIM
                        )));
                    }
                    if attempt > 0 {
                        debug!(retries = attempt, "embedding succeeded after backoff");
                    }
                    return Ok(vector);
                }
                Err(err) if err.rate_limited => {
                    if attempt + 1 >= self.policy.max_attempts {
                        return Err(Error::EmbeddingUnavailable { attempts: attempt + 1, message: err.message });
                    }
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "embedding provider rate limited; backing off"
                    );
                    tokio::select! {
                        () = self.cancel.cancelled() => return Err(Error::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(err) => return Err(Error::EmbeddingRejected(err.message)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy { max_attempts: 10, base_delay: Duration::from_secs(1), max_delay: Duration::from_secs(30) };
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(4), Duration::from_secs(16));
        assert_eq!(policy.delay_for(5), Duration::from_secs(30));
        assert_eq!(policy.delay_for(40), Duration::from_secs(30));
    }

    #[test]
    fn policy_from_config_keeps_at_least_one_attempt() {
        let cfg = RetryConfig { max_attempts: 0, base_delay_ms: 10, max_delay_ms: 20 };
        let policy = RetryPolicy::from_config(&cfg);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.base_delay, Duration::from_millis(10));
    }
}
