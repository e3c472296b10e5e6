use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use catalog_core::error::ProviderError;
use catalog_core::traits::EmbeddingProvider;
use catalog_core::types::EMBEDDING_DIM;
use catalog_core::Error;
use catalog_embed::{EmbeddingClient, HashingProvider, RetryPolicy};
use tokio_util::sync::CancellationToken;

/// Replays scripted responses, then keeps returning `fallback`.
struct ScriptedProvider {
    script: Mutex<VecDeque<Result<Vec<f32>, ProviderError>>>,
    fallback: Result<Vec<f32>, ProviderError>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn new(script: Vec<Result<Vec<f32>, ProviderError>>, fallback: Result<Vec<f32>, ProviderError>) -> Arc<Self> {
        Arc::new(Self { script: Mutex::new(script.into()), fallback, calls: AtomicUsize::new(0) })
    }

    fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }
}

#[async_trait]
impl EmbeddingProvider for ScriptedProvider {
    fn provider_id(&self) -> &str { "scripted" }
    fn dim(&self) -> usize { EMBEDDING_DIM }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

fn ok_vector() -> Result<Vec<f32>, ProviderError> { Ok(vec![0.5; EMBEDDING_DIM]) }

fn policy(base_ms: u64) -> RetryPolicy {
    RetryPolicy { max_attempts: 3, base_delay: Duration::from_millis(base_ms), max_delay: Duration::from_secs(30) }
}

#[tokio::test]
async fn rate_limited_twice_then_succeeds_after_two_backoffs() {
    let provider = ScriptedProvider::new(
        vec![Err(ProviderError::rate_limited("429")), Err(ProviderError::rate_limited("429"))],
        ok_vector(),
    );
    let client = EmbeddingClient::new(provider.clone(), policy(20));

    let started = Instant::now();
    let vector = client.embed("linen shirt").await.expect("embed");
    let elapsed = started.elapsed();

    assert_eq!(vector.len(), EMBEDDING_DIM);
    assert_eq!(provider.calls(), 3, "one call plus exactly two retries");
    assert!(elapsed >= Duration::from_millis(20 + 40), "elapsed {elapsed:?} shorter than base + 2*base");
}

#[tokio::test]
async fn non_rate_limit_error_fails_immediately() {
    let provider = ScriptedProvider::new(vec![], Err(ProviderError::rejected("400 invalid argument")));
    let client = EmbeddingClient::new(provider.clone(), policy(2_000));

    let started = Instant::now();
    let err = client.embed("linen shirt").await.unwrap_err();

    assert!(matches!(err, Error::EmbeddingRejected(ref m) if m.contains("invalid argument")), "got {err:?}");
    assert_eq!(provider.calls(), 1);
    assert!(started.elapsed() < Duration::from_millis(1_000), "no backoff delay expected");
}

#[tokio::test]
async fn exhausted_rate_limit_is_unavailable() {
    let provider = ScriptedProvider::new(vec![], Err(ProviderError::rate_limited("429")));
    let client = EmbeddingClient::new(provider.clone(), policy(5));

    let err = client.embed("linen shirt").await.unwrap_err();

    assert!(matches!(err, Error::EmbeddingUnavailable { attempts: 3, .. }), "got {err:?}");
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn wrong_dimension_is_rejected() {
    let provider = ScriptedProvider::new(vec![], Ok(vec![1.0; 12]));
    let client = EmbeddingClient::new(provider, policy(5));
    let err = client.embed("linen shirt").await.unwrap_err();
    assert!(matches!(err, Error::EmbeddingRejected(_)), "got {err:?}");
}

#[tokio::test]
async fn empty_text_never_reaches_the_provider() {
    let provider = ScriptedProvider::new(vec![], ok_vector());
    let client = EmbeddingClient::new(provider.clone(), policy(5));
    let err = client.embed("   ").await.unwrap_err();
    assert!(matches!(err, Error::EmbeddingRejected(_)));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn cancellation_interrupts_backoff() {
    let provider = ScriptedProvider::new(vec![], Err(ProviderError::rate_limited("429")));
    let cancel = CancellationToken::new();
    let client = EmbeddingClient::new(provider.clone(), policy(10_000)).with_cancellation(cancel.clone());

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = client.embed("linen shirt").await.unwrap_err();
    assert!(matches!(err, Error::Cancelled), "got {err:?}");
    assert_eq!(provider.calls(), 1);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn hashing_provider_is_deterministic_and_normalized() {
    let provider = HashingProvider::new();
    let a = provider.embed("Linen Shirt from Acme").await.expect("embed");
    let b = provider.embed("Linen Shirt from Acme").await.expect("embed");
    let c = provider.embed("Wool Coat from Other").await.expect("embed");

    assert_eq!(a.len(), EMBEDDING_DIM);
    assert_eq!(a, b);
    assert_ne!(a, c);
    let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");
}
