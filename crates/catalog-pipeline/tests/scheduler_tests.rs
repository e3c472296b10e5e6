use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use catalog_core::error::{Error, ProviderError};
use catalog_core::traits::EmbeddingProvider;
use catalog_core::types::{EnrichedRecord, EMBEDDING_DIM};
use catalog_embed::{EmbeddingClient, RetryPolicy};
use catalog_pipeline::{BatchScheduler, SchedulerOptions};
use tokio_util::sync::CancellationToken;

/// Embeds `"<n>"` as a vector filled with `n`; rejects any text containing "bad".
/// Lower numbers answer more slowly so concurrent completions arrive out of order.
struct NumberProvider {
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for NumberProvider {
    fn provider_id(&self) -> &str { "number" }
    fn dim(&self) -> usize { EMBEDDING_DIM }
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.contains("bad") {
            return Err(ProviderError::rejected("400 invalid content"));
        }
        let n: u64 = text.parse().map_err(|_| ProviderError::rejected("not a number"))?;
        tokio::time::sleep(Duration::from_millis(20u64.saturating_sub(n * 2))).await;
        Ok(vec![n as f32; EMBEDDING_DIM])
    }
}

fn setup() -> (Arc<NumberProvider>, EmbeddingClient) {
    let provider = Arc::new(NumberProvider { calls: AtomicUsize::new(0) });
    let client = EmbeddingClient::new(provider.clone(), RetryPolicy::default());
    (provider, client)
}

fn records(texts: &[&str]) -> Vec<EnrichedRecord> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| EnrichedRecord {
            sku: format!("sku-{}", i + 1),
            handle: String::new(),
            title: String::new(),
            description: String::new(),
            vendor: String::new(),
            price: 0.0,
            currency: String::new(),
            image_url: String::new(),
            product_url: String::new(),
            tags: vec![],
            search_content: String::new(),
            embedding_text: text.to_string(),
            embedding: None,
        })
        .collect()
}

fn options(size: usize, delay_ms: u64, concurrency: usize) -> SchedulerOptions {
    SchedulerOptions { size, delay: Duration::from_millis(delay_ms), progress_every: 2, concurrency, show_progress: false }
}

#[tokio::test]
async fn every_record_is_attempted_and_failures_do_not_stop_the_run() {
    let (provider, client) = setup();
    let mut recs = records(&["1", "bad", "3", "4", "bad", "6", "7"]);
    let scheduler = BatchScheduler::new(&client, options(3, 0, 1), CancellationToken::new());

    let outcome = scheduler.run(&mut recs).await.expect("run");

    assert_eq!(outcome.attempted, 7);
    assert_eq!(outcome.succeeded, 5);
    assert_eq!(outcome.failed, 2);
    assert_eq!(outcome.failed_skus, vec!["sku-2".to_string(), "sku-5".to_string()]);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 7);
    assert!(recs[1].embedding.is_none() && recs[4].embedding.is_none());
    assert_eq!(recs[6].embedding.as_ref().map(|v| v[0]), Some(7.0));
}

#[tokio::test]
async fn empty_embedding_text_counts_as_a_failed_attempt() {
    let (provider, client) = setup();
    let mut recs = records(&["1", ""]);
    let outcome = BatchScheduler::new(&client, options(50, 0, 1), CancellationToken::new())
        .run(&mut recs)
        .await
        .expect("run");
    assert_eq!((outcome.attempted, outcome.succeeded, outcome.failed), (2, 1, 1));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_window_keeps_record_order() {
    let (_provider, client) = setup();
    let texts: Vec<String> = (1..=8).map(|n| n.to_string()).collect();
    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    let mut recs = records(&refs);

    let outcome = BatchScheduler::new(&client, options(4, 0, 4), CancellationToken::new())
        .run(&mut recs)
        .await
        .expect("run");

    assert_eq!(outcome.succeeded, 8);
    for (i, rec) in recs.iter().enumerate() {
        assert_eq!(rec.embedding.as_ref().map(|v| v[0]), Some((i + 1) as f32), "record {} got another record's vector", i + 1);
    }
}

#[tokio::test]
async fn windows_are_paced() {
    let (_provider, client) = setup();
    let mut recs = records(&["9", "9", "9", "9", "9"]);
    let started = Instant::now();
    BatchScheduler::new(&client, options(2, 30, 1), CancellationToken::new())
        .run(&mut recs)
        .await
        .expect("run");
    // three windows, two pauses
    assert!(started.elapsed() >= Duration::from_millis(60));
}

#[tokio::test]
async fn cancelled_before_start_makes_no_calls() {
    let (provider, client) = setup();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut recs = records(&["1", "2"]);
    let err = BatchScheduler::new(&client, options(1, 0, 1), cancel).run(&mut recs).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancellation_interrupts_pacing_sleep() {
    let (provider, client) = setup();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });
    let mut recs = records(&["1", "2", "3"]);
    let started = Instant::now();
    let err = BatchScheduler::new(&client, options(1, 10_000, 1), cancel).run(&mut recs).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
}
