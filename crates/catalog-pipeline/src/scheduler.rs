//! Windowed, paced embedding of transformed records.
//!
//! Records are processed in windows of `size`. Inside a window up to
//! `concurrency` embedding calls are in flight through an ordered buffered
//! stream; results are folded into one [`BatchOutcome`] by this task only.
//! Between windows the scheduler sleeps for `delay`. Cancellation is observed
//! at window boundaries, during pacing sleeps and during client backoff.
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use catalog_core::config::BatchConfig;
use catalog_core::error::{Error, Result};
use catalog_core::types::{BatchOutcome, EnrichedRecord};
use catalog_embed::EmbeddingClient;
use catalog_store::progress::progress_bar;

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub size: usize,
    pub delay: Duration,
    pub progress_every: usize,
    pub concurrency: usize,
    pub show_progress: bool,
}

impl SchedulerOptions {
    pub fn from_config(cfg: &BatchConfig) -> Self {
        Self {
            size: cfg.size.max(1),
            delay: cfg.delay(),
            progress_every: cfg.progress_every,
            concurrency: cfg.concurrency.max(1),
            show_progress: false,
        }
    }
}

impl Default for SchedulerOptions {
    fn default() -> Self { Self::from_config(&BatchConfig::default()) }
}

pub struct BatchScheduler<'a> {
    client: &'a EmbeddingClient,
    options: SchedulerOptions,
    cancel: CancellationToken,
}

impl<'a> BatchScheduler<'a> {
    pub fn new(client: &'a EmbeddingClient, options: SchedulerOptions, cancel: CancellationToken) -> Self {
        Self { client, options, cancel }
    }

    /// Attaches an embedding to every record that gets one. Per-record
    /// failures leave `embedding` as `None` and never stop later records.
    pub async fn run(&self, records: &mut [EnrichedRecord]) -> Result<BatchOutcome> {
        let size = self.options.size.max(1);
        let total = records.len();
        let windows = total.div_ceil(size);
        let mut outcome = BatchOutcome::new();
        if windows == 0 {
            return Ok(outcome);
        }
        info!(records = total, windows, size, concurrency = self.options.concurrency, "embedding records");
        let pb = progress_bar(windows, "batches", self.options.show_progress);

        for (window, chunk) in records.chunks_mut(size).enumerate() {
            if self.cancel.is_cancelled() {
                pb.abandon();
                return Err(Error::Cancelled);
            }
            debug!(window = window + 1, windows, len = chunk.len(), "processing window");

            let results: Vec<Result<Vec<f32>>> = stream::iter(chunk.iter().map(|r| self.client.embed(&r.embedding_text)))
                .buffered(self.options.concurrency.max(1))
                .collect()
                .await;

            for (record, result) in chunk.iter_mut().zip(results) {
                match result {
                    Ok(vector) => {
                        record.embedding = Some(vector);
                        outcome.record_success();
                        if self.options.progress_every > 0 && outcome.succeeded % self.options.progress_every == 0 {
                            info!(succeeded = outcome.succeeded, failed = outcome.failed, total, "embedding progress");
                        }
                    }
                    Err(Error::Cancelled) => {
                        pb.abandon();
                        return Err(Error::Cancelled);
                    }
                    Err(e) => {
                        warn!(sku = %record.sku, error = %e, "embedding failed; record kept without vector");
                        record.embedding = None;
                        outcome.record_failure(&record.sku);
                    }
                }
            }
            pb.inc(1);

            if window + 1 < windows && !self.options.delay.is_zero() {
                tokio::select! {
                    () = self.cancel.cancelled() => {
                        pb.abandon();
                        return Err(Error::Cancelled);
                    }
                    () = tokio::time::sleep(self.options.delay) => {}
                }
            }
        }
        pb.finish_and_clear();
        info!(attempted = outcome.attempted, succeeded = outcome.succeeded, failed = outcome.failed, "embedding finished");
        Ok(outcome)
    }
}
