use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use catalog_core::config::{EmptyExportPolicy, PipelineConfig, SinkMode};
use catalog_core::error::{Error, Result};
use catalog_core::traits::RecordSource;
use catalog_core::transform::transform_all;
use catalog_core::types::{BatchOutcome, DeliveryReport, VerificationReport};
use catalog_embed::EmbeddingClient;
use catalog_store::RecordSink;

use crate::scheduler::{BatchScheduler, SchedulerOptions};

/// Everything an operator needs after a run; printed as JSON by the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub mode: SinkMode,
    pub extracted: usize,
    pub outcome: BatchOutcome,
    /// `None` when nothing was delivered (empty source).
    pub delivery: Option<DeliveryReport>,
    pub verification: Option<VerificationReport>,
    pub duration_ms: u64,
}

/// extract → transform → embed → deliver → verify.
///
/// Fatal errors (source, destination, sink write, cancellation) abort the run;
/// per-record embedding and insert failures only show up in the summary.
pub async fn run(
    config: &PipelineConfig,
    source: Arc<dyn RecordSource>,
    client: &EmbeddingClient,
    sink: &dyn RecordSink,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    let started = Instant::now();
    info!(mode = ?config.mode, destination = %sink.location(), provider = client.provider_id(), "starting catalog migration");

    // SQLite reads block; keep them off the runtime's worker threads.
    let raw = tokio::task::spawn_blocking(move || source.extract())
        .await
        .map_err(|e| Error::SourceQueryFailed(format!("extraction task: {}", e)))??;
    let mut records = transform_all(&raw);
    drop(raw);
    info!(records = records.len(), "transformed source records");

    let mut summary = RunSummary {
        mode: config.mode,
        extracted: records.len(),
        outcome: BatchOutcome::new(),
        delivery: None,
        verification: None,
        duration_ms: 0,
    };

    if records.is_empty() {
        warn!("source returned no records; nothing to embed");
        if config.mode == SinkMode::File && config.file.empty_policy == EmptyExportPolicy::WriteEmpty {
            summary.delivery = Some(sink.deliver(&records).await?);
        }
        summary.duration_ms = elapsed_ms(started);
        return Ok(summary);
    }

    let mut options = SchedulerOptions::from_config(&config.batch);
    options.show_progress = config.run.progress;
    let scheduler = BatchScheduler::new(client, options, cancel.clone());
    summary.outcome = scheduler.run(&mut records).await?;

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    summary.delivery = Some(sink.deliver(&records).await?);
    if config.mode == SinkMode::Store {
        summary.verification = sink.verify().await;
    }

    summary.duration_ms = elapsed_ms(started);
    info!(
        attempted = summary.outcome.attempted,
        succeeded = summary.outcome.succeeded,
        failed = summary.outcome.failed,
        failed_skus = ?summary.outcome.failed_skus,
        duration_ms = summary.duration_ms,
        "catalog migration finished"
    );
    Ok(summary)
}

fn elapsed_ms(started: Instant) -> u64 { u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX) }
