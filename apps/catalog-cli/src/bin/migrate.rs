use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use catalog_core::config::{Config, PipelineConfig, SinkMode};
use catalog_embed::{provider_from_config, EmbeddingClient, RetryPolicy};
use catalog_pipeline::{run, RunSummary};
use catalog_source::SqliteSource;
use catalog_store::{FileSink, LanceDocumentStore, RecordSink, StoreSink};

/// Migrate the product catalog from SQLite into a vector-indexed store (or a JSON export).
#[derive(Parser, Debug)]
#[command(name = "catalog-migrate", version)]
struct Args {
    /// Base configuration file (defaults to ./config.toml).
    #[arg(long, env = "APP_CONFIG_FILE")]
    config: Option<PathBuf>,
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,
    /// Export path for file mode.
    #[arg(long)]
    output: Option<String>,
    /// Keep existing documents; duplicates are skipped instead of replaced.
    #[arg(long)]
    no_purge: bool,
    #[arg(long)]
    batch_size: Option<usize>,
    /// Abort the run after this many seconds (0 disables).
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Show progress bars on stderr.
    #[arg(long)]
    progress: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Store,
    File,
}

impl Args {
    fn apply(&self, cfg: &mut PipelineConfig) {
        if let Some(mode) = self.mode {
            cfg.mode = match mode { ModeArg::Store => SinkMode::Store, ModeArg::File => SinkMode::File };
        }
        if let Some(output) = &self.output { cfg.file.output_path = output.clone(); }
        if self.no_purge { cfg.store.purge = false; }
        if let Some(size) = self.batch_size { cfg.batch.size = size; }
        if let Some(secs) = self.timeout_secs { cfg.run.timeout_secs = secs; }
        if self.progress { cfg.run.progress = true; }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(false).init();
}

fn cancellation(cfg: &PipelineConfig) -> CancellationToken {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling run");
            on_signal.cancel();
        }
    });
    if cfg.run.timeout_secs > 0 {
        let deadline = Duration::from_secs(cfg.run.timeout_secs);
        let on_timeout = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            warn!(timeout_secs = deadline.as_secs(), "run deadline reached; cancelling");
            on_timeout.cancel();
        });
    }
    cancel
}

async fn build_sink(cfg: &PipelineConfig) -> anyhow::Result<Box<dyn RecordSink>> {
    let sink: Box<dyn RecordSink> = match cfg.mode {
        SinkMode::Store => {
            let uri = cfg.store_uri().to_string_lossy().to_string();
            let store = LanceDocumentStore::open(&uri, &cfg.store.collection)
                .await
                .with_context(|| format!("opening collection '{}' at {}", cfg.store.collection, uri))?;
            Box::new(StoreSink::new(Arc::new(store), &cfg.store.index_name, cfg.store.purge).with_progress(cfg.run.progress))
        }
        SinkMode::File => Box::new(FileSink::new(cfg.output_path())),
    };
    Ok(sink)
}

async fn migrate(cfg: &PipelineConfig) -> anyhow::Result<RunSummary> {
    let source = Arc::new(SqliteSource::new(cfg.source_path(), cfg.source.table.clone())?);
    let provider = provider_from_config(&cfg.embedding)?;
    let cancel = cancellation(cfg);
    let client = EmbeddingClient::new(provider, RetryPolicy::from_config(&cfg.retry)).with_cancellation(cancel.clone());
    let sink = build_sink(cfg).await?;
    info!(source = %source.path().display(), destination = %sink.location(), "pipeline ready");
    Ok(run(cfg, source, &client, sink.as_ref(), cancel).await?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut cfg = Config::load_with(args.config.as_deref())
        .and_then(|c| c.extract())
        .context("loading configuration")?;
    args.apply(&mut cfg);
    cfg.validate()?;

    match migrate(&cfg).await {
        Ok(summary) => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Err(e) => {
            error!("migration failed: {:#}", e);
            Err(e)
        }
    }
}
