//! Delivery of enriched records to their destination.
//!
//! [`StoreSink`] provisions the vector index, optionally purges, then inserts
//! one document per record. [`FileSink`] writes a single JSON export that
//! replaces any previous file atomically.
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use catalog_core::error::{Error, Result};
use catalog_core::traits::DocumentStore;
use catalog_core::types::{DeliveryReport, EnrichedRecord, IndexStatus, VectorIndexSpec, VerificationReport};

use crate::progress::progress_bar;
use crate::verify::verify_store;

#[async_trait]
pub trait RecordSink: Send + Sync {
    fn location(&self) -> String;
    async fn deliver(&self, records: &[EnrichedRecord]) -> Result<DeliveryReport>;
    /// Post-delivery read-back; sinks without one return `None`.
    async fn verify(&self) -> Option<VerificationReport> { None }
}

pub struct StoreSink {
    store: Arc<dyn DocumentStore>,
    index: VectorIndexSpec,
    purge: bool,
    show_progress: bool,
}

impl StoreSink {
    pub fn new(store: Arc<dyn DocumentStore>, index_name: &str, purge: bool) -> Self {
        Self { store, index: VectorIndexSpec::embedding(index_name), purge, show_progress: false }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    async fn provision_index(&self) -> IndexStatus {
        match self.store.list_indexes().await {
            Ok(names) if names.contains(&self.index.name) => {
                debug!(index = %self.index.name, "vector index already present");
                return IndexStatus::Existing;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "could not list indexes");
                return IndexStatus::Failed;
            }
        }
        match self.store.create_vector_index(&self.index).await {
            Ok(()) => {
                info!(index = %self.index.name, dims = self.index.dims, "created vector index");
                IndexStatus::Created
            }
            Err(e) => {
                warn!(error = %e, index = %self.index.name, "vector index provisioning failed; continuing");
                IndexStatus::Failed
            }
        }
    }
}

#[async_trait]
impl RecordSink for StoreSink {
    fn location(&self) -> String { self.store.location() }

    async fn deliver(&self, records: &[EnrichedRecord]) -> Result<DeliveryReport> {
        let mut report = DeliveryReport::new(self.store.location());
        report.index = self.provision_index().await;

        if self.purge {
            match self.store.delete_all().await {
                Ok(removed) => {
                    warn!(removed, location = %report.location, "purged existing documents before insert");
                    report.purged = removed;
                }
                Err(e) => warn!(error = %e, "purge failed; inserting into existing collection"),
            }
        }

        let pb = progress_bar(records.len(), "documents", self.show_progress);
        for record in records {
            match self.store.insert_one(record).await {
                Ok(()) => report.inserted += 1,
                Err(Error::DuplicateKey(sku)) => {
                    warn!(%sku, "duplicate sku; skipped");
                    report.duplicates += 1;
                }
                Err(e) => {
                    warn!(sku = %record.sku, error = %e, "insert failed");
                    report.failed += 1;
                }
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        // Index training needs rows; retry once the collection is populated.
        if report.index == IndexStatus::Failed && report.inserted > 0 {
            match self.store.create_vector_index(&self.index).await {
                Ok(()) => {
                    info!(index = %self.index.name, "created vector index after insert");
                    report.index = IndexStatus::Created;
                }
                Err(e) => warn!(index = %self.index.name, error = %e, "vector index still unavailable after insert"),
            }
        }

        info!(
            inserted = report.inserted,
            duplicates = report.duplicates,
            failed = report.failed,
            index = ?report.index,
            "delivered to document store"
        );
        Ok(report)
    }

    async fn verify(&self) -> Option<VerificationReport> { verify_store(self.store.as_ref()).await }
}

/// Shape of the JSON export.
#[derive(Serialize)]
struct ExportDocument<'a> {
    generated_at: String,
    total: usize,
    with_embedding: usize,
    records: &'a [EnrichedRecord],
}

pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }

    pub fn path(&self) -> &Path { &self.path }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl RecordSink for FileSink {
    fn location(&self) -> String { self.path.display().to_string() }

    async fn deliver(&self, records: &[EnrichedRecord]) -> Result<DeliveryReport> {
        let doc = ExportDocument {
            generated_at: Utc::now().to_rfc3339(),
            total: records.len(),
            with_embedding: records.iter().filter(|r| r.has_embedding()).count(),
            records,
        };
        let bytes = serde_json::to_vec_pretty(&doc).map_err(|e| Error::SinkWriteFailed(e.to_string()))?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| Error::SinkWriteFailed(e.to_string()))?
            .map_err(|e| Error::SinkWriteFailed(format!("{}: {}", self.path.display(), e)))?;

        let mut report = DeliveryReport::new(self.location());
        report.inserted = records.len();
        info!(path = %report.location, records = records.len(), with_embedding = doc.with_embedding, "wrote export file");
        Ok(report)
    }
}
