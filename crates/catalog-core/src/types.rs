//! Domain types shared by the extractor, pipeline and sinks.

use serde::{Deserialize, Serialize};

/// Dimensionality of every embedding produced and stored by the pipeline.
pub const EMBEDDING_DIM: usize = 768;

pub type Sku = String;

/// One product row exactly as read from the source store.
///
/// `tags` is kept raw: either a JSON-encoded list or a comma-separated string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub sku: Sku,
    pub handle: String,
    pub title: String,
    pub description: String,
    pub vendor: String,
    pub price: f64,
    pub currency: String,
    pub image_url: String,
    pub product_url: String,
    pub tags: String,
    pub search_content: String,
}

/// A transformed product ready for delivery.
///
/// - `tags`: normalized, ordered, non-empty trimmed strings
/// - `embedding_text`: derived summary fed to the embedding provider
/// - `embedding`: `None` when generation failed or was skipped, otherwise
///   exactly `EMBEDDING_DIM` values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub sku: Sku,
    pub handle: String,
    pub title: String,
    pub description: String,
    pub vendor: String,
    pub price: f64,
    pub currency: String,
    pub image_url: String,
    pub product_url: String,
    pub tags: Vec<String>,
    pub search_content: String,
    pub embedding_text: String,
    pub embedding: Option<Vec<f32>>,
}

impl EnrichedRecord {
    pub fn has_embedding(&self) -> bool {
        self.embedding.as_ref().is_some_and(|v| v.len() == EMBEDDING_DIM)
    }
}

/// Per-run embedding accounting, accumulated across all windows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// SKUs whose embedding failed, in processing order; re-drive these.
    pub failed_skus: Vec<Sku>,
}

impl BatchOutcome {
    pub fn new() -> Self { Self::default() }

    pub fn record_success(&mut self) {
        self.attempted += 1;
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self, sku: &str) {
        self.attempted += 1;
        self.failed += 1;
        self.failed_skus.push(sku.to_string());
    }
}

/// Outcome of the index provisioning step of the document-store sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    Existing,
    Created,
    Failed,
    Skipped,
}

/// What a sink did with the records handed to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub location: String,
    pub inserted: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub purged: usize,
    pub index: IndexStatus,
}

impl DeliveryReport {
    pub fn new(location: impl Into<String>) -> Self {
        Self { location: location.into(), inserted: 0, duplicates: 0, failed: 0, purged: 0, index: IndexStatus::Skipped }
    }
}

/// Read-back of the destination after delivery, for operator reporting only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub total: usize,
    pub with_embedding: usize,
    pub sample: Option<EnrichedRecord>,
}

/// Similarity metric declared on a vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    Cosine,
    L2,
    Dot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorIndexSpec {
    pub name: String,
    pub field: String,
    pub dims: usize,
    pub metric: SimilarityMetric,
}

impl VectorIndexSpec {
    /// Cosine index over the `embedding` field.
    pub fn embedding(name: impl Into<String>) -> Self {
        Self { name: name.into(), field: "embedding".to_string(), dims: EMBEDDING_DIM, metric: SimilarityMetric::Cosine }
    }
}

/// Filters understood by `DocumentStore::count_documents` / `find_one`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentFilter {
    All,
    WithEmbedding,
    Sku(Sku),
}
