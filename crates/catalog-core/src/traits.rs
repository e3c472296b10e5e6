use async_trait::async_trait;

use crate::error::{ProviderError, Result};
use crate::types::{DocumentFilter, EnrichedRecord, SourceRecord, VectorIndexSpec};

/// Read-only access to the catalog rows.
pub trait RecordSource: Send + Sync {
    /// Every record of the designated table, in the store's natural order.
    fn extract(&self) -> Result<Vec<SourceRecord>>;
}

/// A remote (or local) capability turning one text into one vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `gemini:text-embedding-004`).
    fn provider_id(&self) -> &str;
    fn dim(&self) -> usize;
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError>;
}

/// Collection-scoped operations the document-store sink relies on.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Human-readable location of the collection, used in reports.
    fn location(&self) -> String;
    async fn list_indexes(&self) -> Result<Vec<String>>;
    async fn create_vector_index(&self, spec: &VectorIndexSpec) -> Result<()>;
    /// Removes every document; returns how many were removed.
    async fn delete_all(&self) -> Result<usize>;
    /// Fails with `Error::DuplicateKey` when the sku is already present.
    async fn insert_one(&self, doc: &EnrichedRecord) -> Result<()>;
    async fn count_documents(&self, filter: &DocumentFilter) -> Result<usize>;
    async fn find_one(&self, filter: &DocumentFilter) -> Result<Option<EnrichedRecord>>;
}
