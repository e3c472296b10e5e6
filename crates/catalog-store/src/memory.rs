use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use catalog_core::error::{Error, Result};
use catalog_core::traits::DocumentStore;
use catalog_core::types::{DocumentFilter, EnrichedRecord, VectorIndexSpec};

/// In-process `DocumentStore` with unique-sku semantics. Used by tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    docs: Mutex<Vec<EnrichedRecord>>,
    indexes: Mutex<Vec<String>>,
    failing_skus: HashSet<String>,
    fail_index: bool,
    index_attempts: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    /// Pre-populates the collection, bypassing duplicate checks.
    pub fn with_documents(docs: Vec<EnrichedRecord>) -> Self {
        Self { docs: Mutex::new(docs), ..Self::default() }
    }

    /// `create_vector_index` fails with `IndexProvisionFailed`.
    pub fn with_failing_index(mut self) -> Self {
        self.fail_index = true;
        self
    }

    /// Inserts of these skus fail with `InsertFailed`.
    pub fn with_failing_inserts<I: IntoIterator<Item = S>, S: Into<String>>(mut self, skus: I) -> Self {
        self.failing_skus = skus.into_iter().map(Into::into).collect();
        self
    }

    pub fn documents(&self) -> Vec<EnrichedRecord> { self.docs.lock().map(|d| d.clone()).unwrap_or_default() }

    pub fn index_names(&self) -> Vec<String> { self.indexes.lock().map(|i| i.clone()).unwrap_or_default() }

    /// Calls to `create_vector_index`, successful or not.
    pub fn index_attempts(&self) -> usize { self.index_attempts.load(Ordering::SeqCst) }

    fn lock_docs(&self) -> Result<std::sync::MutexGuard<'_, Vec<EnrichedRecord>>> {
        self.docs.lock().map_err(|_| Error::DestinationUnavailable("memory store poisoned".to_string()))
    }
}

fn matches(doc: &EnrichedRecord, filter: &DocumentFilter) -> bool {
    match filter {
        DocumentFilter::All => true,
        DocumentFilter::WithEmbedding => doc.embedding.is_some(),
        DocumentFilter::Sku(sku) => &doc.sku == sku,
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn location(&self) -> String { "memory".to_string() }

    async fn list_indexes(&self) -> Result<Vec<String>> { Ok(self.index_names()) }

    async fn create_vector_index(&self, spec: &VectorIndexSpec) -> Result<()> {
        self.index_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_index {
            return Err(Error::IndexProvisionFailed(format!("{}: index creation refused", spec.name)));
        }
        let mut indexes = self.indexes.lock().map_err(|_| Error::IndexProvisionFailed("memory store poisoned".to_string()))?;
        if !indexes.contains(&spec.name) {
            indexes.push(spec.name.clone());
        }
        Ok(())
    }

    async fn delete_all(&self) -> Result<usize> {
        let mut docs = self.lock_docs()?;
        let removed = docs.len();
        docs.clear();
        Ok(removed)
    }

    async fn insert_one(&self, doc: &EnrichedRecord) -> Result<()> {
        if self.failing_skus.contains(&doc.sku) {
            return Err(Error::InsertFailed { sku: doc.sku.clone(), message: "write refused".to_string() });
        }
        let mut docs = self.lock_docs()?;
        if docs.iter().any(|d| d.sku == doc.sku) {
            return Err(Error::DuplicateKey(doc.sku.clone()));
        }
        docs.push(doc.clone());
        Ok(())
    }

    async fn count_documents(&self, filter: &DocumentFilter) -> Result<usize> {
        Ok(self.lock_docs()?.iter().filter(|d| matches(d, filter)).count())
    }

    async fn find_one(&self, filter: &DocumentFilter) -> Result<Option<EnrichedRecord>> {
        Ok(self.lock_docs()?.iter().find(|d| matches(d, filter)).cloned())
    }
}
