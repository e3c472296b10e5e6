//! `DocumentStore` backed by a LanceDB table.
//!
//! LanceDB has no unique constraints, so `insert_one` checks for an existing
//! `sku` with `count_rows` before appending. The pipeline inserts one record at
//! a time from a single task, which keeps that check race-free for a run.
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::index::vector::{IvfFlatIndexBuilder, IvfPqIndexBuilder};
use lancedb::index::Index;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use arrow_array::RecordBatchIterator;
use tracing::{debug, info};

use catalog_core::error::{Error, Result};
use catalog_core::traits::DocumentStore;
use catalog_core::types::{DocumentFilter, EnrichedRecord, SimilarityMetric, VectorIndexSpec};

use crate::schema::{build_product_schema, EMBEDDING_FIELD};
use crate::table::{batch_to_records, ensure_table, open_db, records_to_batch};

/// PQ codebooks have 256 centroids per sub-vector; fewer rows cannot train them.
pub const PQ_MIN_ROWS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexPlan {
    IvfFlat { num_partitions: u32 },
    IvfPq(IvfPqParams),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IvfPqParams {
    pub num_partitions: u32,
    pub num_sub_vectors: u32,
}

/// Partition count grows with `sqrt(rows)` and stays below the row count.
fn num_partitions(rows: usize) -> u32 {
    let mut n = ((rows as f64).sqrt() as usize).clamp(1, 4096);
    if rows > 1 {
        n = n.min(rows - 1);
    }
    n.max(1) as u32
}

/// IVF_PQ parameters for a table with at least [`PQ_MIN_ROWS`] vectors.
pub fn compute_ivfpq_params(rows: usize, dims: usize) -> IvfPqParams {
    let num_sub_vectors = if dims % 16 == 0 { 16 } else { 1 };
    IvfPqParams { num_partitions: num_partitions(rows.max(PQ_MIN_ROWS)), num_sub_vectors }
}

/// Small collections get an uncompressed IVF index; PQ needs enough rows to train.
pub fn plan_vector_index(rows: usize, dims: usize) -> IndexPlan {
    if rows < PQ_MIN_ROWS {
        IndexPlan::IvfFlat { num_partitions: num_partitions(rows) }
    } else {
        IndexPlan::IvfPq(compute_ivfpq_params(rows, dims))
    }
}

pub struct LanceDocumentStore {
    uri: String,
    collection: String,
    _conn: Connection,
    table: Table,
}

impl LanceDocumentStore {
    /// Connects to `uri` and opens (or creates empty) the `collection` table.
    /// Any failure here is `DestinationUnavailable`.
    pub async fn open(uri: &str, collection: &str) -> Result<Self> {
        let conn = open_db(uri).await?;
        ensure_table(&conn, collection, build_product_schema()).await?;
        let table = conn
            .open_table(collection)
            .execute()
            .await
            .map_err(|e| Error::DestinationUnavailable(format!("{}/{}: {}", uri, collection, e)))?;
        info!(uri, collection, "opened document collection");
        Ok(Self { uri: uri.to_string(), collection: collection.to_string(), _conn: conn, table })
    }

    fn predicate(filter: &DocumentFilter) -> Option<String> {
        match filter {
            DocumentFilter::All => None,
            DocumentFilter::WithEmbedding => Some(format!("{} IS NOT NULL", EMBEDDING_FIELD)),
            DocumentFilter::Sku(sku) => Some(format!("sku = '{}'", sku.replace('\'', "''"))),
        }
    }
}

fn distance_type(metric: SimilarityMetric) -> DistanceType {
    match metric {
        SimilarityMetric::Cosine => DistanceType::Cosine,
        SimilarityMetric::L2 => DistanceType::L2,
        SimilarityMetric::Dot => DistanceType::Dot,
    }
}

fn store_err(e: lancedb::Error) -> Error { Error::DestinationUnavailable(e.to_string()) }

#[async_trait]
impl DocumentStore for LanceDocumentStore {
    fn location(&self) -> String { format!("{}#{}", self.uri, self.collection) }

    async fn list_indexes(&self) -> Result<Vec<String>> {
        let indices = self.table.list_indices().await.map_err(store_err)?;
        Ok(indices.into_iter().map(|i| i.name).collect())
    }

    async fn create_vector_index(&self, spec: &VectorIndexSpec) -> Result<()> {
        let rows = self
            .table
            .count_rows(Self::predicate(&DocumentFilter::WithEmbedding))
            .await
            .map_err(|e| Error::IndexProvisionFailed(e.to_string()))?;
        if rows == 0 {
            return Err(Error::IndexProvisionFailed(format!(
                "'{}' has no embedded rows to train index '{}'",
                self.collection, spec.name
            )));
        }
        let distance = distance_type(spec.metric);
        let index = match plan_vector_index(rows, spec.dims) {
            IndexPlan::IvfFlat { num_partitions } => {
                debug!(index = %spec.name, rows, partitions = num_partitions, "building IVF_FLAT index");
                Index::IvfFlat(IvfFlatIndexBuilder::default().distance_type(distance).num_partitions(num_partitions))
            }
            IndexPlan::IvfPq(params) => {
                debug!(index = %spec.name, rows, partitions = params.num_partitions, "building IVF_PQ index");
                Index::IvfPq(
                    IvfPqIndexBuilder::default()
                        .distance_type(distance)
                        .num_partitions(params.num_partitions)
                        .num_sub_vectors(params.num_sub_vectors),
                )
            }
        };
        self.table
            .create_index(&[spec.field.as_str()], index)
            .name(spec.name.clone())
            .execute()
            .await
            .map_err(|e| Error::IndexProvisionFailed(format!("{}: {}", spec.name, e)))
    }

    async fn delete_all(&self) -> Result<usize> {
        let existing = self.table.count_rows(None).await.map_err(store_err)?;
        if existing == 0 {
            return Ok(0);
        }
        self.table.delete("true").await.map_err(store_err)?;
        Ok(existing)
    }

    async fn insert_one(&self, doc: &EnrichedRecord) -> Result<()> {
        let insert_err = |message: String| Error::InsertFailed { sku: doc.sku.clone(), message };
        let dup = self
            .table
            .count_rows(Self::predicate(&DocumentFilter::Sku(doc.sku.clone())))
            .await
            .map_err(|e| insert_err(e.to_string()))?;
        if dup > 0 {
            return Err(Error::DuplicateKey(doc.sku.clone()));
        }
        let batch = records_to_batch(std::slice::from_ref(doc)).map_err(|e| insert_err(e.to_string()))?;
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        self.table.add(reader).execute().await.map_err(|e| insert_err(e.to_string()))?;
        Ok(())
    }

    async fn count_documents(&self, filter: &DocumentFilter) -> Result<usize> {
        self.table.count_rows(Self::predicate(filter)).await.map_err(store_err)
    }

    async fn find_one(&self, filter: &DocumentFilter) -> Result<Option<EnrichedRecord>> {
        let mut query = self.table.query().limit(1);
        if let Some(predicate) = Self::predicate(filter) {
            query = query.only_if(predicate);
        }
        let mut stream = query.execute().await.map_err(store_err)?;
        while let Some(batch) = stream.try_next().await.map_err(store_err)? {
            if batch.num_rows() == 0 { continue; }
            return Ok(batch_to_records(&batch)?.into_iter().next());
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_collections_get_a_flat_index() {
        assert_eq!(plan_vector_index(3, 768), IndexPlan::IvfFlat { num_partitions: 1 });
        assert_eq!(plan_vector_index(10, 768), IndexPlan::IvfFlat { num_partitions: 3 });
        assert_eq!(plan_vector_index(1, 768), IndexPlan::IvfFlat { num_partitions: 1 });
        assert_eq!(plan_vector_index(255, 768), IndexPlan::IvfFlat { num_partitions: 15 });
    }

    #[test]
    fn pq_starts_at_codebook_size() {
        assert_eq!(
            plan_vector_index(256, 768),
            IndexPlan::IvfPq(IvfPqParams { num_partitions: 16, num_sub_vectors: 16 })
        );
        let p = compute_ivfpq_params(1_000_000, 768);
        assert_eq!(p.num_partitions, 1000);
        assert_eq!(compute_ivfpq_params(1_000, 100).num_sub_vectors, 1);
    }

    #[test]
    fn sku_predicate_escapes_quotes() {
        let p = LanceDocumentStore::predicate(&DocumentFilter::Sku("o'neil".into()));
        assert_eq!(p.as_deref(), Some("sku = 'o''neil'"));
        assert_eq!(LanceDocumentStore::predicate(&DocumentFilter::All), None);
    }
}
