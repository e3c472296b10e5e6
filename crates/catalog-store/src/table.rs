//! LanceDB connection helpers and product batch encoding/decoding.
use arrow_array::builder::{ListBuilder, StringBuilder};
use arrow_array::cast::AsArray;
use arrow_array::types::Float32Type;
use arrow_array::{Array, ArrayRef, FixedSizeListArray, Float64Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::Schema;
use lancedb::{connect, Connection};
use std::sync::Arc;

use catalog_core::error::{Error, Result};
use catalog_core::types::{EnrichedRecord, EMBEDDING_DIM};

use crate::schema::{build_product_schema, EMBEDDING_FIELD};

pub async fn open_db(uri: &str) -> Result<Connection> {
    connect(uri).execute().await.map_err(|e| Error::DestinationUnavailable(format!("{}: {}", uri, e)))
}

/// Creates `name` with zero rows when it does not exist yet. An existing table
/// must carry every column of `schema`.
pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<Schema>) -> Result<()> {
    let names = conn.table_names().execute().await.map_err(unavailable)?;
    if names.iter().any(|n| n == name) {
        let table = conn.open_table(name).execute().await.map_err(unavailable)?;
        let existing = table.schema().await.map_err(unavailable)?;
        for field in schema.fields() {
            if existing.field_with_name(field.name()).is_err() {
                return Err(Error::DestinationUnavailable(format!(
                    "collection '{}' exists without column '{}'",
                    name,
                    field.name()
                )));
            }
        }
        return Ok(());
    }
    let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
    conn.create_table(name, Box::new(iter)).execute().await.map_err(unavailable)?;
    Ok(())
}

fn unavailable(e: lancedb::Error) -> Error { Error::DestinationUnavailable(e.to_string()) }

pub fn records_to_batch(docs: &[EnrichedRecord]) -> std::result::Result<RecordBatch, arrow_schema::ArrowError> {
    let schema = build_product_schema();
    let mut tags = ListBuilder::new(StringBuilder::new());
    for doc in docs {
        for tag in &doc.tags { tags.values().append_value(tag); }
        tags.append(true);
    }
    let vectors = docs.iter().map(|d| {
        d.embedding.as_ref().filter(|v| v.len() == EMBEDDING_DIM).map(|v| v.iter().map(|&x| Some(x)).collect::<Vec<_>>())
    });
    RecordBatch::try_new(schema, vec![
        strings(docs, |d| d.sku.as_str()),
        strings(docs, |d| d.handle.as_str()),
        strings(docs, |d| d.title.as_str()),
        strings(docs, |d| d.description.as_str()),
        strings(docs, |d| d.vendor.as_str()),
        Arc::new(Float64Array::from_iter_values(docs.iter().map(|d| d.price))),
        strings(docs, |d| d.currency.as_str()),
        strings(docs, |d| d.image_url.as_str()),
        strings(docs, |d| d.product_url.as_str()),
        Arc::new(tags.finish()),
        strings(docs, |d| d.search_content.as_str()),
        strings(docs, |d| d.embedding_text.as_str()),
        Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors, EMBEDDING_DIM as i32)),
    ])
}

fn strings(docs: &[EnrichedRecord], f: fn(&EnrichedRecord) -> &str) -> ArrayRef {
    Arc::new(StringArray::from_iter_values(docs.iter().map(f)))
}

pub fn batch_to_records(batch: &RecordBatch) -> Result<Vec<EnrichedRecord>> {
    let text = |name: &str| -> Result<&StringArray> {
        batch
            .column_by_name(name)
            .and_then(|c| c.as_string_opt::<i32>())
            .ok_or_else(|| Error::DestinationUnavailable(format!("{} column missing", name)))
    };
    let (sku, handle, title, description, vendor) =
        (text("sku")?, text("handle")?, text("title")?, text("description")?, text("vendor")?);
    let (currency, image_url, product_url) = (text("currency")?, text("image_url")?, text("product_url")?);
    let (search_content, embedding_text) = (text("search_content")?, text("embedding_text")?);
    let price = batch
        .column_by_name("price")
        .and_then(|c| c.as_primitive_opt::<arrow_array::types::Float64Type>())
        .ok_or_else(|| Error::DestinationUnavailable("price column missing".to_string()))?;
    let tags = batch
        .column_by_name("tags")
        .and_then(|c| c.as_list_opt::<i32>())
        .ok_or_else(|| Error::DestinationUnavailable("tags column missing".to_string()))?;
    let vectors = batch
        .column_by_name(EMBEDDING_FIELD)
        .and_then(|c| c.as_fixed_size_list_opt())
        .ok_or_else(|| Error::DestinationUnavailable("embedding column missing".to_string()))?;

    let mut out = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let row_tags = tags.value(i);
        let row_tags: Vec<String> = row_tags
            .as_string_opt::<i32>()
            .map(|s| s.iter().flatten().map(str::to_string).collect())
            .unwrap_or_default();
        let embedding = if vectors.is_valid(i) {
            let inner = vectors.value(i);
            inner.as_primitive_opt::<Float32Type>().map(|v| v.values().to_vec())
        } else {
            None
        };
        out.push(EnrichedRecord {
            sku: sku.value(i).to_string(),
            handle: handle.value(i).to_string(),
            title: title.value(i).to_string(),
            description: description.value(i).to_string(),
            vendor: vendor.value(i).to_string(),
            price: price.value(i),
            currency: currency.value(i).to_string(),
            image_url: image_url.value(i).to_string(),
            product_url: product_url.value(i).to_string(),
            tags: row_tags,
            search_content: search_content.value(i).to_string(),
            embedding_text: embedding_text.value(i).to_string(),
            embedding,
        });
    }
    Ok(out)
}
