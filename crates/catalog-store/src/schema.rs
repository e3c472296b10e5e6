use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

use catalog_core::types::EMBEDDING_DIM;

pub const EMBEDDING_FIELD: &str = "embedding";

/// Column order of the product collection. `embedding` is null for records
/// whose embedding could not be generated.
pub fn build_product_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("sku", DataType::Utf8, false),
        Field::new("handle", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, false),
        Field::new("description", DataType::Utf8, false),
        Field::new("vendor", DataType::Utf8, false),
        Field::new("price", DataType::Float64, false),
        Field::new("currency", DataType::Utf8, false),
        Field::new("image_url", DataType::Utf8, false),
        Field::new("product_url", DataType::Utf8, false),
        Field::new("tags", DataType::List(Arc::new(Field::new("item", DataType::Utf8, true))), false),
        Field::new("search_content", DataType::Utf8, false),
        Field::new("embedding_text", DataType::Utf8, false),
        Field::new(
            EMBEDDING_FIELD,
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), EMBEDDING_DIM as i32),
            true,
        ),
    ]))
}
