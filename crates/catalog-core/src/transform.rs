//! Source row → destination document mapping.
//!
//! Everything here is pure: no I/O, no clock, no randomness. Running
//! `transform` twice on the same row yields identical output.
use serde_json::Value;

use crate::types::{EnrichedRecord, SourceRecord};

/// Maps one source row to the destination schema. `embedding` starts empty.
pub fn transform(record: &SourceRecord) -> EnrichedRecord {
    let tags = normalize_tags(&record.tags);
    let embedding_text = embedding_text(record, &tags);
    EnrichedRecord {
        sku: record.sku.clone(),
        handle: record.handle.clone(),
        title: record.title.clone(),
        description: record.description.clone(),
        vendor: record.vendor.clone(),
        price: record.price,
        currency: record.currency.clone(),
        image_url: record.image_url.clone(),
        product_url: record.product_url.clone(),
        tags,
        search_content: record.search_content.clone(),
        embedding_text,
        embedding: None,
    }
}

pub fn transform_all(records: &[SourceRecord]) -> Vec<EnrichedRecord> {
    records.iter().map(transform).collect()
}

/// Normalizes the flexible tag column.
///
/// A JSON array yields one tag per element, any other JSON value becomes a
/// single tag, and anything that is not JSON is split on commas. Tags are
/// trimmed, inner whitespace is collapsed and empty tags are dropped.
pub fn normalize_tags(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() { return Vec::new(); }
    let fragments: Vec<String> = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => items.into_iter().filter_map(json_tag).collect(),
        Ok(other) => json_tag(other).into_iter().collect(),
        Err(_) => raw.split(',').map(str::to_string).collect(),
    };
    fragments.iter().map(|f| collapse_whitespace(f)).filter(|t| !t.is_empty()).collect()
}

fn json_tag(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn collapse_whitespace(text: &str) -> String { text.split_whitespace().collect::<Vec<_>>().join(" ") }

/// Builds the canonical text summarising a product for semantic search:
/// `"{title} {description} from {vendor}. Price: {price} {currency}. Tags: {tags}. {search_content}"`,
/// with empty parts left out.
pub fn embedding_text(record: &SourceRecord, tags: &[String]) -> String {
    let mut headline: Vec<&str> = [record.title.trim(), record.description.trim()].into_iter().filter(|s| !s.is_empty()).collect();
    let vendor = record.vendor.trim();
    if !vendor.is_empty() {
        headline.push("from");
        headline.push(vendor);
    }
    let headline = headline.join(" ");
    let price = format!("Price: {:.2} {}", record.price, record.currency.trim());
    let tags_line = if tags.is_empty() { String::new() } else { format!("Tags: {}", tags.join(", ")) };

    [headline.as_str(), price.trim_end(), tags_line.as_str(), record.search_content.trim()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(". ")
        .trim()
        .to_string()
}
