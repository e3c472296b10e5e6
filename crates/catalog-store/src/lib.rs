//! Destinations for enriched catalog records.
//!
//! - `lance`: LanceDB-backed [`DocumentStore`](catalog_core::traits::DocumentStore)
//! - `memory`: in-process store used by tests and dry runs
//! - `sink`: the document-store and JSON file sinks the pipeline delivers to
//! - `verify`: post-delivery read-back
pub mod lance;
pub mod memory;
pub mod progress;
pub mod schema;
pub mod sink;
pub mod table;
pub mod verify;

pub use lance::LanceDocumentStore;
pub use memory::MemoryStore;
pub use sink::{FileSink, RecordSink, StoreSink};
pub use verify::verify_store;
