use tracing::{info, warn};

use catalog_core::error::Result;
use catalog_core::traits::DocumentStore;
use catalog_core::types::{DocumentFilter, VerificationReport};

/// Reads back the collection after delivery. Errors are logged and produce no
/// report; verification never changes the run outcome.
pub async fn verify_store<S: DocumentStore + ?Sized>(store: &S) -> Option<VerificationReport> {
    match read_back(store).await {
        Ok(report) => {
            info!(
                total = report.total,
                with_embedding = report.with_embedding,
                sample = report.sample.as_ref().map(|s| s.sku.as_str()).unwrap_or("-"),
                "verified destination"
            );
            Some(report)
        }
        Err(e) => {
            warn!(error = %e, location = %store.location(), "verification failed");
            None
        }
    }
}

async fn read_back<S: DocumentStore + ?Sized>(store: &S) -> Result<VerificationReport> {
    let total = store.count_documents(&DocumentFilter::All).await?;
    let with_embedding = store.count_documents(&DocumentFilter::WithEmbedding).await?;
    let sample = store.find_one(&DocumentFilter::All).await?;
    Ok(VerificationReport { total, with_embedding, sample })
}
