use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Source query failed: {0}")]
    SourceQueryFailed(String),

    #[error("Embedding rejected: {0}")]
    EmbeddingRejected(String),

    #[error("Embedding unavailable after {attempts} attempt(s): {message}")]
    EmbeddingUnavailable { attempts: u32, message: String },

    #[error("Destination unavailable: {0}")]
    DestinationUnavailable(String),

    #[error("Index provisioning failed: {0}")]
    IndexProvisionFailed(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Insert failed for {sku}: {message}")]
    InsertFailed { sku: String, message: String },

    #[error("Sink write failed: {0}")]
    SinkWriteFailed(String),

    #[error("Run cancelled")]
    Cancelled,
}

impl Error {
    /// Whether this error aborts the whole run. Per-item embedding and insert
    /// failures, index provisioning and duplicates are absorbed into counters.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::EmbeddingRejected(_)
                | Error::EmbeddingUnavailable { .. }
                | Error::IndexProvisionFailed(_)
                | Error::DuplicateKey(_)
                | Error::InsertFailed { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by an embedding provider. Only `rate_limited` failures
/// are retried by the embedding client.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub message: String,
    pub rate_limited: bool,
}

impl ProviderError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self { message: message.into(), rate_limited: false }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self { message: message.into(), rate_limited: true }
    }
}
