use std::time::Duration;
use thiserror::Error;

/// Errors raised while talking to the backing store over HTTP.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("chunk insert batch failed after {persisted} chunks were written: {source}")]
    InsertFailed {
        persisted: usize,
        #[source]
        source: StoreError,
    },
}

/// Per-item embedding provider failures. Rate limits get their own variant so
/// callers can treat them as recoverable and re-embed just the affected chunks.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding provider rate limited ({model})")]
    RateLimited { model: String },

    #[error("embedding provider {model} rejected the request: {details}")]
    Provider { model: String, details: String },

    #[error("embedding provider {model} returned a {got}-dim vector, expected {expected}")]
    WrongDimensions {
        model: String,
        got: usize,
        expected: usize,
    },

    #[error("missing api key: {0}")]
    MissingApiKey(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl EmbedError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, EmbedError::RateLimited { .. })
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry refresh failed with no cache to serve: {0}")]
    Refresh(#[source] StoreError),
}

/// Retrieval failures are kept distinct from empty results: an empty match
/// list means the search ran and nothing cleared the threshold.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("query is empty")]
    EmptyQuery,

    #[error("no target documents")]
    NoDocuments,

    #[error("incompatible document set: {0}")]
    IncompatibleDocuments(String),

    #[error("query embedding failed: {0}")]
    Embed(#[from] EmbedError),

    #[error("similarity search failed: {0}")]
    Store(#[from] StoreError),

    #[error("retrieval timed out after {budget:?}")]
    TimedOut { budget: Duration },
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
