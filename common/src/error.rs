use thiserror::Error;
use tokio::task::JoinError;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("Malformed source response: {0}")]
    MalformedResponse(String),
    #[error("Enrichment failed: {0}")]
    EnrichmentFailed(String),
    #[error("Destination write failed for '{collection}' ({docs} document(s)): {message}")]
    WriteFailed {
        collection: String,
        docs: usize,
        message: String,
    },
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("A migration run is already active")]
    ConcurrentRunRejected,
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the error class is worth another attempt. Transport failures
    /// and 5xx responses are transient; malformed payloads and schema
    /// disagreements are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::SourceUnavailable(_) | AppError::ServiceUnavailable(_) | AppError::Http(_)
        )
    }
}
