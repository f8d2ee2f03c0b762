//! Ingestion error types

use mtalog_common::MtalogError;
use thiserror::Error;

/// Result type alias for ingestion operations
pub type IngestResult<T> = std::result::Result<T, IngestError>;

/// Errors raised by the ingestion pipeline and its storage collaborators
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking log scan panicked or was cancelled
    #[error("Log scan task failed: {0}")]
    TaskJoin(String),

    /// Configuration and store-level failures
    #[error(transparent)]
    Common(#[from] MtalogError),
}

impl From<tokio::task::JoinError> for IngestError {
    fn from(err: tokio::task::JoinError) -> Self {
        IngestError::TaskJoin(err.to_string())
    }
}
