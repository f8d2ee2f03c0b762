//! Error types for mtalog

use thiserror::Error;

/// Error type shared by the mtalog crates
#[derive(Error, Debug)]
pub enum MtalogError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),
}
