//! mtalog Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging for the mtalog workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`MtalogError`]
//! - **Logging**: [`logging::init_logging`] and its [`logging::LogConfig`]
//!
//! # Example
//!
//! ```no_run
//! use mtalog_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     init_logging(&config)?;
//!     tracing::info!("mail log ingestion starting");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::MtalogError;
