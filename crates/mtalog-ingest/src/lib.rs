//! mtalog ingest library
//!
//! Turns MTA log files into consolidated per-message delivery records.
//!
//! # Pipeline
//!
//! 1. [`metadata::MetadataExtractor`] reads the pipe-delimited metadata log
//!    (`full_subjects.log`) into one [`models::MessageMetadata`] per message.
//! 2. [`events::EventCorrelator`] folds transfer-event logs (`mail.log`) into
//!    delivery / reject / completed flags per message.
//! 3. [`consolidate::consolidate`] joins both, keeps completed messages with
//!    a known outcome and drops identifiers storage already has.
//! 4. [`trigger::IngestTrigger`] runs the above and hands the records to a
//!    [`storage::RecordStore`].
//!
//! [`scheduler::Scheduler`] fires the trigger on a fixed interval or at a
//! daily wall-clock time.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mtalog_ingest::storage::MemoryRecordStore;
//! use mtalog_ingest::trigger::{IngestTrigger, LogSources};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let sources = LogSources::new(
//!         "/var/log/exim4/full_subjects.log",
//!         vec!["/var/log/exim4/mail.log".into()],
//!     );
//!     let trigger = IngestTrigger::new(sources, Arc::new(MemoryRecordStore::new()));
//!     let outcome = trigger.run_once().await?;
//!     println!("{outcome}");
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod consolidate;
pub mod error;
pub mod events;
pub mod metadata;
pub mod models;
pub mod reader;
pub mod scheduler;
pub mod storage;
pub mod trigger;

pub use error::{IngestError, IngestResult};
pub use models::{ConsolidatedRecord, ConsolidationOutcome, DeliveryStatus, IngestOutcome};
pub use trigger::IngestTrigger;
