//! Ingestion trigger
//!
//! One run: scan both logs, ask storage which identifiers it already holds,
//! consolidate, insert. Runs on the same trigger never overlap; a second
//! caller waits for the first to finish.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::config::IngestConfig;
use crate::consolidate::consolidate;
use crate::error::IngestResult;
use crate::events::EventCorrelator;
use crate::metadata::MetadataExtractor;
use crate::models::{ConsolidationOutcome, IngestOutcome, MessageEventGroup, MessageMetadata};
use crate::scheduler::ScheduledJob;
use crate::storage::RecordStore;

/// Files read by one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSources {
    pub metadata_path: PathBuf,
    pub event_paths: Vec<PathBuf>,
}

impl LogSources {
    pub fn new(metadata_path: impl Into<PathBuf>, event_paths: Vec<PathBuf>) -> Self {
        Self {
            metadata_path: metadata_path.into(),
            event_paths,
        }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            metadata_path: config.metadata_path(),
            event_paths: config.event_paths(),
        }
    }
}

/// Cheap-to-clone handle that runs the ingestion pipeline against a store
#[derive(Clone)]
pub struct IngestTrigger {
    sources: LogSources,
    store: Arc<dyn RecordStore>,
    run_lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for IngestTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestTrigger")
            .field("sources", &self.sources)
            .finish_non_exhaustive()
    }
}

impl IngestTrigger {
    pub fn new(sources: LogSources, store: Arc<dyn RecordStore>) -> Self {
        Self {
            sources,
            store,
            run_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn from_config(config: &IngestConfig, store: Arc<dyn RecordStore>) -> Self {
        Self::new(LogSources::from_config(config), store)
    }

    /// Scan and consolidate without writing anything.
    ///
    /// If the existence check fails the error is logged and every identifier
    /// is treated as new; the insert step drops anything already stored.
    pub async fn analyze(&self) -> IngestResult<ConsolidationOutcome> {
        let (metadata, events) = self.scan().await?;

        let candidates: Vec<String> = metadata.keys().cloned().collect();
        let known = self.known_identifiers(&candidates).await;

        Ok(consolidate(&metadata, &events, &known))
    }

    /// Full run: analyze, then insert whatever is ready.
    ///
    /// Storage is not touched when nothing is ready. Insert failures are
    /// returned to the caller.
    pub async fn run_once(&self) -> IngestResult<IngestOutcome> {
        let _running = self.run_lock.lock().await;

        info!(
            metadata = %self.sources.metadata_path.display(),
            event_logs = self.sources.event_paths.len(),
            "Starting ingestion run"
        );

        let outcome = self.analyze().await?;
        if outcome.is_empty() {
            info!(pending = outcome.pending.len(), "No new records ready to import");
            return Ok(IngestOutcome::NothingNew);
        }

        let inserted = self
            .store
            .insert_ignoring_duplicates(&outcome.records)
            .await
            .inspect_err(|e| error!(error = %e, records = outcome.records.len(), "Insert failed"))?;

        info!(
            inserted,
            offered = outcome.records.len(),
            pending = outcome.pending.len(),
            "Ingestion run complete"
        );

        Ok(IngestOutcome::Inserted(inserted))
    }

    async fn scan(
        &self,
    ) -> IngestResult<(HashMap<String, MessageMetadata>, HashMap<String, MessageEventGroup>)> {
        let metadata_path = self.sources.metadata_path.clone();
        let event_paths = self.sources.event_paths.clone();

        let metadata_scan =
            tokio::task::spawn_blocking(move || MetadataExtractor::new().extract(&metadata_path));
        let event_scan =
            tokio::task::spawn_blocking(move || EventCorrelator::new().correlate(&event_paths));

        let (metadata, events) = tokio::try_join!(metadata_scan, event_scan)?;
        Ok((metadata?, events?))
    }

    async fn known_identifiers(&self, candidates: &[String]) -> HashSet<String> {
        if candidates.is_empty() {
            return HashSet::new();
        }

        match self.store.existing_identifiers(candidates).await {
            Ok(known) => known,
            Err(e) => {
                error!(
                    error = %e,
                    candidates = candidates.len(),
                    "Existence check failed, treating all identifiers as new"
                );
                HashSet::new()
            },
        }
    }
}

#[async_trait]
impl ScheduledJob for IngestTrigger {
    fn name(&self) -> &str {
        "mail-log-ingest"
    }

    async fn run(&self) -> IngestResult<IngestOutcome> {
        self.run_once().await
    }
}
