//! Record storage
//!
//! The pipeline talks to storage through [`RecordStore`]: an existence check
//! over candidate identifiers and an insert that silently skips rows whose
//! `(message_id, recipient, status)` key is already present.
//!
//! - [`MySqlRecordStore`] backs the `email_logs` table through a sqlx pool.
//! - [`MemoryRecordStore`] keeps rows in memory; used by `--dry-run` and tests.

use async_trait::async_trait;
use mtalog_common::MtalogError;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::{MySql, QueryBuilder, Transaction};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::error::{IngestError, IngestResult};
use crate::models::{ConsolidatedRecord, DeliveryStatus};

/// Rows per multi-row INSERT (9 binds each)
pub const INSERT_CHUNK_SIZE: usize = 1000;

/// Identifiers per existence query
pub const LOOKUP_CHUNK_SIZE: usize = 5000;

/// Storage used by the ingestion pipeline
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Subset of `candidates` that already has at least one stored row
    async fn existing_identifiers(&self, candidates: &[String]) -> IngestResult<HashSet<String>>;

    /// Insert `records`, skipping duplicates; returns rows actually inserted
    async fn insert_ignoring_duplicates(&self, records: &[ConsolidatedRecord]) -> IngestResult<u64>;
}

/// MySQL-backed store for the `email_logs` table
#[derive(Debug, Clone)]
pub struct MySqlRecordStore {
    db: MySqlPool,
}

impl MySqlRecordStore {
    /// Open a connection pool with the configured limits
    pub async fn connect(config: &DatabaseConfig) -> IngestResult<Self> {
        let options = config.connect_options()?;
        let db = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .connect_with(options)
            .await?;

        info!(
            max_connections = config.max_connections,
            "Connected to MySQL"
        );

        Ok(Self { db })
    }

    /// Build the pool without connecting; connections open on first use.
    ///
    /// Used by the scheduler so an unreachable database fails a tick instead
    /// of start-up.
    pub fn connect_lazy(config: &DatabaseConfig) -> IngestResult<Self> {
        let db = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .connect_lazy_with(config.connect_options()?);
        Ok(Self { db })
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.db
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> IngestResult<()> {
        info!("Running database migrations");
        sqlx::migrate!("../../migrations").run(&self.db).await?;
        info!("Migrations complete");
        Ok(())
    }

    async fn insert_chunk(
        &self,
        tx: &mut Transaction<'_, MySql>,
        records: &[ConsolidatedRecord],
    ) -> IngestResult<u64> {
        let mut query_builder: QueryBuilder<MySql> = QueryBuilder::new(
            r#"
            INSERT IGNORE INTO email_logs (
                message_id,
                log_date,
                log_time,
                from_email,
                to_email,
                status,
                origin_host,
                origin_ip,
                subject
            )
            "#,
        );

        query_builder.push_values(records, |mut b, record| {
            b.push_bind(&record.message_id)
                .push_bind(record.date)
                .push_bind(record.time)
                .push_bind(&record.sender)
                .push_bind(&record.recipient)
                .push_bind(record.status.as_str())
                .push_bind(&record.origin_host)
                .push_bind(&record.origin_ip)
                .push_bind(&record.subject);
        });

        let result = query_builder.build().execute(&mut **tx).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RecordStore for MySqlRecordStore {
    async fn existing_identifiers(&self, candidates: &[String]) -> IngestResult<HashSet<String>> {
        let mut found = HashSet::new();

        for chunk in candidates.chunks(LOOKUP_CHUNK_SIZE) {
            let mut query_builder: QueryBuilder<MySql> =
                QueryBuilder::new("SELECT DISTINCT message_id FROM email_logs WHERE message_id IN (");
            let mut separated = query_builder.separated(", ");
            for id in chunk {
                separated.push_bind(id);
            }
            separated.push_unseparated(")");

            let rows: Vec<String> = query_builder
                .build_query_scalar()
                .fetch_all(&self.db)
                .await?;
            found.extend(rows);
        }

        debug!(
            candidates = candidates.len(),
            found = found.len(),
            "Existence check finished"
        );

        Ok(found)
    }

    async fn insert_ignoring_duplicates(&self, records: &[ConsolidatedRecord]) -> IngestResult<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let total_chunks = records.len().div_ceil(INSERT_CHUNK_SIZE);
        let mut tx = self.db.begin().await?;
        let mut inserted = 0;

        for (chunk_idx, chunk) in records.chunks(INSERT_CHUNK_SIZE).enumerate() {
            debug!(
                chunk = chunk_idx + 1,
                total_chunks,
                rows = chunk.len(),
                "Inserting chunk"
            );
            inserted += self.insert_chunk(&mut tx, chunk).await?;
        }

        tx.commit().await?;

        info!(
            offered = records.len(),
            inserted,
            "Records stored"
        );

        Ok(inserted)
    }
}

type DedupKey = (String, String, DeliveryStatus);

#[derive(Debug, Default)]
struct MemoryState {
    rows: Vec<ConsolidatedRecord>,
    keys: HashSet<DedupKey>,
    fail_lookups: bool,
    fail_inserts: bool,
}

impl MemoryState {
    fn insert(&mut self, record: &ConsolidatedRecord) -> bool {
        let (message_id, recipient, status) = record.dedup_key();
        if self.keys.insert((message_id.to_string(), recipient.to_string(), status)) {
            self.rows.push(record.clone());
            true
        } else {
            false
        }
    }
}

/// In-memory store with the same duplicate semantics as `email_logs`.
///
/// Clones share state. Failures can be switched on to exercise error paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with existing rows
    pub fn with_records(records: impl IntoIterator<Item = ConsolidatedRecord>) -> Self {
        let store = Self::new();
        {
            let mut state = store.lock();
            for record in records {
                state.insert(&record);
            }
        }
        store
    }

    /// Stored rows in insertion order
    pub fn records(&self) -> Vec<ConsolidatedRecord> {
        self.lock().rows.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().rows.is_empty()
    }

    pub fn fail_lookups(&self, fail: bool) {
        self.lock().fail_lookups = fail;
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.lock().fail_inserts = fail;
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn existing_identifiers(&self, candidates: &[String]) -> IngestResult<HashSet<String>> {
        let state = self.lock();
        if state.fail_lookups {
            return Err(IngestError::Common(MtalogError::Database(
                "existence check unavailable".to_string(),
            )));
        }

        let stored: HashSet<&str> = state.rows.iter().map(|r| r.message_id.as_str()).collect();
        Ok(candidates
            .iter()
            .filter(|id| stored.contains(id.as_str()))
            .cloned()
            .collect())
    }

    async fn insert_ignoring_duplicates(&self, records: &[ConsolidatedRecord]) -> IngestResult<u64> {
        let mut state = self.lock();
        if state.fail_inserts {
            return Err(IngestError::Common(MtalogError::Database(
                "insert unavailable".to_string(),
            )));
        }

        let inserted = records.iter().filter(|record| state.insert(record)).count();
        Ok(inserted as u64)
    }
}
