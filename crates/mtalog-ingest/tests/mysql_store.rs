//! MySQL storage tests
//!
//! Need Docker; run with `cargo test -- --ignored`.

mod common;

use anyhow::Result;
use chrono::{NaiveDate, NaiveTime};
use common::init_tracing;
use mtalog_ingest::config::DatabaseConfig;
use mtalog_ingest::storage::{MySqlRecordStore, RecordStore};
use mtalog_ingest::{ConsolidatedRecord, DeliveryStatus};
use std::collections::HashSet;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::mysql::Mysql;

fn record(id: &str, recipient: &str, status: DeliveryStatus) -> ConsolidatedRecord {
    ConsolidatedRecord {
        message_id: id.to_string(),
        date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        time: NaiveTime::from_hms_opt(15, 4, 5).unwrap(),
        sender: "alice@example.com".to_string(),
        recipient: recipient.to_string(),
        status,
        origin_host: "mx1.example.com".to_string(),
        origin_ip: "10.0.0.1".to_string(),
        subject: "Report".to_string(),
    }
}

async fn start_store() -> Result<(ContainerAsync<Mysql>, MySqlRecordStore)> {
    let container = Mysql::default().start().await?;
    let host = container.get_host().await?;
    let port = container.get_host_port_ipv4(3306).await?;

    let config = DatabaseConfig {
        url: Some(format!("mysql://root@{}:{}/test", host, port)),
        host: String::new(),
        port: 3306,
        user: String::new(),
        password: String::new(),
        name: String::new(),
        max_connections: 2,
        connect_timeout_secs: 30,
    };

    let store = MySqlRecordStore::connect(&config).await?;
    store.migrate().await?;
    Ok((container, store))
}

#[tokio::test]
#[ignore]
async fn test_insert_is_idempotent() -> Result<()> {
    init_tracing();
    let (_container, store) = start_store().await?;

    let batch = vec![
        record("ABCDEF-01-02", "bob@example.org", DeliveryStatus::Sent),
        record("ABCDEF-01-02", "carol@example.org", DeliveryStatus::Sent),
        record("GHIJKL-03-04", "bob@example.org", DeliveryStatus::Rejected),
    ];

    assert_eq!(store.insert_ignoring_duplicates(&batch).await?, 3);
    assert_eq!(store.insert_ignoring_duplicates(&batch).await?, 0);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM email_logs")
        .fetch_one(store.pool())
        .await?;
    assert_eq!(count, 3);
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_existing_identifiers() -> Result<()> {
    init_tracing();
    let (_container, store) = start_store().await?;

    store
        .insert_ignoring_duplicates(&[record("ABCDEF-01-02", "bob@example.org", DeliveryStatus::Sent)])
        .await?;

    let found = store
        .existing_identifiers(&["ABCDEF-01-02".to_string(), "ZZZZZZ-00-00".to_string()])
        .await?;
    assert_eq!(found, HashSet::from(["ABCDEF-01-02".to_string()]));
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_large_batch_spans_chunks() -> Result<()> {
    init_tracing();
    let (_container, store) = start_store().await?;

    let batch: Vec<ConsolidatedRecord> = (0..2500)
        .map(|i| record(&format!("MSG{i:05}-00-AB"), "bob@example.org", DeliveryStatus::Sent))
        .collect();

    assert_eq!(store.insert_ignoring_duplicates(&batch).await?, 2500);

    let ids: Vec<String> = batch.iter().map(|r| r.message_id.clone()).collect();
    assert_eq!(store.existing_identifiers(&ids).await?.len(), 2500);
    Ok(())
}
