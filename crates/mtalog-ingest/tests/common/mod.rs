//! Shared fixtures for the integration tests

#![allow(dead_code)]

use mtalog_ingest::trigger::LogSources;
use std::path::Path;

pub const SCENARIO_ID: &str = "ABCDEF-01-02";

/// Install a test subscriber once; later calls are no-ops
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,mtalog_ingest=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// A complete metadata line for `message_id`
pub fn metadata_line(message_id: &str, recipient: &str) -> String {
    format!(
        "Date: Tue, 02 Jan 2024 15:04:05 -0300 | Message-ID: {message_id} | From: Alice <alice@example.com> | \
         To: {recipient} | Origin-Host: mx1.example.com | Origin-IP: 10.0.0.1 | Subject: Report | Q1"
    )
}

pub fn delivery_line(message_id: &str) -> String {
    format!("2024-01-02 15:04:07 {message_id} => bob@example.org R=dnslookup T=remote_smtp")
}

pub fn reject_line(message_id: &str) -> String {
    format!("2024-01-02 15:04:07 {message_id} ** bob@example.org: Unrouteable address")
}

pub fn completed_line(message_id: &str) -> String {
    format!("2024-01-02 15:04:08 {message_id} Completed")
}

/// Write both logs under `dir` and return their paths
pub fn write_logs(dir: &Path, metadata: &[String], events: &[String]) -> LogSources {
    let metadata_path = dir.join("full_subjects.log");
    let event_path = dir.join("mail.log");
    std::fs::write(&metadata_path, join_lines(metadata)).unwrap();
    std::fs::write(&event_path, join_lines(events)).unwrap();
    LogSources::new(metadata_path, vec![event_path])
}

fn join_lines(lines: &[String]) -> String {
    lines.iter().map(|line| format!("{line}\n")).collect()
}
