//! Metadata log extractor
//!
//! Parses the subject/metadata log (`full_subjects.log`) into per-message
//! [`MessageMetadata`].
//!
//! # Line grammar
//!
//! ```text
//! line    := field ("|" field){5} "|" subject
//! field   := key ":" value
//! subject := ["Subject" ":"] rest-of-line      (may contain "|")
//! ```
//!
//! Keys are trimmed, lower-cased and have `-` replaced by `_`, so
//! `Message-ID` becomes `message_id` and `Origin-IP` becomes `origin_ip`.
//! Recognised keys: `date`, `message_id`, `from`, `to`, `origin_host`,
//! `origin_ip`. Unknown keys are ignored.
//!
//! Example:
//!
//! ```text
//! Date: Tue, 02 Jan 2024 15:04:05 -0300 | Message-ID: 1rABCD-000123-AB | From: Alice <alice@example.com> | To: bob@example.org | Origin-Host: mx1.example.com | Origin-IP: 10.0.0.1 | Subject: Report | Q1
//! ```

use chrono::{DateTime, FixedOffset};
use regex::Regex;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use crate::error::IngestResult;
use crate::models::MessageMetadata;
use crate::reader::{open_lines, LossyLines};

/// Number of top-level `|` separated fields; the last one is the subject
pub const METADATA_FIELD_COUNT: usize = 7;

/// Format of the `Date` field, e.g. `Mon, 02 Jan 2024 15:04:05 -0300`
pub const METADATA_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

const METADATA_DATE_WITHOUT_WEEKDAY: &str = "%d %b %Y %H:%M:%S %z";

#[allow(clippy::expect_used)]
static ANGLE_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([^>]+)>").expect("angle address pattern is valid"));

/// Result of parsing one metadata line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    Parsed(MessageMetadata),
    Blank,
    /// Fewer than [`METADATA_FIELD_COUNT`] fields
    WrongFieldCount(usize),
    MissingMessageId,
    InvalidDate { message_id: String, value: String },
    /// Sender, recipient, origin host or origin IP is empty
    Incomplete { message_id: String },
}

/// Counters for one extraction pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub lines: usize,
    pub parsed: usize,
    pub malformed: usize,
    pub invalid_date: usize,
    pub incomplete: usize,
}

/// Parser for the metadata log
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataExtractor;

impl MetadataExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Scan the metadata log at `path`.
    ///
    /// A missing file yields an empty map and a warning. When an identifier
    /// appears on several valid lines the last one wins.
    pub fn extract(&self, path: &Path) -> IngestResult<HashMap<String, MessageMetadata>> {
        let Some(lines) = open_lines(path)? else {
            warn!(path = %path.display(), "Metadata log not found, treating as empty");
            return Ok(HashMap::new());
        };

        let (messages, stats) = self.collect(lines)?;

        info!(
            path = %path.display(),
            lines = stats.lines,
            parsed = stats.parsed,
            messages = messages.len(),
            malformed = stats.malformed,
            invalid_date = stats.invalid_date,
            incomplete = stats.incomplete,
            "Metadata log scanned"
        );

        Ok(messages)
    }

    /// Scan metadata lines from any buffered reader
    pub fn extract_from<R: BufRead>(
        &self,
        reader: R,
    ) -> IngestResult<HashMap<String, MessageMetadata>> {
        let (messages, _) = self.collect(LossyLines::new(reader))?;
        Ok(messages)
    }

    fn collect<R: BufRead>(
        &self,
        lines: LossyLines<R>,
    ) -> IngestResult<(HashMap<String, MessageMetadata>, ExtractStats)> {
        let mut messages = HashMap::new();
        let mut stats = ExtractStats::default();

        for line in lines {
            let line = line?;
            stats.lines += 1;

            match self.parse_line(&line) {
                LineOutcome::Parsed(metadata) => {
                    stats.parsed += 1;
                    messages.insert(metadata.message_id.clone(), metadata);
                },
                LineOutcome::Blank => {},
                LineOutcome::WrongFieldCount(count) => {
                    stats.malformed += 1;
                    debug!(line = stats.lines, fields = count, "Skipping metadata line with too few fields");
                },
                LineOutcome::MissingMessageId => {
                    stats.malformed += 1;
                    debug!(line = stats.lines, "Skipping metadata line without message_id");
                },
                LineOutcome::InvalidDate { message_id, value } => {
                    stats.invalid_date += 1;
                    warn!(message_id = %message_id, date = %value, "Invalid date in metadata log, skipping");
                },
                LineOutcome::Incomplete { message_id } => {
                    stats.incomplete += 1;
                    debug!(message_id = %message_id, "Incomplete origin or recipient in metadata log, skipping");
                },
            }
        }

        Ok((messages, stats))
    }

    /// Parse a single metadata line
    pub fn parse_line(&self, line: &str) -> LineOutcome {
        let line = line.trim();
        if line.is_empty() {
            return LineOutcome::Blank;
        }

        let fields: Vec<&str> = line.splitn(METADATA_FIELD_COUNT, '|').map(str::trim).collect();
        if fields.len() < METADATA_FIELD_COUNT {
            return LineOutcome::WrongFieldCount(fields.len());
        }

        let (subject_field, keyed) = match fields.split_last() {
            Some(split) => split,
            None => return LineOutcome::WrongFieldCount(0),
        };

        let details: HashMap<String, &str> = keyed
            .iter()
            .filter_map(|field| field.split_once(':'))
            .map(|(key, value)| (normalize_key(key), value.trim()))
            .collect();

        let Some(message_id) = details.get("message_id").map(|id| id.to_string()) else {
            return LineOutcome::MissingMessageId;
        };

        let date_value = details.get("date").copied().unwrap_or_default();
        let Some(timestamp) = parse_date(date_value) else {
            return LineOutcome::InvalidDate {
                message_id,
                value: date_value.to_string(),
            };
        };

        let field = |key: &str| details.get(key).copied().unwrap_or_default().to_string();

        let metadata = MessageMetadata::new(
            message_id.clone(),
            timestamp.date_naive(),
            timestamp.time(),
            bare_address(&field("from")),
            field("to"),
            field("origin_host"),
            field("origin_ip"),
            subject_text(subject_field),
        );

        match metadata {
            Some(metadata) => LineOutcome::Parsed(metadata),
            None => LineOutcome::Incomplete { message_id },
        }
    }
}

/// Parse a `Date` value.
///
/// Some MTAs write a weekday that disagrees with the date. chrono rejects that,
/// so a second attempt ignores the weekday name.
fn parse_date(value: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(ts) = DateTime::parse_from_str(value, METADATA_DATE_FORMAT) {
        return Some(ts);
    }

    let (weekday, rest) = value.split_once(',')?;
    if weekday.is_empty() || !weekday.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    DateTime::parse_from_str(rest.trim(), METADATA_DATE_WITHOUT_WEEKDAY).ok()
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase().replace('-', "_")
}

/// `Name <user@host>` -> `user@host`; anything else is returned unchanged
fn bare_address(from: &str) -> String {
    ANGLE_ADDRESS
        .captures(from)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| from.to_string())
}

/// Everything after the first `:` of the subject field, or the whole field
fn subject_text(field: &str) -> String {
    match field.split_once(':') {
        Some((_, rest)) => rest.trim().to_string(),
        None => field.trim().to_string(),
    }
}
