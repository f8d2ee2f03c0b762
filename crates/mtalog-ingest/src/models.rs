//! Data models shared by the ingestion stages

use chrono::{NaiveDate, NaiveTime};
use std::collections::BTreeSet;

/// Submission-time details for one message, from the metadata log.
///
/// Only built when sender, recipient, origin host and origin IP are all
/// present; see [`MessageMetadata::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageMetadata {
    pub message_id: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub sender: String,
    pub recipient: String,
    pub origin_host: String,
    pub origin_ip: String,
    pub subject: String,
}

impl MessageMetadata {
    /// Build metadata, returning `None` when any of the routing fields is empty.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        message_id: String,
        date: NaiveDate,
        time: NaiveTime,
        sender: String,
        recipient: String,
        origin_host: String,
        origin_ip: String,
        subject: String,
    ) -> Option<Self> {
        let complete = [&sender, &recipient, &origin_host, &origin_ip]
            .iter()
            .all(|field| !field.is_empty());

        complete.then_some(Self {
            message_id,
            date,
            time,
            sender,
            recipient,
            origin_host,
            origin_ip,
            subject,
        })
    }
}

/// Kind of a classified event-log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Reject,
    Delivery,
    Completed,
}

/// Outcome flags accumulated for one message identifier during a scan.
///
/// Flags only move from `false` to `true`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageEventGroup {
    pub has_delivery: bool,
    pub has_reject: bool,
    pub completed: bool,
}

impl MessageEventGroup {
    pub fn record(&mut self, kind: EventKind) {
        match kind {
            EventKind::Reject => self.has_reject = true,
            EventKind::Delivery => self.has_delivery = true,
            EventKind::Completed => self.completed = true,
        }
    }

    /// True when there is delivery or reject evidence
    pub fn has_result(&self) -> bool {
        self.has_delivery || self.has_reject
    }
}

/// Final delivery status of a consolidated message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryStatus {
    Sent,
    Rejected,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage-ready outcome for one message (maps to the email_logs table)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsolidatedRecord {
    pub message_id: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub sender: String,
    pub recipient: String,
    pub status: DeliveryStatus,
    pub origin_host: String,
    pub origin_ip: String,
    pub subject: String,
}

impl ConsolidatedRecord {
    pub fn from_metadata(metadata: &MessageMetadata, status: DeliveryStatus) -> Self {
        Self {
            message_id: metadata.message_id.clone(),
            date: metadata.date,
            time: metadata.time,
            sender: metadata.sender.clone(),
            recipient: metadata.recipient.clone(),
            status,
            origin_host: metadata.origin_host.clone(),
            origin_ip: metadata.origin_ip.clone(),
            subject: metadata.subject.clone(),
        }
    }

    /// Uniqueness key enforced by storage
    pub fn dedup_key(&self) -> (&str, &str, DeliveryStatus) {
        (&self.message_id, &self.recipient, self.status)
    }
}

/// Result of one consolidation pass.
///
/// `imported` holds exactly the identifiers present in `records`; `pending`
/// never overlaps it. Records are ordered by message identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsolidationOutcome {
    pub records: Vec<ConsolidatedRecord>,
    pub pending: BTreeSet<String>,
    pub imported: BTreeSet<String>,
}

impl ConsolidationOutcome {
    pub fn summary(&self) -> ConsolidationSummary {
        ConsolidationSummary {
            records: self.records.len(),
            pending: self.pending.len(),
            imported: self.imported.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Counts reported after a consolidation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsolidationSummary {
    pub records: usize,
    pub pending: usize,
    pub imported: usize,
}

/// What a single ingestion run achieved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Records were handed to storage; the count is rows actually inserted
    Inserted(u64),
    /// No record was ready to import, storage was not touched
    NothingNew,
}

impl std::fmt::Display for IngestOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestOutcome::Inserted(rows) => write!(f, "{} new rows inserted", rows),
            IngestOutcome::NothingNew => f.write_str("no new records ready to import"),
        }
    }
}
