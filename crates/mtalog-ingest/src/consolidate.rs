//! Consolidation and deduplication
//!
//! Joins metadata with event groups, applies the completion policy and drops
//! identifiers already held by storage. Pure: the same inputs always produce
//! the same [`ConsolidationOutcome`].

use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::models::{
    ConsolidatedRecord, ConsolidationOutcome, DeliveryStatus, MessageEventGroup, MessageMetadata,
};

/// Why an identifier could not be resolved yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingReason {
    /// No `Completed` line seen (or no event lines at all)
    NotCompleted,
    /// Completed, but neither delivery nor reject evidence
    NoResult,
}

/// Decision for a single identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    AlreadyStored,
    Pending(PendingReason),
    Ready(DeliveryStatus),
}

/// Apply the completion policy to one identifier
pub fn resolve(already_stored: bool, events: Option<&MessageEventGroup>) -> Resolution {
    if already_stored {
        return Resolution::AlreadyStored;
    }

    match events {
        Some(group) if group.completed => {
            if !group.has_result() {
                Resolution::Pending(PendingReason::NoResult)
            } else if group.has_reject {
                Resolution::Ready(DeliveryStatus::Rejected)
            } else {
                Resolution::Ready(DeliveryStatus::Sent)
            }
        },
        _ => Resolution::Pending(PendingReason::NotCompleted),
    }
}

/// Merge both scans into records ready for storage.
///
/// `known` holds identifiers storage already has; they are neither emitted
/// nor reported as pending.
pub fn consolidate(
    metadata: &HashMap<String, MessageMetadata>,
    events: &HashMap<String, MessageEventGroup>,
    known: &HashSet<String>,
) -> ConsolidationOutcome {
    let mut outcome = ConsolidationOutcome::default();
    let mut skipped = 0usize;

    for (message_id, details) in metadata {
        match resolve(known.contains(message_id), events.get(message_id)) {
            Resolution::AlreadyStored => {
                skipped += 1;
                debug!(message_id = %message_id, "Already stored, skipping");
            },
            Resolution::Pending(reason) => {
                debug!(message_id = %message_id, reason = ?reason, "Message pending");
                outcome.pending.insert(message_id.clone());
            },
            Resolution::Ready(status) => {
                outcome
                    .records
                    .push(ConsolidatedRecord::from_metadata(details, status));
                outcome.imported.insert(message_id.clone());
            },
        }
    }

    outcome
        .records
        .sort_by(|a, b| a.message_id.cmp(&b.message_id));

    info!(
        total = metadata.len(),
        already_stored = skipped,
        imported = outcome.imported.len(),
        pending = outcome.pending.len(),
        records = outcome.records.len(),
        "Consolidation finished"
    );

    outcome
}
