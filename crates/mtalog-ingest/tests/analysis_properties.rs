//! Property tests for consolidation over generated logs

mod common;

use common::{completed_line, delivery_line, metadata_line, reject_line};
use mtalog_ingest::consolidate::consolidate;
use mtalog_ingest::events::EventCorrelator;
use mtalog_ingest::metadata::MetadataExtractor;
use mtalog_ingest::DeliveryStatus;
use proptest::prelude::*;
use std::collections::HashSet;
use std::io::Cursor;

#[derive(Debug, Clone)]
struct Message {
    complete: bool,
    delivery: bool,
    reject: bool,
    completed: bool,
    stored: bool,
}

fn message() -> impl Strategy<Value = Message> {
    (any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>()).prop_map(
        |(complete, delivery, reject, completed, stored)| Message {
            complete,
            delivery,
            reject,
            completed,
            stored,
        },
    )
}

fn message_id(index: usize) -> String {
    format!("MSG{index:04}-00-AB")
}

fn render(messages: &[Message]) -> (String, String, HashSet<String>) {
    let mut metadata = String::new();
    let mut events = String::new();
    let mut stored = HashSet::new();

    for (index, m) in messages.iter().enumerate() {
        let id = message_id(index);
        let recipient = if m.complete { "bob@example.org" } else { "" };
        metadata.push_str(&metadata_line(&id, recipient));
        metadata.push('\n');

        if m.delivery {
            events.push_str(&delivery_line(&id));
            events.push('\n');
        }
        if m.reject {
            events.push_str(&reject_line(&id));
            events.push('\n');
        }
        if m.completed {
            events.push_str(&completed_line(&id));
            events.push('\n');
        }
        if m.stored {
            stored.insert(id);
        }
    }

    (metadata, events, stored)
}

proptest! {
    #[test]
    fn analysis_is_idempotent_and_follows_policy(messages in prop::collection::vec(message(), 0..40)) {
        let (metadata_log, event_log, stored) = render(&messages);

        let analyze = || {
            let metadata = MetadataExtractor::new()
                .extract_from(Cursor::new(metadata_log.as_bytes()))
                .unwrap();
            let events = EventCorrelator::new()
                .correlate_from(Cursor::new(event_log.as_bytes()))
                .unwrap();
            consolidate(&metadata, &events, &stored)
        };

        let first = analyze();
        let second = analyze();
        prop_assert_eq!(&first, &second);

        for (index, m) in messages.iter().enumerate() {
            let id = message_id(index);
            let ready = m.complete && !m.stored && m.completed && (m.delivery || m.reject);
            let pending = m.complete && !m.stored && !ready;

            let record = first.records.iter().find(|r| r.message_id == id);
            prop_assert_eq!(record.is_some(), ready);
            prop_assert_eq!(first.imported.contains(&id), ready);
            prop_assert_eq!(first.pending.contains(&id), pending);

            if let Some(record) = record {
                let expected = if m.reject { DeliveryStatus::Rejected } else { DeliveryStatus::Sent };
                prop_assert_eq!(record.status, expected);
            }
        }

        prop_assert!(first.pending.is_disjoint(&first.imported));
    }
}
