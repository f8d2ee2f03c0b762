//! Event log correlator
//!
//! Scans transfer-event logs (`mail.log`) and folds every qualifying line into
//! a per-message [`MessageEventGroup`].
//!
//! # Line grammar
//!
//! A line qualifies when it
//!
//! 1. starts with `YYYY-MM-DD HH:MM:SS`, and
//! 2. contains a message identifier token: three hyphen-joined alphanumeric
//!    segments, the first at least 6 characters, the others at least 2
//!    (`1rABCD-000123-AB`). The first such token on the line is used.
//!
//! Qualifying lines are then matched against [`CLASSIFICATION_RULES`] in
//! order; the first rule that matches decides the [`EventKind`]. Lines that
//! match no rule are ignored.

use regex::Regex;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{info, warn};

use crate::error::IngestResult;
use crate::models::{EventKind, MessageEventGroup};
use crate::reader::{open_lines, LossyLines};

#[allow(clippy::expect_used)]
static MESSAGE_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([0-9A-Za-z]{6,}(?:-[0-9A-Za-z]{2,}){2})\b").expect("message id pattern is valid")
});

/// How a rule recognises its marker in a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// Plain substring, including any surrounding spaces
    Literal(&'static str),
    /// Whole word, bounded by non-word characters or line ends
    Word(&'static str),
}

impl Marker {
    pub fn matches(&self, line: &str) -> bool {
        match self {
            Marker::Literal(needle) => line.contains(needle),
            Marker::Word(word) => contains_word(line, word),
        }
    }
}

/// One entry of the ordered classification table
#[derive(Debug, Clone, Copy)]
pub struct ClassificationRule {
    pub kind: EventKind,
    pub markers: &'static [Marker],
}

impl ClassificationRule {
    pub fn matches(&self, line: &str) -> bool {
        self.markers.iter().any(|marker| marker.matches(line))
    }
}

/// Classification precedence: reject > delivery > completed.
///
/// A line carrying both ` ** ` and ` => ` counts as a reject only.
pub const CLASSIFICATION_RULES: &[ClassificationRule] = &[
    ClassificationRule {
        kind: EventKind::Reject,
        markers: &[Marker::Literal(" ** ")],
    },
    ClassificationRule {
        kind: EventKind::Delivery,
        markers: &[Marker::Literal(" => "), Marker::Literal(" -> ")],
    },
    ClassificationRule {
        kind: EventKind::Completed,
        markers: &[Marker::Word("Completed")],
    },
];

/// Counters for one correlation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrelateStats {
    pub lines: usize,
    pub classified: usize,
    pub missing_files: usize,
}

/// Builds per-message outcome flags from event logs
#[derive(Debug, Clone, Copy, Default)]
pub struct EventCorrelator;

impl EventCorrelator {
    pub fn new() -> Self {
        Self
    }

    /// Scan every event log in `paths`, accumulating flags across files.
    ///
    /// Missing files are logged and skipped.
    pub fn correlate(&self, paths: &[PathBuf]) -> IngestResult<HashMap<String, MessageEventGroup>> {
        let mut groups = HashMap::new();
        let mut stats = CorrelateStats::default();

        for path in paths {
            self.scan_file(path, &mut groups, &mut stats)?;
        }

        info!(
            files = paths.len(),
            missing_files = stats.missing_files,
            lines = stats.lines,
            classified = stats.classified,
            messages = groups.len(),
            "Event logs scanned"
        );

        Ok(groups)
    }

    /// Scan event lines from any buffered reader
    pub fn correlate_from<R: BufRead>(
        &self,
        reader: R,
    ) -> IngestResult<HashMap<String, MessageEventGroup>> {
        let mut groups = HashMap::new();
        let mut stats = CorrelateStats::default();
        self.fold_lines(LossyLines::new(reader), &mut groups, &mut stats)?;
        Ok(groups)
    }

    fn scan_file(
        &self,
        path: &Path,
        groups: &mut HashMap<String, MessageEventGroup>,
        stats: &mut CorrelateStats,
    ) -> IngestResult<()> {
        match open_lines(path)? {
            Some(lines) => self.fold_lines(lines, groups, stats),
            None => {
                warn!(path = %path.display(), "Event log not found, treating as empty");
                stats.missing_files += 1;
                Ok(())
            },
        }
    }

    fn fold_lines<R: BufRead>(
        &self,
        lines: LossyLines<R>,
        groups: &mut HashMap<String, MessageEventGroup>,
        stats: &mut CorrelateStats,
    ) -> IngestResult<()> {
        for line in lines {
            let line = line?;
            stats.lines += 1;

            if let Some((message_id, kind)) = self.classify_line(&line) {
                stats.classified += 1;
                groups.entry(message_id).or_default().record(kind);
            }
        }
        Ok(())
    }

    /// Classify one event line, returning its message identifier and kind
    pub fn classify_line(&self, line: &str) -> Option<(String, EventKind)> {
        if !has_timestamp_prefix(line) {
            return None;
        }

        let message_id = MESSAGE_ID.captures(line)?.get(1)?.as_str();

        CLASSIFICATION_RULES
            .iter()
            .find(|rule| rule.matches(line))
            .map(|rule| (message_id.to_string(), rule.kind))
    }
}

/// True when `line` starts with `YYYY-MM-DD HH:MM:SS`
fn has_timestamp_prefix(line: &str) -> bool {
    const SHAPE: &[u8] = b"dddd-dd-dd dd:dd:dd";

    let bytes = line.as_bytes();
    bytes.len() >= SHAPE.len()
        && SHAPE.iter().zip(bytes).all(|(&shape, &byte)| match shape {
            b'd' => byte.is_ascii_digit(),
            literal => byte == literal,
        })
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn contains_word(line: &str, word: &str) -> bool {
    line.match_indices(word).any(|(start, _)| {
        let end = start + word.len();
        let before_ok = line[..start].chars().next_back().is_none_or(|c| !is_word_char(c));
        let after_ok = line[end..].chars().next().is_none_or(|c| !is_word_char(c));
        before_ok && after_ok
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn classify(line: &str) -> Option<(String, EventKind)> {
        EventCorrelator::new().classify_line(line)
    }

    #[test]
    fn test_delivery_lines() {
        let line = "2024-01-02 15:04:07 1rABCD-000123-AB => bob@example.org R=dnslookup T=remote_smtp";
        assert_eq!(
            classify(line),
            Some(("1rABCD-000123-AB".to_string(), EventKind::Delivery))
        );

        let line = "2024-01-02 15:04:07 1rABCD-000123-AB -> carol@example.org R=dnslookup";
        assert_eq!(classify(line).unwrap().1, EventKind::Delivery);
    }

    #[test]
    fn test_reject_line() {
        let line = "2024-01-02 15:04:07 1rABCD-000123-AB ** nobody@example.org: Unrouteable address";
        assert_eq!(classify(line).unwrap().1, EventKind::Reject);
    }

    #[test]
    fn test_completed_line() {
        let line = "2024-01-02 15:04:08 1rABCD-000123-AB Completed";
        assert_eq!(classify(line).unwrap().1, EventKind::Completed);
    }

    #[test]
    fn test_reject_takes_precedence_over_delivery_marker() {
        let line = "2024-01-02 15:04:07 1rABCD-000123-AB ** x@example.org => routed";
        assert_eq!(classify(line).unwrap().1, EventKind::Reject);
    }

    #[test]
    fn test_delivery_takes_precedence_over_completed() {
        let line = "2024-01-02 15:04:07 1rABCD-000123-AB => x@example.org Completed";
        assert_eq!(classify(line).unwrap().1, EventKind::Delivery);
    }

    #[test]
    fn test_completed_must_be_a_word() {
        assert!(classify("2024-01-02 15:04:08 1rABCD-000123-AB NotCompleted").is_none());
        assert!(classify("2024-01-02 15:04:08 1rABCD-000123-AB Completedly").is_none());
        assert!(classify("2024-01-02 15:04:08 1rABCD-000123-AB (Completed)").is_some());
    }

    #[test]
    fn test_requires_timestamp_prefix() {
        assert!(classify("Jan  2 15:04:07 1rABCD-000123-AB => bob@example.org").is_none());
        assert!(classify(" 2024-01-02 15:04:07 1rABCD-000123-AB => bob@example.org").is_none());
        assert!(classify("2024-01-02T15:04:07 1rABCD-000123-AB => bob@example.org").is_none());
    }

    #[test]
    fn test_requires_message_id() {
        assert!(classify("2024-01-02 15:04:07 Start queue run: pid=1234 => x").is_none());
        // first segment too short
        assert!(classify("2024-01-02 15:04:07 1rAB-000123-AB => bob@example.org").is_none());
        // trailing segment too short
        assert!(classify("2024-01-02 15:04:07 1rABCD-000123-A => bob@example.org").is_none());
    }

    #[test]
    fn test_unclassified_line_is_ignored() {
        let line = "2024-01-02 15:04:05 1rABCD-000123-AB <= alice@example.com H=mx1.example.com";
        assert!(classify(line).is_none());
    }

    #[test]
    fn test_flags_accumulate_per_message() {
        let log = "\
2024-01-02 15:04:05 1rABCD-000123-AB <= alice@example.com H=mx1.example.com
2024-01-02 15:04:07 1rABCD-000123-AB => bob@example.org R=dnslookup
2024-01-02 15:04:07 1rABCD-000123-AB ** eve@example.org: Unrouteable address
2024-01-02 15:04:08 1rABCD-000123-AB Completed
2024-01-02 15:05:00 1rEFGH-000456-CD => dave@example.org R=dnslookup
";
        let groups = EventCorrelator::new().correlate_from(Cursor::new(log)).unwrap();
        assert_eq!(groups.len(), 2);

        let first = groups["1rABCD-000123-AB"];
        assert!(first.has_delivery && first.has_reject && first.completed);

        let second = groups["1rEFGH-000456-CD"];
        assert!(second.has_delivery);
        assert!(!second.completed);
    }

    #[test]
    fn test_correlate_across_files_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("mail.log");
        let second = dir.path().join("mail.log.1");
        std::fs::write(&first, "2024-01-02 15:04:07 1rABCD-000123-AB => bob@example.org\n").unwrap();
        std::fs::write(&second, "2024-01-02 15:04:08 1rABCD-000123-AB Completed\n").unwrap();

        let paths = vec![first, dir.path().join("absent.log"), second];
        let groups = EventCorrelator::new().correlate(&paths).unwrap();

        let group = groups["1rABCD-000123-AB"];
        assert!(group.has_delivery && group.completed);
    }

    #[test]
    fn test_rule_table_order() {
        let kinds: Vec<EventKind> = CLASSIFICATION_RULES.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::Reject, EventKind::Delivery, EventKind::Completed]
        );
    }
}
