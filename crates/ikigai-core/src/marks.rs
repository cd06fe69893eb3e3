// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Mark {
    /// The originating `mark` event's store-assigned id (§4.10 "mark row");
    /// `0` for marks created outside replay that have not yet been persisted.
    pub id: u64,
    pub message_index: usize,
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum MarkError {
    #[error("no marks exist")]
    NoMarks,
    #[error("no mark found with label {0:?}")]
    LabelNotFound(String),
}

/// The ordered list of checkpoints for one agent (§4.10). Marks are kept in
/// creation order; "most recent" lookups walk the list from the end.
#[derive(Default)]
pub struct Marks {
    marks: Vec<Mark>,
}

impl Marks {
    pub fn new() -> Self {
        Self { marks: Vec::new() }
    }

    /// Appends a mark at `message_index`. Returns the created mark.
    pub fn create(&mut self, message_index: usize, label: Option<String>, created_at: DateTime<Utc>) -> Mark {
        self.create_with_id(0, message_index, label, created_at)
    }

    /// As [`Self::create`], but records the originating `mark` event's
    /// store-assigned id so a later `rewind` event can look it up by
    /// `target_message_id` (§4.10).
    pub fn create_with_id(&mut self, id: u64, message_index: usize, label: Option<String>, created_at: DateTime<Utc>) -> Mark {
        let mark = Mark { id, message_index, label, created_at };
        self.marks.push(mark.clone());
        mark
    }

    /// Look up a mark by its originating event id (`target_message_id` in a
    /// `rewind` event's `data`).
    pub fn find_by_id(&self, id: u64) -> Option<&Mark> {
        self.marks.iter().find(|m| m.id == id)
    }

    /// `None` label returns the most recent mark; otherwise the most recent
    /// mark with a matching label.
    pub fn find(&self, label: Option<&str>) -> Result<&Mark, MarkError> {
        match label {
            None => self.marks.last().ok_or(MarkError::NoMarks),
            Some(l) => self
                .marks
                .iter()
                .rev()
                .find(|m| m.label.as_deref() == Some(l))
                .ok_or_else(|| MarkError::LabelNotFound(l.to_string())),
        }
    }

    /// Drop every mark after `target` (by identity: message_index + created_at),
    /// keeping `target` itself so it can be rewound-to again.
    pub fn truncate_after(&mut self, target_index: usize, target_created_at: DateTime<Utc>) {
        if let Some(pos) = self
            .marks
            .iter()
            .position(|m| m.message_index == target_index && m.created_at == target_created_at)
        {
            self.marks.truncate(pos + 1);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mark> {
        self.marks.iter()
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    // ── create / find ─────────────────────────────────────────────────────────

    #[test]
    fn find_none_returns_most_recent() {
        let mut m = Marks::new();
        m.create(1, None, ts("2026-01-01T00:00:00Z"));
        m.create(5, Some("two".into()), ts("2026-01-01T00:01:00Z"));
        assert_eq!(m.find(None).unwrap().message_index, 5);
    }

    #[test]
    fn find_by_label_searches_most_recent_first() {
        let mut m = Marks::new();
        m.create(1, Some("a".into()), ts("2026-01-01T00:00:00Z"));
        m.create(2, Some("a".into()), ts("2026-01-01T00:01:00Z"));
        assert_eq!(m.find(Some("a")).unwrap().message_index, 2);
    }

    #[test]
    fn find_missing_label_is_error() {
        let m = Marks::new();
        assert!(matches!(m.find(Some("nope")), Err(MarkError::LabelNotFound(_))));
    }

    #[test]
    fn find_on_empty_marks_is_error() {
        let m = Marks::new();
        assert!(matches!(m.find(None), Err(MarkError::NoMarks)));
    }

    // ── rewind survivability ──────────────────────────────────────────────────

    #[test]
    fn mark_survives_repeated_rewind() {
        let mut m = Marks::new();
        let created = ts("2026-01-01T00:00:00Z");
        let mark = m.create(3, Some("ckpt".into()), created);
        m.create(8, None, ts("2026-01-01T00:01:00Z"));
        m.truncate_after(mark.message_index, mark.created_at);
        assert_eq!(m.len(), 1);
        // Rewinding to the same mark again must not remove it.
        m.truncate_after(mark.message_index, mark.created_at);
        assert_eq!(m.len(), 1);
        assert_eq!(m.find(Some("ckpt")).unwrap().message_index, 3);
    }

    #[test]
    fn truncate_after_drops_only_later_marks() {
        let mut m = Marks::new();
        let a = m.create(1, None, ts("2026-01-01T00:00:00Z"));
        m.create(2, None, ts("2026-01-01T00:01:00Z"));
        m.create(3, None, ts("2026-01-01T00:02:00Z"));
        m.truncate_after(a.message_index, a.created_at);
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn find_by_id_locates_the_originating_event() {
        let mut m = Marks::new();
        m.create_with_id(42, 3, Some("ckpt".into()), ts("2026-01-01T00:00:00Z"));
        assert_eq!(m.find_by_id(42).unwrap().message_index, 3);
        assert!(m.find_by_id(99).is_none());
    }
}
