// Companion - core/tail_buffer.rs
//
// Bounded, newest-first, de-duplicated window over the most recent query-log
// entries of one tail view.
//
// Every poll tick re-fetches the top of each node's log, so consecutive pages
// overlap heavily. Merging is therefore key-based rather than cursor-based:
// an entry is new iff its EntryKey is not already held. After a merge the
// window holds:
//   - at most `capacity` rows,
//   - no two rows with the same EntryKey,
//   - rows ordered by resolved timestamp, newest first, with rows whose
//     timestamp does not resolve placed after every resolved row.
// Ties (equal instants, or two unresolved rows) keep arrival order, newest
// arrivals first.
//
// Core layer: pure logic, no I/O. Callers serialise access (one writer).

use crate::core::model::{EntryKey, LogEntry, TailRow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

// =============================================================================
// Capacity policy
// =============================================================================

/// What happens to retained rows when the capacity changes at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapacityPolicy {
    /// Discard every row; the window starts empty at the new size.
    #[default]
    Reset,

    /// Keep rows and trim to the new bound immediately (oldest rows go).
    Retain,
}

impl CapacityPolicy {
    pub fn label(&self) -> &'static str {
        match self {
            CapacityPolicy::Reset => "reset",
            CapacityPolicy::Retain => "retain",
        }
    }
}

// =============================================================================
// Merge result
// =============================================================================

/// Outcome of a single `TailBuffer::merge` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeResult {
    /// Watermark before the merge.
    pub previous_watermark: Option<DateTime<Utc>>,

    /// Watermark after the merge.
    pub watermark: Option<DateTime<Utc>>,

    /// Number of page entries whose key was not already held.
    pub new_count: usize,

    /// Keys of new entries that are still in the window after truncation,
    /// in window order. Equals `new_count` in length unless the merge evicted
    /// some of the new entries themselves.
    pub new_keys: Vec<EntryKey>,

    /// Rows dropped from the tail of the window to honour the capacity.
    pub evicted: usize,

    /// Window length after the merge.
    pub retained: usize,
}

impl MergeResult {
    /// True when the merge left the window untouched.
    pub fn is_noop(&self) -> bool {
        self.new_count == 0
    }
}

// =============================================================================
// TailBuffer
// =============================================================================

/// Bounded live-tail window. See the module docs for the invariants.
#[derive(Debug, Clone)]
pub struct TailBuffer {
    capacity: usize,
    rows: Vec<TailRow>,
    watermark: Option<DateTime<Utc>>,
}

impl TailBuffer {
    /// Create an empty window. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            rows: Vec::new(),
            watermark: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Retained rows, newest first.
    pub fn rows(&self) -> &[TailRow] {
        &self.rows
    }

    /// Retained entries, newest first.
    pub fn entries(&self) -> impl ExactSizeIterator<Item = &LogEntry> + '_ {
        self.rows.iter().map(|r| &r.entry)
    }

    /// Resolved timestamp of the newest retained row that has one.
    /// Display only; merging never consults it.
    pub fn newest_known_timestamp(&self) -> Option<DateTime<Utc>> {
        self.watermark
    }

    /// Merge a freshly fetched page into the window.
    ///
    /// Entries already held (by key) are ignored, so merging the same page
    /// twice is a no-op the second time. The page may be in any order and may
    /// be larger than the capacity.
    pub fn merge(&mut self, page: Vec<LogEntry>) -> MergeResult {
        let previous_watermark = self.watermark;

        let mut known: HashSet<EntryKey> = self.rows.iter().map(TailRow::key).collect();
        let fresh: Vec<TailRow> = page
            .into_iter()
            .filter(|entry| known.insert(entry.key()))
            .map(TailRow::from_entry)
            .collect();

        let new_count = fresh.len();
        if new_count == 0 {
            return MergeResult {
                previous_watermark,
                watermark: self.watermark,
                retained: self.rows.len(),
                ..Default::default()
            };
        }

        let fresh_keys: HashSet<EntryKey> = fresh.iter().map(TailRow::key).collect();

        // New arrivals go in front so they win ties against held rows.
        let mut combined = fresh;
        combined.append(&mut self.rows);
        combined.sort_by(newest_first);

        let evicted = combined.len().saturating_sub(self.capacity);
        combined.truncate(self.capacity);
        self.rows = combined;
        self.watermark = first_resolved(&self.rows);

        let new_keys: Vec<EntryKey> = self
            .rows
            .iter()
            .map(TailRow::key)
            .filter(|k| fresh_keys.contains(k))
            .collect();

        tracing::debug!(
            new = new_count,
            evicted,
            retained = self.rows.len(),
            capacity = self.capacity,
            "Tail buffer merged page"
        );

        MergeResult {
            previous_watermark,
            watermark: self.watermark,
            new_count,
            new_keys,
            evicted,
            retained: self.rows.len(),
        }
    }

    /// Change the capacity.
    ///
    /// `Reset` empties the window; `Retain` trims it to the new bound now.
    /// Returns the number of rows dropped. A zero capacity is raised to one.
    pub fn set_capacity(&mut self, capacity: usize, policy: CapacityPolicy) -> usize {
        let capacity = capacity.max(1);
        let before = self.rows.len();
        self.capacity = capacity;
        match policy {
            CapacityPolicy::Reset => self.rows.clear(),
            CapacityPolicy::Retain => self.rows.truncate(capacity),
        }
        self.watermark = first_resolved(&self.rows);
        let dropped = before - self.rows.len();

        tracing::debug!(
            capacity,
            policy = policy.label(),
            dropped,
            "Tail buffer capacity changed"
        );
        dropped
    }
}

/// Descending by resolved timestamp; unresolved rows after resolved ones.
/// `sort_by` is stable, so equal rows keep their arrival order.
fn newest_first(a: &TailRow, b: &TailRow) -> Ordering {
    match (a.resolved, b.resolved) {
        (Some(ta), Some(tb)) => tb.cmp(&ta),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn first_resolved(rows: &[TailRow]) -> Option<DateTime<Utc>> {
    rows.iter().find_map(|r| r.resolved)
}
