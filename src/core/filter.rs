// Companion - core/filter.rs
//
// Composable filter engine for the tail window.
// All active filters are AND-combined.
// Core layer: pure logic, no I/O or UI dependencies.

use crate::core::model::TailRow;
use crate::util::constants::MAX_REGEX_PATTERN_LENGTH;
use crate::util::error::FilterError;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashSet;

/// Complete filter state. All fields are AND-combined when applied.
#[derive(Debug, Clone, Default)]
pub struct FilterState {
    /// Nodes to include (empty = all).
    pub source_ids: HashSet<String>,

    /// Start of time range (inclusive). None = no lower bound.
    pub time_start: Option<DateTime<Utc>>,

    /// End of time range (inclusive). None = no upper bound.
    pub time_end: Option<DateTime<Utc>>,

    /// Case-insensitive substring match on the subject. Empty = no filter.
    pub subject_search: String,

    /// Compiled regex matched against the subject. None = no regex filter.
    pub subject_regex: Option<Regex>,
}

impl FilterState {
    /// Returns true if no filters are active.
    pub fn is_empty(&self) -> bool {
        self.source_ids.is_empty()
            && self.time_start.is_none()
            && self.time_end.is_none()
            && self.subject_search.is_empty()
            && self.subject_regex.is_none()
    }

    /// Set the subject regex, compiling it. An empty pattern clears the filter.
    pub fn set_regex(&mut self, pattern: &str) -> Result<(), FilterError> {
        if pattern.is_empty() {
            self.subject_regex = None;
            return Ok(());
        }
        if pattern.len() > MAX_REGEX_PATTERN_LENGTH {
            return Err(FilterError::RegexTooLong {
                length: pattern.len(),
                max_length: MAX_REGEX_PATTERN_LENGTH,
            });
        }
        let regex = Regex::new(pattern).map_err(|e| FilterError::InvalidRegex {
            pattern: pattern.to_string(),
            source: e,
        })?;
        self.subject_regex = Some(regex);
        Ok(())
    }

    /// Raw pattern of the active regex, or "" when none is set.
    pub fn regex_pattern(&self) -> &str {
        self.subject_regex.as_ref().map_or("", Regex::as_str)
    }

    /// Quick filter: one node only.
    pub fn single_node(node: &str) -> Self {
        Self {
            source_ids: HashSet::from([node.to_string()]),
            ..Default::default()
        }
    }
}

/// Apply filters to the window, returning indices of matching rows.
///
/// Indices point into the window slice so the view can render without
/// copying entries.
pub fn apply_filters(rows: &[TailRow], filter: &FilterState) -> Vec<usize> {
    if filter.is_empty() {
        return (0..rows.len()).collect();
    }

    let search_lower = filter.subject_search.to_lowercase();

    rows.iter()
        .enumerate()
        .filter(|(_, row)| matches_all(row, filter, &search_lower))
        .map(|(idx, _)| idx)
        .collect()
}

/// Check if a single row matches all active filters.
fn matches_all(row: &TailRow, filter: &FilterState, search_lower: &str) -> bool {
    if !filter.source_ids.is_empty() && !filter.source_ids.contains(&row.entry.source_id) {
        return false;
    }

    if let Some(ref start) = filter.time_start {
        match row.resolved {
            Some(ts) if ts < *start => return false,
            None => return false, // no timestamp, cannot be placed in a range
            _ => {}
        }
    }
    if let Some(ref end) = filter.time_end {
        match row.resolved {
            Some(ts) if ts > *end => return false,
            None => return false,
            _ => {}
        }
    }

    let subject = row.entry.subject.as_deref().unwrap_or("");

    if !search_lower.is_empty() && !subject.to_lowercase().contains(search_lower) {
        return false;
    }

    if let Some(ref regex) = filter.subject_regex {
        if !regex.is_match(subject) {
            return false;
        }
    }

    true
}
