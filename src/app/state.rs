// Companion - app/state.rs
//
// Tail view session state: owns the live tail window and everything derived
// from it. The front-end reads from here; only `handle_progress` mutates the
// window, and it is called from one thread.

use crate::core::filter::{self, FilterState};
use crate::core::highlight::RecentlyAdded;
use crate::core::model::{EntryKey, TailProgress, TailRow};
use crate::core::tail_buffer::{CapacityPolicy, MergeResult, TailBuffer};
use crate::platform::config::AppConfig;
use crate::util::constants::{MAX_TAIL_CAPACITY, MAX_WARNINGS, MIN_TAIL_CAPACITY};
use crate::util::error::ConfigError;
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// State of one tail view.
#[derive(Debug)]
pub struct TailView {
    /// Window capacity applied when the buffer is (re)created.
    capacity: usize,

    /// What a runtime capacity change does to retained rows.
    pub capacity_policy: CapacityPolicy,

    /// Present only while tail mode is active.
    buffer: Option<TailBuffer>,

    /// Keys of rows that arrived recently.
    pub recently_added: RecentlyAdded,

    /// Active filter criteria.
    pub filter_state: FilterState,

    /// Indices into the window rows that pass the current filter.
    pub filtered_indices: Vec<usize>,

    /// Generation whose poller messages are accepted. Others are stale.
    active_generation: Option<u64>,

    /// Status bar text.
    pub status_message: String,

    /// Non-fatal fetch warnings, oldest first, bounded by `MAX_WARNINGS`.
    pub warnings: Vec<String>,
}

impl TailView {
    pub fn new(capacity: usize, capacity_policy: CapacityPolicy, highlight: Duration) -> Self {
        Self {
            capacity: capacity.clamp(MIN_TAIL_CAPACITY, MAX_TAIL_CAPACITY),
            capacity_policy,
            buffer: None,
            recently_added: RecentlyAdded::new(highlight),
            filter_state: FilterState::default(),
            filtered_indices: Vec::new(),
            active_generation: None,
            status_message: "Ready. Start the live tail to begin.".to_string(),
            warnings: Vec::new(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.capacity,
            config.capacity_policy,
            Duration::from_secs(config.highlight_secs),
        )
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_tailing(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn buffer(&self) -> Option<&TailBuffer> {
        self.buffer.as_ref()
    }

    /// Window rows, newest first (empty outside tail mode).
    pub fn rows(&self) -> &[TailRow] {
        match &self.buffer {
            Some(buffer) => buffer.rows(),
            None => &[],
        }
    }

    /// Rows passing the current filter, newest first.
    pub fn visible_rows(&self) -> impl Iterator<Item = &TailRow> + '_ {
        let rows = self.rows();
        self.filtered_indices.iter().filter_map(move |&i| rows.get(i))
    }

    /// Enter tail mode with a fresh, empty window accepting `generation`.
    pub fn enter_tail(&mut self, generation: u64) {
        self.buffer = Some(TailBuffer::new(self.capacity));
        self.active_generation = Some(generation);
        self.recently_added.clear();
        self.filtered_indices.clear();
        self.status_message = "Live tail active.".to_string();
        tracing::info!(generation, capacity = self.capacity, "Entered tail mode");
    }

    /// Leave tail mode, discarding the window.
    pub fn exit_tail(&mut self) {
        self.buffer = None;
        self.active_generation = None;
        self.recently_added.clear();
        self.filtered_indices.clear();
        self.status_message = "Live tail stopped.".to_string();
        tracing::info!("Exited tail mode");
    }

    /// Discard the window and start again for `generation`.
    /// Used on node/view switches and when refreshing after an error.
    pub fn reset(&mut self, generation: u64) {
        self.warnings.clear();
        self.enter_tail(generation);
    }

    /// Change the capacity, validating it against the configured bounds.
    ///
    /// Outside tail mode this only affects the next window. Inside tail mode
    /// the `capacity_policy` decides whether rows are dropped or trimmed.
    pub fn set_capacity(&mut self, capacity: usize) -> Result<(), ConfigError> {
        if !(MIN_TAIL_CAPACITY..=MAX_TAIL_CAPACITY).contains(&capacity) {
            return Err(ConfigError::ValueOutOfRange {
                field: "capacity".to_string(),
                value: capacity.to_string(),
                expected: format!("{MIN_TAIL_CAPACITY}-{MAX_TAIL_CAPACITY}"),
            });
        }
        self.capacity = capacity;
        if let Some(buffer) = self.buffer.as_mut() {
            buffer.set_capacity(capacity, self.capacity_policy);
            self.prune_marks();
            self.apply_filters();
        }
        Ok(())
    }

    /// Handle one poller message received at `now`.
    ///
    /// Returns the merge result for pages that were merged, `None` otherwise
    /// (other message kinds, stale generations, or outside tail mode).
    pub fn handle_progress(&mut self, msg: TailProgress, now: Instant) -> Option<MergeResult> {
        if self.active_generation != Some(msg.generation()) {
            tracing::debug!(
                generation = msg.generation(),
                active = ?self.active_generation,
                "Ignoring stale tail message"
            );
            return None;
        }

        match msg {
            TailProgress::Started { node_count, .. } => {
                self.status_message = format!("Live tail active, polling {node_count} node(s).");
                None
            }
            TailProgress::Page { node, entries, .. } => {
                let buffer = self.buffer.as_mut()?;
                let result = buffer.merge(entries);
                if result.is_noop() {
                    return Some(result);
                }

                self.recently_added.mark(&result.new_keys, now);
                if result.evicted > 0 {
                    self.prune_marks();
                }
                self.apply_filters();
                self.status_message = format!(
                    "{} new from {node}; showing {} of {}.",
                    result.new_count,
                    self.filtered_indices.len(),
                    result.retained
                );
                Some(result)
            }
            TailProgress::FetchFailed { node, message, .. } => {
                let msg = format!("Tail warning from {node}: {message}");
                self.status_message = msg.clone();
                self.push_warning(msg);
                None
            }
            TailProgress::Stopped { .. } => {
                self.status_message = "Live tail stopped.".to_string();
                None
            }
        }
    }

    /// Whether the row with `key` should currently be shown as new.
    pub fn is_recent(&self, key: &EntryKey, now: Instant) -> bool {
        self.recently_added.is_marked(key, now)
    }

    /// Clear expired "recently added" marks. Returns how many were cleared.
    pub fn expire_highlights(&mut self, now: Instant) -> usize {
        self.recently_added.expire(now)
    }

    /// Recompute filtered indices from the window and filter state.
    pub fn apply_filters(&mut self) {
        self.filtered_indices = filter::apply_filters(self.rows(), &self.filter_state);
    }

    /// Drop marks whose rows are no longer in the window.
    fn prune_marks(&mut self) {
        let held: HashSet<EntryKey> = self.rows().iter().map(TailRow::key).collect();
        self.recently_added.retain_keys(|k| held.contains(k));
    }

    fn push_warning(&mut self, msg: String) {
        if self.warnings.len() >= MAX_WARNINGS {
            self.warnings.remove(0);
        }
        self.warnings.push(msg);
    }
}
