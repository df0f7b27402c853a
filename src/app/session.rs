// Companion - app/session.rs
//
// Preferences persistence: save and restore the tail capacity, polling
// cadence, selected nodes, and filter between application restarts.
//
// Design principles:
// - Saved atomically (write temp, rename to final) so a crash during save
//   never corrupts the previous good file.
// - Load failures start fresh rather than surfacing errors to the user.
// - The data directory is created on first save; no user action required.
// - The tail window itself is NOT persisted. It is rebuilt from live pages.

use crate::core::filter::FilterState;
use crate::core::tail_buffer::CapacityPolicy;
use crate::util::constants::{self, SESSION_FILE_NAME};
use crate::util::error::{CompanionError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Version stamp for forward-compatibility checks.
///
/// Increment this constant whenever `SessionData` gains or removes fields
/// in a breaking way. Version mismatches silently discard the saved file.
pub const SESSION_VERSION: u32 = 1;

// =============================================================================
// On-disk data structures
// =============================================================================

/// Persistent preferences snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    /// Schema version; must equal `SESSION_VERSION` to be accepted.
    pub version: u32,

    /// Last chosen tail capacity.
    pub capacity: usize,

    /// Behaviour on capacity change.
    #[serde(default)]
    pub capacity_policy: CapacityPolicy,

    /// Entries requested per node per poll.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Poll cadence in ms.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Node ids selected for tailing. Empty = all configured nodes.
    #[serde(default)]
    pub selected_nodes: Vec<String>,

    /// Filter state: the serialisable subset of `FilterState`.
    #[serde(default)]
    pub filter: PersistedFilter,
}

fn default_page_size() -> usize {
    constants::DEFAULT_TAIL_PAGE_SIZE
}

fn default_poll_interval() -> u64 {
    constants::TAIL_POLL_INTERVAL_MS
}

impl Default for SessionData {
    fn default() -> Self {
        Self {
            version: SESSION_VERSION,
            capacity: constants::DEFAULT_TAIL_CAPACITY,
            capacity_policy: CapacityPolicy::default(),
            page_size: default_page_size(),
            poll_interval_ms: default_poll_interval(),
            selected_nodes: Vec::new(),
            filter: PersistedFilter::default(),
        }
    }
}

/// Serialisable snapshot of `FilterState`.
///
/// Absolute time bounds are runtime-only and are not persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedFilter {
    /// Node whitelist. Empty = all nodes shown.
    #[serde(default)]
    pub source_ids: Vec<String>,

    /// Case-insensitive subject substring.
    #[serde(default)]
    pub subject_search: String,

    /// Raw regex pattern string. Re-compiled on restore.
    #[serde(default)]
    pub regex_pattern: String,
}

impl PersistedFilter {
    pub fn from_state(state: &FilterState) -> Self {
        let mut source_ids: Vec<String> = state.source_ids.iter().cloned().collect();
        source_ids.sort();
        Self {
            source_ids,
            subject_search: state.subject_search.clone(),
            regex_pattern: state.regex_pattern().to_string(),
        }
    }

    /// Rebuild a `FilterState`. An invalid stored regex is dropped with a
    /// warning rather than failing the restore.
    pub fn to_state(&self) -> FilterState {
        let mut state = FilterState {
            source_ids: self.source_ids.iter().cloned().collect(),
            subject_search: self.subject_search.clone(),
            ..Default::default()
        };
        if let Err(e) = state.set_regex(&self.regex_pattern) {
            tracing::warn!(error = %e, "Stored filter regex is invalid; ignoring it");
        }
        state
    }
}

// =============================================================================
// I/O helpers
// =============================================================================

/// Resolve the preferences file path from the platform data directory.
pub fn session_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SESSION_FILE_NAME)
}

/// Save `data` to `path` atomically (write temp, then rename).
///
/// Creates all parent directories as needed. The caller decides whether to
/// surface a failure to the user (typically it is logged and ignored).
pub fn save(data: &SessionData, path: &Path) -> Result<()> {
    let io_err = |path: &Path, operation: &'static str| {
        let path = path.to_path_buf();
        move |source: std::io::Error| CompanionError::Io {
            path,
            operation,
            source,
        }
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err(parent, "create session directory"))?;
    }

    let json = serde_json::to_string_pretty(data).map_err(|e| CompanionError::Io {
        path: path.to_path_buf(),
        operation: "serialise session",
        source: e.into(),
    })?;

    // A crash between write and rename loses the new file but never corrupts
    // the previous one (rename is atomic on all supported platforms).
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json.as_bytes()).map_err(io_err(&tmp, "write session temp file"))?;

    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, "finalise session file")(e));
    }

    tracing::debug!(path = %path.display(), "Session saved");
    Ok(())
}

/// Load and validate a `SessionData` from `path`.
///
/// Returns `None` on any error (file not found, JSON parse failure,
/// version mismatch). The caller should treat `None` as "start fresh".
pub fn load(path: &Path) -> Option<SessionData> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| {
            // "Not found" is the normal first run.
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!(path = %path.display(), error = %e, "Cannot read session file");
            }
        })
        .ok()?;

    let data: SessionData = serde_json::from_str(&content)
        .map_err(|e| {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Session file is malformed, starting fresh"
            );
        })
        .ok()?;

    if data.version != SESSION_VERSION {
        tracing::warn!(
            found = data.version,
            expected = SESSION_VERSION,
            "Session file version mismatch, starting fresh"
        );
        return None;
    }

    tracing::info!(path = %path.display(), "Session file loaded");
    Some(data)
}

// =============================================================================
// Unit tests
// =============================================================================
