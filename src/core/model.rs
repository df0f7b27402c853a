// Companion - core/model.rs
//
// Core data model types. Pure data definitions with no I/O, no UI,
// no platform dependencies.
//
// These types are the shared vocabulary across all layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// =============================================================================
// Log Entry (one observed event from a node)
// =============================================================================

/// A single query-log event reported by a DNS node.
///
/// Only the identity fields are interpreted. Everything else the node sends
/// (client address, response code, protocol, ...) is carried in `payload`
/// and rendered verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Identifier of the originating node.
    #[serde(default)]
    pub source_id: String,

    /// Counter assigned by the node. Increases within one node, may repeat
    /// across nodes.
    pub sequence: u64,

    /// Raw timestamp text as delivered by the node. `None` or unparseable
    /// values are tolerated and sort after every valid timestamp. Numeric
    /// timestamps are kept as their decimal text.
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<String>,

    /// Queried name or similar subject. Used for filtering, part of identity.
    #[serde(default)]
    pub subject: Option<String>,

    /// Opaque additional fields.
    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl LogEntry {
    /// Build an entry with an empty payload.
    pub fn new(
        source_id: impl Into<String>,
        sequence: u64,
        timestamp: Option<&str>,
        subject: Option<&str>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            sequence,
            timestamp: timestamp.map(str::to_owned),
            subject: subject.map(str::to_owned),
            payload: serde_json::Map::new(),
        }
    }

    /// The de-duplication identity of this entry.
    pub fn key(&self) -> EntryKey {
        EntryKey {
            source_id: self.source_id.clone(),
            sequence: self.sequence,
            timestamp: self.timestamp.clone(),
            subject: self.subject.clone(),
        }
    }

    /// Parse the raw timestamp into an instant, if possible.
    pub fn resolved_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .as_deref()
            .and_then(crate::core::timestamp::resolve)
    }
}

/// Accept a string, a number, or null for `timestamp`. Any other JSON value
/// becomes `None` so the entry is still kept.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(text)) => Some(text),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

// =============================================================================
// Entry Key (de-duplication identity)
// =============================================================================

/// Identity tuple used to detect re-fetched entries.
///
/// Polling re-fetches overlapping windows, so byte-identical re-deliveries are
/// normal. The raw timestamp text is compared (not the resolved instant) so two
/// spellings of the same instant remain distinct observations.
///
/// A node that restarts and reuses sequence numbers with an identical
/// timestamp and subject would collide here; no upstream guarantee rules
/// that out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryKey {
    pub source_id: String,
    pub sequence: u64,
    pub timestamp: Option<String>,
    pub subject: Option<String>,
}

impl std::fmt::Display for EntryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}#{}@{}",
            self.source_id,
            self.sequence,
            self.timestamp.as_deref().unwrap_or("-")
        )
    }
}

// =============================================================================
// Tail Row (entry plus its cached resolved timestamp)
// =============================================================================

/// An entry held by the tail window together with its resolved timestamp.
///
/// The timestamp is resolved once on arrival so re-sorting the window on every
/// merge does not re-parse retained entries.
#[derive(Debug, Clone, PartialEq)]
pub struct TailRow {
    pub entry: LogEntry,
    /// `None` when the raw timestamp is absent or unparseable.
    pub resolved: Option<DateTime<Utc>>,
}

impl TailRow {
    pub fn from_entry(entry: LogEntry) -> Self {
        let resolved = entry.resolved_timestamp();
        Self { entry, resolved }
    }

    pub fn key(&self) -> EntryKey {
        self.entry.key()
    }
}

// =============================================================================
// Node selection
// =============================================================================

/// Identifies one DNS node whose query log is tailed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeSelector {
    /// Node identifier; also the default `source_id` for its entries.
    pub id: String,
}

impl NodeSelector {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

// =============================================================================
// Tail Progress (poller -> view messages)
// =============================================================================

/// Messages sent from the background poller to the view session.
///
/// Every message carries the poller generation that produced it. A view that
/// has been reset or restarted since ignores messages from older generations.
#[derive(Debug, Clone)]
pub enum TailProgress {
    /// The poll loop is running.
    Started { generation: u64, node_count: usize },

    /// A fresh page was fetched from a node.
    Page {
        generation: u64,
        node: String,
        entries: Vec<LogEntry>,
    },

    /// A fetch failed or timed out. The next tick retries.
    FetchFailed {
        generation: u64,
        node: String,
        message: String,
    },

    /// The poll loop has exited.
    Stopped { generation: u64 },
}

impl TailProgress {
    /// Generation of the poller run that produced this message.
    pub fn generation(&self) -> u64 {
        match self {
            Self::Started { generation, .. }
            | Self::Page { generation, .. }
            | Self::FetchFailed { generation, .. }
            | Self::Stopped { generation } => *generation,
        }
    }
}
