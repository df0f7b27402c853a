// Companion - app/source.rs
//
// Log sources: where the poller gets each node's most recent page from.
//
// `LogSource` is the seam between the tail and whatever transport reaches a
// node. The shipped implementation reads each node's query log exported as
// JSON lines on disk (e.g. by a collector or a log-shipping agent).
// Implementations must be callable from the poller's worker threads.

use crate::core::model::{LogEntry, NodeSelector};
use crate::core::parser;
use crate::platform::config::NodeConfig;
use crate::platform::fs::read_tail_lossy;
use crate::util::constants::MAX_SOURCE_READ_BYTES;
use crate::util::error::SourceError;
use std::collections::HashMap;
use std::path::PathBuf;

/// Something that can return a node's most recent log entries.
pub trait LogSource: Send + Sync {
    /// Fetch up to `page_size` of the node's most recent entries, newest first.
    ///
    /// Pages may overlap with earlier ones; the tail de-duplicates.
    fn fetch_recent_page(
        &self,
        node: &NodeSelector,
        page_size: usize,
    ) -> Result<Vec<LogEntry>, SourceError>;
}

/// Reads each node's JSON-lines query log from a file.
///
/// Only the last `max_read_bytes` of each file are read per fetch.
#[derive(Debug, Clone)]
pub struct JsonLinesSource {
    paths: HashMap<String, PathBuf>,
    max_read_bytes: usize,
}

impl JsonLinesSource {
    pub fn new(nodes: &[NodeConfig]) -> Self {
        Self {
            paths: nodes
                .iter()
                .map(|n| (n.id.clone(), n.path.clone()))
                .collect(),
            max_read_bytes: MAX_SOURCE_READ_BYTES,
        }
    }

    /// Override the per-fetch read bound.
    pub fn with_max_read_bytes(mut self, max_read_bytes: usize) -> Self {
        self.max_read_bytes = max_read_bytes.max(1);
        self
    }

    /// Selectors for every configured node, sorted by id.
    pub fn selectors(&self) -> Vec<NodeSelector> {
        let mut ids: Vec<&String> = self.paths.keys().collect();
        ids.sort();
        ids.into_iter().map(|id| NodeSelector::new(id.as_str())).collect()
    }
}

impl LogSource for JsonLinesSource {
    fn fetch_recent_page(
        &self,
        node: &NodeSelector,
        page_size: usize,
    ) -> Result<Vec<LogEntry>, SourceError> {
        let path = self
            .paths
            .get(&node.id)
            .ok_or_else(|| SourceError::UnknownNode {
                source_id: node.id.clone(),
            })?;

        let content = read_tail_lossy(path, self.max_read_bytes).map_err(|e| SourceError::Io {
            path: path.clone(),
            source: e,
        })?;

        let page = parser::parse_page(&content, &node.id, page_size);
        if page.malformed > 0 {
            tracing::warn!(
                node = %node.id,
                malformed = page.malformed,
                "Skipped malformed query-log lines"
            );
        }
        tracing::debug!(
            node = %node.id,
            entries = page.entries.len(),
            "Fetched recent page"
        );
        Ok(page.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn node_file(dir: &TempDir, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, lines.join("\n") + "\n").unwrap();
        path
    }

    #[test]
    fn test_fetch_reads_newest_first() {
        let dir = TempDir::new().unwrap();
        let path = node_file(
            &dir,
            "ns1.jsonl",
            &[
                r#"{"sequence":1,"timestamp":"2024-05-01T10:00:01Z","subject":"a.com"}"#,
                r#"{"sequence":2,"timestamp":"2024-05-01T10:00:02Z","subject":"b.com"}"#,
            ],
        );
        let source = JsonLinesSource::new(&[NodeConfig {
            id: "ns1".to_string(),
            path,
        }]);
        let page = source.fetch_recent_page(&NodeSelector::new("ns1"), 10).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].sequence, 2);
        assert_eq!(page[0].source_id, "ns1");
    }

    #[test]
    fn test_unknown_node() {
        let source = JsonLinesSource::new(&[]);
        let result = source.fetch_recent_page(&NodeSelector::new("ghost"), 10);
        assert!(matches!(result, Err(SourceError::UnknownNode { .. })));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let source = JsonLinesSource::new(&[NodeConfig {
            id: "ns1".to_string(),
            path: dir.path().join("absent.jsonl"),
        }]);
        let result = source.fetch_recent_page(&NodeSelector::new("ns1"), 10);
        assert!(matches!(result, Err(SourceError::Io { .. })));
    }

    #[test]
    fn test_read_bound_limits_page_to_file_tail() {
        let dir = TempDir::new().unwrap();
        let lines: Vec<String> = (1..=50)
            .map(|i| format!(r#"{{"sequence":{i},"subject":"host{i}.example"}}"#))
            .collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let path = node_file(&dir, "ns1.jsonl", &refs);

        let source = JsonLinesSource::new(&[NodeConfig {
            id: "ns1".to_string(),
            path,
        }])
        .with_max_read_bytes(200);
        let page = source.fetch_recent_page(&NodeSelector::new("ns1"), 100).unwrap();
        assert!(!page.is_empty());
        assert!(page.len() < 50);
        assert_eq!(page[0].sequence, 50);
    }

    #[test]
    fn test_selectors_sorted() {
        let source = JsonLinesSource::new(&[
            NodeConfig {
                id: "ns2".to_string(),
                path: PathBuf::from("b"),
            },
            NodeConfig {
                id: "ns1".to_string(),
                path: PathBuf::from("a"),
            },
        ]);
        let ids: Vec<String> = source.selectors().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["ns1", "ns2"]);
    }
}
