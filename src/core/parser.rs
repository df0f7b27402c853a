// Companion - core/parser.rs
//
// Decodes a node's query log (JSON lines, one entry per line, oldest first)
// into a page of `LogEntry` values, newest first.
//
// Malformed input is never fatal: lines that are too long or fail to decode
// are counted and skipped so one bad record cannot stall the tail.

use crate::core::model::LogEntry;
use crate::util::constants::MAX_ENTRY_LINE_BYTES;

/// Result of decoding one page.
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    /// Decoded entries, newest first, at most `page_size` of them.
    pub entries: Vec<LogEntry>,

    /// Lines skipped because they could not be decoded.
    pub malformed: usize,
}

/// Decode the most recent `page_size` entries of `content`.
///
/// Lines are scanned from the end so only the requested page is decoded.
/// Entries with an empty `sourceId` are attributed to `node_id`.
/// A `page_size` of zero yields an empty page.
pub fn parse_page(content: &str, node_id: &str, page_size: usize) -> ParsedPage {
    let mut page = ParsedPage::default();
    if page_size == 0 {
        return page;
    }

    for line in content.lines().rev() {
        if page.entries.len() >= page_size {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.len() > MAX_ENTRY_LINE_BYTES {
            tracing::debug!(
                node = node_id,
                bytes = line.len(),
                "Skipping oversized log line"
            );
            page.malformed += 1;
            continue;
        }

        match serde_json::from_str::<LogEntry>(line) {
            Ok(mut entry) => {
                if entry.source_id.is_empty() {
                    entry.source_id = node_id.to_string();
                }
                page.entries.push(entry);
            }
            Err(e) => {
                tracing::debug!(
                    node = node_id,
                    error = %e,
                    line = crate::util::logging::preview(line),
                    "Skipping malformed log line"
                );
                page.malformed += 1;
            }
        }
    }

    page
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = r#"{"sourceId":"ns1","sequence":1,"timestamp":"2024-05-01T10:00:01Z","subject":"a.com"}
{"sourceId":"ns1","sequence":2,"timestamp":"2024-05-01T10:00:02Z","subject":"b.com","rcode":"NxDomain"}

{"sequence":3,"timestamp":"2024-05-01T10:00:03Z","subject":"c.com"}
"#;

    #[test]
    fn test_parse_returns_newest_first() {
        let page = parse_page(LOG, "ns1", 10);
        let seqs: Vec<u64> = page.entries.iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![3, 2, 1]);
        assert_eq!(page.malformed, 0);
    }

    #[test]
    fn test_parse_limits_to_page_size() {
        let page = parse_page(LOG, "ns1", 2);
        let seqs: Vec<u64> = page.entries.iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![3, 2]);
    }

    #[test]
    fn test_missing_source_id_defaults_to_node() {
        let page = parse_page(LOG, "edge-7", 1);
        assert_eq!(page.entries[0].source_id, "edge-7");
    }

    #[test]
    fn test_payload_fields_preserved() {
        let page = parse_page(LOG, "ns1", 2);
        assert_eq!(page.entries[1].payload["rcode"], "NxDomain");
    }

    #[test]
    fn test_malformed_lines_are_skipped_and_counted() {
        let content = "{\"sequence\":1}\nnot json\n{\"subject\":\"no sequence\"}\n";
        let page = parse_page(content, "ns1", 10);
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.malformed, 2);
    }

    #[test]
    fn test_oversized_line_skipped() {
        let big = format!(
            "{{\"sequence\":9,\"subject\":\"{}\"}}",
            "x".repeat(MAX_ENTRY_LINE_BYTES)
        );
        let page = parse_page(&big, "ns1", 10);
        assert!(page.entries.is_empty());
        assert_eq!(page.malformed, 1);
    }

    #[test]
    fn test_numeric_timestamp_keeps_entry() {
        let content = "{\"sequence\":1,\"timestamp\":1705329022000,\"subject\":\"a.com\"}\n";
        let page = parse_page(content, "ns1", 10);
        assert_eq!(page.malformed, 0);
        assert_eq!(page.entries.len(), 1);
        let entry = &page.entries[0];
        assert_eq!(entry.timestamp.as_deref(), Some("1705329022000"));
        assert!(entry.resolved_timestamp().is_some());
    }

    #[test]
    fn test_non_text_timestamp_kept_as_unresolved() {
        let content = "{\"sequence\":1,\"timestamp\":{\"at\":5},\"subject\":\"a.com\"}\n\
                       {\"sequence\":2,\"timestamp\":null}\n";
        let page = parse_page(content, "ns1", 10);
        assert_eq!(page.malformed, 0);
        assert_eq!(page.entries.len(), 2);
        assert!(page.entries.iter().all(|e| e.timestamp.is_none()));
    }

    #[test]
    fn test_zero_page_size() {
        assert!(parse_page(LOG, "ns1", 0).entries.is_empty());
    }
}
