// Companion - tests/e2e_tail.rs
//
// End-to-end tests for the live tail pipeline.
//
// These tests exercise real JSON-lines files on disk, the real background
// poller thread, and the real view state: a node's query log grows between
// polls and the window must pick up exactly the new entries.

use companion::app::poller::{PollSettings, TailPoller};
use companion::app::source::JsonLinesSource;
use companion::app::state::TailView;
use companion::core::export::export_csv;
use companion::core::model::EntryKey;
use companion::core::tail_buffer::CapacityPolicy;
use companion::platform::config::NodeConfig;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

// =============================================================================
// Helpers
// =============================================================================

fn fast_settings(page_size: usize) -> PollSettings {
    PollSettings {
        page_size,
        poll_interval: Duration::from_millis(20),
        fetch_timeout: Duration::from_secs(2),
        cancel_check: Duration::from_millis(5),
    }
}

fn query_line(seq: u64, second: u32, subject: &str) -> String {
    format!(
        r#"{{"sequence":{seq},"timestamp":"2024-05-01T10:00:{second:02}Z","subject":"{subject}","qtype":"A"}}"#
    )
}

fn write_log(dir: &TempDir, name: &str, lines: &[String]) -> PathBuf {
    let path = dir.path().join(name);
    let mut content = lines.join("\n");
    content.push('\n');
    std::fs::write(&path, content).unwrap();
    path
}

fn append_log(path: &Path, lines: &[String]) {
    let mut file = std::fs::OpenOptions::new().append(true).open(path).unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
}

fn node(id: &str, path: PathBuf) -> NodeConfig {
    NodeConfig {
        id: id.to_string(),
        path,
    }
}

/// Start polling every node of `nodes` into a fresh view.
fn start(nodes: &[NodeConfig], capacity: usize, page_size: usize) -> (TailPoller, TailView) {
    let source = JsonLinesSource::new(nodes);
    let selectors = source.selectors();
    let mut poller = TailPoller::new();
    let generation = poller.start(Arc::new(source), selectors, fast_settings(page_size));
    let mut view = TailView::new(capacity, CapacityPolicy::Reset, Duration::from_secs(30));
    view.enter_tail(generation);
    (poller, view)
}

/// Feed poller messages into the view until `done` holds or five seconds pass.
fn pump_until(poller: &TailPoller, view: &mut TailView, done: impl Fn(&TailView) -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        for msg in poller.poll_progress(100) {
            view.handle_progress(msg, Instant::now());
        }
        if done(view) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

fn sequences(view: &TailView) -> Vec<u64> {
    view.rows().iter().map(|r| r.entry.sequence).collect()
}

fn assert_newest_first(view: &TailView) {
    let rows = view.rows();
    for pair in rows.windows(2) {
        assert!(
            pair[0].resolved >= pair[1].resolved,
            "window out of order: {:?} before {:?}",
            pair[0].entry.timestamp,
            pair[1].entry.timestamp
        );
    }
}

fn assert_unique_keys(view: &TailView) {
    let keys: HashSet<EntryKey> = view.rows().iter().map(|r| r.key()).collect();
    assert_eq!(keys.len(), view.rows().len(), "duplicate keys in window");
}

// =============================================================================
// Tail E2E
// =============================================================================

/// Two nodes are interleaved into one newest-first window.
#[test]
fn e2e_two_nodes_merge_newest_first() {
    let dir = TempDir::new().unwrap();
    let ns1 = write_log(
        &dir,
        "ns1.jsonl",
        &[query_line(1, 1, "a.example"), query_line(2, 3, "c.example")],
    );
    let ns2 = write_log(
        &dir,
        "ns2.jsonl",
        &[query_line(1, 2, "b.example"), query_line(2, 4, "d.example")],
    );

    let (mut poller, mut view) = start(&[node("ns1", ns1), node("ns2", ns2)], 100, 10);
    assert!(pump_until(&poller, &mut view, |v| v.rows().len() == 4));
    poller.stop();

    let subjects: Vec<&str> = view
        .rows()
        .iter()
        .filter_map(|r| r.entry.subject.as_deref())
        .collect();
    assert_eq!(subjects, vec!["d.example", "c.example", "b.example", "a.example"]);
    assert_unique_keys(&view);
}

/// Lines appended between polls arrive once, ahead of older rows, and are
/// marked as recently added. Re-fetching the overlapping page adds nothing.
#[test]
fn e2e_appended_lines_are_merged_without_duplicates() {
    let dir = TempDir::new().unwrap();
    let path = write_log(
        &dir,
        "ns1.jsonl",
        &[
            query_line(1, 1, "one.example"),
            query_line(2, 2, "two.example"),
            query_line(3, 3, "three.example"),
        ],
    );

    let (mut poller, mut view) = start(&[node("ns1", path.clone())], 100, 10);
    assert!(pump_until(&poller, &mut view, |v| v.rows().len() == 3));
    let watermark_before = view.buffer().and_then(|b| b.newest_known_timestamp());

    append_log(
        &path,
        &[query_line(4, 4, "four.example"), query_line(5, 5, "five.example")],
    );
    assert!(pump_until(&poller, &mut view, |v| v.rows().len() == 5));

    // Let a few more identical pages arrive.
    std::thread::sleep(Duration::from_millis(100));
    pump_until(&poller, &mut view, |_| true);
    poller.stop();

    assert_eq!(sequences(&view), vec![5, 4, 3, 2, 1]);
    assert_unique_keys(&view);
    assert_newest_first(&view);

    let watermark_after = view.buffer().and_then(|b| b.newest_known_timestamp());
    assert!(watermark_after > watermark_before);

    let now = Instant::now();
    let newest = view.rows()[0].key();
    assert!(view.is_recent(&newest, now));
}

/// A window smaller than the log keeps only the newest entries.
#[test]
fn e2e_capacity_bounds_window() {
    let dir = TempDir::new().unwrap();
    let lines: Vec<String> = (1..=10)
        .map(|i| query_line(i, i as u32, &format!("host{i}.example")))
        .collect();
    let path = write_log(&dir, "ns1.jsonl", &lines);

    let (mut poller, mut view) = start(&[node("ns1", path.clone())], 3, 10);
    assert!(pump_until(&poller, &mut view, |v| v.rows().len() == 3));

    append_log(&path, &[query_line(11, 11, "host11.example")]);
    assert!(pump_until(&poller, &mut view, |v| sequences(v).first() == Some(&11)));
    poller.stop();

    assert_eq!(sequences(&view), vec![11, 10, 9]);
}

/// One unreachable node produces warnings while the other keeps flowing.
#[test]
fn e2e_failing_node_does_not_stall_others() {
    let dir = TempDir::new().unwrap();
    let good = write_log(&dir, "ns1.jsonl", &[query_line(1, 1, "ok.example")]);
    let missing = dir.path().join("ns2.jsonl");

    let (mut poller, mut view) = start(&[node("ns1", good), node("ns2", missing)], 100, 10);
    assert!(pump_until(&poller, &mut view, |v| {
        v.rows().len() == 1 && !v.warnings.is_empty()
    }));
    poller.stop();

    assert!(view.warnings.iter().any(|w| w.contains("ns2")));
    assert_eq!(view.rows()[0].entry.source_id, "ns1");
}

/// Malformed lines in a node's log are skipped, not fatal.
#[test]
fn e2e_malformed_lines_are_skipped() {
    let dir = TempDir::new().unwrap();
    let path = write_log(
        &dir,
        "ns1.jsonl",
        &[
            query_line(1, 1, "a.example"),
            "not json at all".to_string(),
            query_line(2, 2, "b.example"),
        ],
    );

    let (mut poller, mut view) = start(&[node("ns1", path)], 100, 10);
    assert!(pump_until(&poller, &mut view, |v| v.rows().len() == 2));
    poller.stop();

    assert_eq!(sequences(&view), vec![2, 1]);
    assert!(view.warnings.is_empty());
}

/// A subject filter narrows the visible rows but not the window.
#[test]
fn e2e_subject_filter_applies_to_live_rows() {
    let dir = TempDir::new().unwrap();
    let path = write_log(
        &dir,
        "ns1.jsonl",
        &[
            query_line(1, 1, "ads.tracker.example"),
            query_line(2, 2, "mail.example"),
            query_line(3, 3, "cdn.tracker.example"),
        ],
    );

    let (mut poller, mut view) = start(&[node("ns1", path)], 100, 10);
    view.filter_state.subject_search = "TRACKER".to_string();
    assert!(pump_until(&poller, &mut view, |v| v.rows().len() == 3));
    poller.stop();

    let visible: Vec<u64> = view.visible_rows().map(|r| r.entry.sequence).collect();
    assert_eq!(visible, vec![3, 1]);
}

/// The final window exports to CSV newest first.
#[test]
fn e2e_export_window_to_csv() {
    let dir = TempDir::new().unwrap();
    let path = write_log(
        &dir,
        "ns1.jsonl",
        &[query_line(1, 1, "a.example"), query_line(2, 2, "b.example")],
    );

    let (mut poller, mut view) = start(&[node("ns1", path)], 100, 10);
    assert!(pump_until(&poller, &mut view, |v| v.rows().len() == 2));
    poller.stop();

    let export_path = dir.path().join("window.csv");
    let file = std::fs::File::create(&export_path).unwrap();
    let count = export_csv(view.rows(), file, &export_path).unwrap();
    assert_eq!(count, 2);

    let content = std::fs::read_to_string(&export_path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[0], "timestamp,source_id,sequence,subject,payload");
    assert!(lines[1].contains("b.example"));
    assert!(lines[2].contains("a.example"));
}

/// Restarting the poller with a reset view starts from an empty window and
/// never shows rows from the previous run twice.
#[test]
fn e2e_restart_resets_window() {
    let dir = TempDir::new().unwrap();
    let path = write_log(&dir, "ns1.jsonl", &[query_line(1, 1, "a.example")]);
    let nodes = [node("ns1", path)];

    let (mut poller, mut view) = start(&nodes, 100, 10);
    assert!(pump_until(&poller, &mut view, |v| v.rows().len() == 1));

    let source = JsonLinesSource::new(&nodes);
    let selectors = source.selectors();
    let generation = poller.start(Arc::new(source), selectors, fast_settings(10));
    view.reset(generation);
    assert!(view.rows().is_empty());

    assert!(pump_until(&poller, &mut view, |v| v.rows().len() == 1));
    poller.stop();
    assert_eq!(sequences(&view), vec![1]);
}
