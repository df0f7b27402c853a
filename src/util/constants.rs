// Companion - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.
// Config validation and the CLI both clamp against these values.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "Companion";

/// Application identifier used for config/data directories.
pub const APP_ID: &str = "Companion";

/// Current application version (updated by release script).
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Tail buffer limits
// =============================================================================

/// Default number of entries retained by the live tail window.
pub const DEFAULT_TAIL_CAPACITY: usize = 100;

/// Minimum user-configurable tail capacity. Zero would make the window useless.
pub const MIN_TAIL_CAPACITY: usize = 1;

/// Maximum user-configurable tail capacity.
///
/// Every merge rebuilds a key set and re-sorts the window, so the bound keeps
/// a single poll tick well under a millisecond on modest hardware.
pub const MAX_TAIL_CAPACITY: usize = 10_000;

// =============================================================================
// Polling limits
// =============================================================================

/// Default number of entries requested from a node per poll.
pub const DEFAULT_TAIL_PAGE_SIZE: usize = 100;

/// Minimum user-configurable page size.
pub const MIN_TAIL_PAGE_SIZE: usize = 1;

/// Maximum user-configurable page size.
pub const MAX_TAIL_PAGE_SIZE: usize = 1_000;

/// How often the poller fetches a fresh page from each node (ms).
pub const TAIL_POLL_INTERVAL_MS: u64 = 2_000;

/// Minimum user-configurable poll interval (ms).
pub const MIN_TAIL_POLL_INTERVAL_MS: u64 = 250;

/// Maximum user-configurable poll interval (ms).
pub const MAX_TAIL_POLL_INTERVAL_MS: u64 = 60_000; // 60 s

/// How often the cancel flag is checked within each poll sleep interval (ms).
pub const TAIL_CANCEL_CHECK_INTERVAL_MS: u64 = 100;

/// Hard timeout for a single page fetch (ms). A fetch that has not returned
/// by then is abandoned and reported as a timeout; its late result is dropped.
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;

/// Minimum user-configurable fetch timeout (ms).
pub const MIN_FETCH_TIMEOUT_MS: u64 = 100;

/// Maximum user-configurable fetch timeout (ms).
pub const MAX_FETCH_TIMEOUT_MS: u64 = 120_000;

/// Maximum number of nodes that can be tailed at once.
pub const MAX_NODES: usize = 64;

// =============================================================================
// Node log reading
// =============================================================================

/// Maximum bytes read from the end of a node's log file per fetch.
/// Only the most recent page is needed, so the head of large files is skipped.
pub const MAX_SOURCE_READ_BYTES: usize = 4 * 1_024 * 1_024; // 4 MiB

/// Maximum size of a single JSON-lines entry. Longer lines are skipped as
/// malformed to keep one bad record from ballooning memory.
pub const MAX_ENTRY_LINE_BYTES: usize = 64 * 1_024; // 64 KiB

// =============================================================================
// Highlighting
// =============================================================================

/// How long a newly merged entry stays marked as "recently added" (seconds).
pub const NEW_ENTRY_HIGHLIGHT_SECS: u64 = 10;

/// Minimum user-configurable highlight duration (seconds).
pub const MIN_HIGHLIGHT_SECS: u64 = 1;

/// Maximum user-configurable highlight duration (seconds).
pub const MAX_HIGHLIGHT_SECS: u64 = 300;

// =============================================================================
// Per-frame message budgets
// =============================================================================

/// Maximum number of poller messages handled per front-end refresh.
/// Remaining messages stay queued for the next refresh.
pub const MAX_TAIL_MESSAGES_PER_FRAME: usize = 200;

/// How often the console front-end drains the poller channel (ms).
pub const CONSOLE_REFRESH_MS: u64 = 200;

/// Maximum number of non-fatal warnings kept by a view session.
pub const MAX_WARNINGS: usize = 1_000;

// =============================================================================
// Filtering
// =============================================================================

/// Maximum regex pattern length to prevent ReDoS.
pub const MAX_REGEX_PATTERN_LENGTH: usize = 4_096;

// =============================================================================
// Logging
// =============================================================================

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Maximum length of a raw line included in debug output.
pub const DEBUG_MAX_LINE_PREVIEW: usize = 200;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Preferences persistence file name (stored in the platform data directory).
pub const SESSION_FILE_NAME: &str = "session.json";
