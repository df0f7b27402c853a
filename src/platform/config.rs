// Companion - platform/config.rs
//
// Platform-specific configuration, data directory resolution, and config.toml
// loading with startup validation.
//
// Uses the `directories` crate for XDG (Linux), AppData (Windows),
// Library (macOS) compliance.

use crate::core::tail_buffer::CapacityPolicy;
use crate::util::constants;
use crate::util::error::ConfigError;
use directories::ProjectDirs;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Resolved platform paths for Companion data and configuration.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Configuration directory (e.g. ~/.config/companion/ or %APPDATA%\Companion\config\)
    pub config_dir: PathBuf,

    /// Data directory for persisted preferences.
    pub data_dir: PathBuf,
}

impl PlatformPaths {
    /// Resolve platform-appropriate paths.
    ///
    /// Falls back to current directory if platform dirs cannot be determined.
    pub fn resolve() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("", "", constants::APP_ID) {
            let config_dir = proj_dirs.config_dir().to_path_buf();
            let data_dir = proj_dirs.data_dir().to_path_buf();

            tracing::debug!(
                config = %config_dir.display(),
                data = %data_dir.display(),
                "Platform paths resolved"
            );

            Self {
                config_dir,
                data_dir,
            }
        } else {
            tracing::warn!("Could not determine platform directories, using current directory");
            let fallback = PathBuf::from(".");
            Self {
                config_dir: fallback.clone(),
                data_dir: fallback,
            }
        }
    }
}

// =============================================================================
// config.toml loading and validation
// =============================================================================

/// Raw deserialisable shape of config.toml.
///
/// Unknown keys are silently ignored for forward compatibility -- a newer
/// config file can be used with an older binary without crashing.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawConfig {
    /// `[tail]` section.
    pub tail: TailSection,
    /// `[[nodes]]` array.
    pub nodes: Vec<NodeSection>,
    /// `[logging]` section.
    pub logging: LoggingSection,
}

/// `[tail]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct TailSection {
    /// Entries retained by the live tail window.
    pub capacity: Option<usize>,
    /// "reset" or "retain" when the capacity changes.
    pub capacity_policy: Option<String>,
    /// Entries requested per node per poll.
    pub page_size: Option<usize>,
    /// Poll cadence in ms.
    pub poll_interval_ms: Option<u64>,
    /// Hard timeout per fetch in ms.
    pub fetch_timeout_ms: Option<u64>,
    /// How long new rows stay highlighted, in seconds.
    pub highlight_secs: Option<u64>,
}

/// One `[[nodes]]` entry.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Node identifier shown in the tail and used as the default source id.
    pub id: Option<String>,
    /// Path of the node's JSON-lines query log.
    pub path: Option<String>,
}

/// `[logging]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: Option<String>,
    /// Log file path (empty = stderr only).
    pub file: Option<String>,
}

/// A validated node definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub id: String,
    pub path: PathBuf,
}

impl NodeConfig {
    /// Parse a CLI node spec of the form `ID=PATH`.
    pub fn parse_spec(spec: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidNode {
            spec: spec.to_string(),
            reason: reason.to_string(),
        };
        let (id, path) = spec
            .split_once('=')
            .ok_or_else(|| invalid("expected ID=PATH"))?;
        let id = id.trim();
        let path = path.trim();
        if id.is_empty() {
            return Err(invalid("node id is empty"));
        }
        if path.is_empty() {
            return Err(invalid("node path is empty"));
        }
        Ok(Self {
            id: id.to_string(),
            path: PathBuf::from(path),
        })
    }
}

/// Validated application configuration derived from `config.toml`.
///
/// All values are validated against named constants at load time.
/// Invalid values produce actionable warnings and fall back to defaults.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // -- Tail --
    pub capacity: usize,
    pub capacity_policy: CapacityPolicy,
    pub page_size: usize,
    pub poll_interval_ms: u64,
    pub fetch_timeout_ms: u64,
    pub highlight_secs: u64,

    // -- Nodes --
    pub nodes: Vec<NodeConfig>,

    // -- Logging --
    /// Logging level string (for init before tracing is available).
    pub log_level: Option<String>,
    /// Log file path.
    pub log_file: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            capacity: constants::DEFAULT_TAIL_CAPACITY,
            capacity_policy: CapacityPolicy::default(),
            page_size: constants::DEFAULT_TAIL_PAGE_SIZE,
            poll_interval_ms: constants::TAIL_POLL_INTERVAL_MS,
            fetch_timeout_ms: constants::DEFAULT_FETCH_TIMEOUT_MS,
            highlight_secs: constants::NEW_ENTRY_HIGHLIGHT_SECS,
            nodes: Vec::new(),
            log_level: None,
            log_file: None,
        }
    }
}

impl AppConfig {
    /// Add a node, rejecting empty or duplicate ids and the node-count limit.
    pub fn add_node(&mut self, node: NodeConfig) -> Result<(), ConfigError> {
        if self.nodes.iter().any(|n| n.id == node.id) {
            return Err(ConfigError::InvalidNode {
                spec: node.id,
                reason: "duplicate node id".to_string(),
            });
        }
        if self.nodes.len() >= constants::MAX_NODES {
            return Err(ConfigError::ValueOutOfRange {
                field: "nodes".to_string(),
                value: (self.nodes.len() + 1).to_string(),
                expected: format!("at most {} nodes", constants::MAX_NODES),
            });
        }
        self.nodes.push(node);
        Ok(())
    }
}

/// Check `value` against an inclusive range, returning an actionable message.
fn check_range<T>(section: &str, field: &str, value: T, min: T, max: T, default: T) -> Result<T, String>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if value >= min && value <= max {
        Ok(value)
    } else {
        Err(format!(
            "[{section}] {field} = {value} is out of range ({min}-{max}). Using default ({default})."
        ))
    }
}

/// Load and validate `config.toml` from the given config directory.
///
/// Returns `AppConfig` with validated values and a list of non-fatal warnings.
/// If the file does not exist, returns defaults with no warnings (first-run).
pub fn load_config(config_dir: &Path) -> (AppConfig, Vec<String>) {
    load_config_file(&config_dir.join(constants::CONFIG_FILE_NAME))
}

/// Load and validate a specific config file.
///
/// If the file is unparseable, returns defaults with a warning: the
/// application still starts but the user is informed.
pub fn load_config_file(config_path: &Path) -> (AppConfig, Vec<String>) {
    let mut warnings: Vec<String> = Vec::new();

    if !config_path.exists() {
        tracing::debug!(path = %config_path.display(), "No config.toml found; using defaults");
        return (AppConfig::default(), warnings);
    }

    let content = match std::fs::read_to_string(config_path) {
        Ok(c) => c,
        Err(e) => {
            let err = ConfigError::Io {
                path: config_path.to_path_buf(),
                source: e,
            };
            let msg = format!("{err}. Using defaults.");
            tracing::warn!("{}", msg);
            warnings.push(msg);
            return (AppConfig::default(), warnings);
        }
    };

    let raw: RawConfig = match toml::from_str(&content) {
        Ok(r) => r,
        Err(e) => {
            let err = ConfigError::TomlParse {
                path: config_path.to_path_buf(),
                source: e,
            };
            let msg = format!("{err}. Using defaults.");
            tracing::warn!("{}", msg);
            warnings.push(msg);
            return (AppConfig::default(), warnings);
        }
    };

    tracing::info!(path = %config_path.display(), "Loaded config.toml");

    let config = validate(raw, &mut warnings);

    if !warnings.is_empty() {
        tracing::warn!(
            count = warnings.len(),
            "Config validation produced warnings"
        );
    }

    (config, warnings)
}

/// Validate every field against named constants, accumulating all warnings.
fn validate(raw: RawConfig, warnings: &mut Vec<String>) -> AppConfig {
    let mut config = AppConfig::default();
    let tail = &raw.tail;

    if let Some(v) = tail.capacity {
        match check_range(
            "tail",
            "capacity",
            v,
            constants::MIN_TAIL_CAPACITY,
            constants::MAX_TAIL_CAPACITY,
            constants::DEFAULT_TAIL_CAPACITY,
        ) {
            Ok(v) => config.capacity = v,
            Err(msg) => warnings.push(msg),
        }
    }

    if let Some(ref policy) = tail.capacity_policy {
        match policy.to_lowercase().as_str() {
            "reset" => config.capacity_policy = CapacityPolicy::Reset,
            "retain" => config.capacity_policy = CapacityPolicy::Retain,
            other => warnings.push(format!(
                "[tail] capacity_policy = \"{other}\" is not recognised. \
                 Expected \"reset\" or \"retain\". Using default (reset).",
            )),
        }
    }

    if let Some(v) = tail.page_size {
        match check_range(
            "tail",
            "page_size",
            v,
            constants::MIN_TAIL_PAGE_SIZE,
            constants::MAX_TAIL_PAGE_SIZE,
            constants::DEFAULT_TAIL_PAGE_SIZE,
        ) {
            Ok(v) => config.page_size = v,
            Err(msg) => warnings.push(msg),
        }
    }

    if let Some(v) = tail.poll_interval_ms {
        match check_range(
            "tail",
            "poll_interval_ms",
            v,
            constants::MIN_TAIL_POLL_INTERVAL_MS,
            constants::MAX_TAIL_POLL_INTERVAL_MS,
            constants::TAIL_POLL_INTERVAL_MS,
        ) {
            Ok(v) => config.poll_interval_ms = v,
            Err(msg) => warnings.push(msg),
        }
    }

    if let Some(v) = tail.fetch_timeout_ms {
        match check_range(
            "tail",
            "fetch_timeout_ms",
            v,
            constants::MIN_FETCH_TIMEOUT_MS,
            constants::MAX_FETCH_TIMEOUT_MS,
            constants::DEFAULT_FETCH_TIMEOUT_MS,
        ) {
            Ok(v) => config.fetch_timeout_ms = v,
            Err(msg) => warnings.push(msg),
        }
    }

    if let Some(v) = tail.highlight_secs {
        match check_range(
            "tail",
            "highlight_secs",
            v,
            constants::MIN_HIGHLIGHT_SECS,
            constants::MAX_HIGHLIGHT_SECS,
            constants::NEW_ENTRY_HIGHLIGHT_SECS,
        ) {
            Ok(v) => config.highlight_secs = v,
            Err(msg) => warnings.push(msg),
        }
    }

    // -- Nodes: skip unusable entries, keep the rest --
    let mut seen: HashSet<String> = HashSet::new();
    for (idx, node) in raw.nodes.into_iter().enumerate() {
        let id = node.id.as_deref().map(str::trim).unwrap_or("");
        let path = node.path.as_deref().map(str::trim).unwrap_or("");
        if id.is_empty() || path.is_empty() {
            warnings.push(format!(
                "[[nodes]] entry {} needs both id and path. Skipping it.",
                idx + 1
            ));
            continue;
        }
        if !seen.insert(id.to_string()) {
            warnings.push(format!(
                "[[nodes]] id = \"{id}\" is defined more than once. Keeping the first."
            ));
            continue;
        }
        let node = NodeConfig {
            id: id.to_string(),
            path: PathBuf::from(path),
        };
        if let Err(e) = config.add_node(node) {
            warnings.push(format!("[[nodes]] {e}. Skipping it."));
        }
    }

    if let Some(ref level) = raw.logging.level {
        let valid = ["error", "warn", "info", "debug", "trace"];
        if valid.contains(&level.to_lowercase().as_str()) {
            config.log_level = Some(level.clone());
        } else {
            warnings.push(format!(
                "[logging] level = \"{level}\" is not recognised. \
                 Valid values: error, warn, info, debug, trace. Using default (info).",
            ));
        }
    }

    if let Some(ref file) = raw.logging.file {
        if !file.is_empty() {
            config.log_file = Some(file.clone());
        }
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join(constants::CONFIG_FILE_NAME);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let (config, warnings) = load_config(dir.path());
        assert!(warnings.is_empty());
        assert_eq!(config.capacity, constants::DEFAULT_TAIL_CAPACITY);
        assert_eq!(config.capacity_policy, CapacityPolicy::Reset);
        assert!(config.nodes.is_empty());
    }

    #[test]
    fn test_valid_config_applied() {
        let dir = TempDir::new().unwrap();
        write_config(
            &dir,
            r#"
[tail]
capacity = 500
capacity_policy = "Retain"
page_size = 50
poll_interval_ms = 1000
fetch_timeout_ms = 5000
highlight_secs = 5

[[nodes]]
id = "ns1"
path = "/var/log/ns1/query.jsonl"

[[nodes]]
id = "ns2"
path = "/var/log/ns2/query.jsonl"

[logging]
level = "debug"
file = "/tmp/companion.log"
"#,
        );
        let (config, warnings) = load_config(dir.path());
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
        assert_eq!(config.capacity, 500);
        assert_eq!(config.capacity_policy, CapacityPolicy::Retain);
        assert_eq!(config.page_size, 50);
        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.fetch_timeout_ms, 5000);
        assert_eq!(config.highlight_secs, 5);
        assert_eq!(config.nodes.len(), 2);
        assert_eq!(config.nodes[1].id, "ns2");
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.log_file.as_deref(), Some("/tmp/companion.log"));
    }

    #[test]
    fn test_out_of_range_values_fall_back_with_warnings() {
        let dir = TempDir::new().unwrap();
        write_config(
            &dir,
            r#"
[tail]
capacity = 0
poll_interval_ms = 5
capacity_policy = "sometimes"
"#,
        );
        let (config, warnings) = load_config(dir.path());
        assert_eq!(warnings.len(), 3, "{warnings:?}");
        assert_eq!(config.capacity, constants::DEFAULT_TAIL_CAPACITY);
        assert_eq!(config.poll_interval_ms, constants::TAIL_POLL_INTERVAL_MS);
        assert_eq!(config.capacity_policy, CapacityPolicy::Reset);
    }

    #[test]
    fn test_bad_and_duplicate_nodes_skipped() {
        let dir = TempDir::new().unwrap();
        write_config(
            &dir,
            r#"
[[nodes]]
id = "ns1"
path = "a.jsonl"

[[nodes]]
id = "ns1"
path = "b.jsonl"

[[nodes]]
path = "c.jsonl"
"#,
        );
        let (config, warnings) = load_config(dir.path());
        assert_eq!(config.nodes.len(), 1);
        assert_eq!(config.nodes[0].path, PathBuf::from("a.jsonl"));
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn test_unparseable_file_yields_defaults_with_warning() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "[tail\ncapacity = ");
        let (config, warnings) = load_config(dir.path());
        assert_eq!(warnings.len(), 1);
        assert_eq!(config.capacity, constants::DEFAULT_TAIL_CAPACITY);
    }

    #[test]
    fn test_parse_node_spec() {
        let node = NodeConfig::parse_spec("ns1=/logs/ns1.jsonl").unwrap();
        assert_eq!(node.id, "ns1");
        assert_eq!(node.path, PathBuf::from("/logs/ns1.jsonl"));

        assert!(NodeConfig::parse_spec("no-equals").is_err());
        assert!(NodeConfig::parse_spec("=path").is_err());
        assert!(NodeConfig::parse_spec("id=").is_err());
    }

    #[test]
    fn test_add_node_rejects_duplicates() {
        let mut config = AppConfig::default();
        config
            .add_node(NodeConfig::parse_spec("ns1=a").unwrap())
            .unwrap();
        assert!(config
            .add_node(NodeConfig::parse_spec("ns1=b").unwrap())
            .is_err());
    }
}
