// Companion - main.rs
//
// Application entry point. Handles:
// 1. CLI argument parsing
// 2. Configuration loading and logging initialisation
// 3. Restoring saved preferences
// 4. Running the live tail console until interrupted or the duration elapses
// 5. Export and preference saving on exit

use clap::Parser;
use companion::app::poller::{PollSettings, TailPoller};
use companion::app::session::{self, PersistedFilter, SessionData};
use companion::app::source::JsonLinesSource;
use companion::app::state::TailView;
use companion::core::export;
use companion::core::model::{EntryKey, NodeSelector, TailRow};
use companion::core::tail_buffer::{CapacityPolicy, MergeResult};
use companion::platform::config::{self, AppConfig, NodeConfig, PlatformPaths};
use companion::util::constants;
use companion::util::error::{CompanionError, ConfigError, ExportError};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Companion - live tail of DNS node query logs.
///
/// Polls each node's most recent query-log page and keeps a bounded,
/// newest-first window of the merged entries.
#[derive(Parser, Debug)]
#[command(name = "Companion", version, about)]
struct Cli {
    /// Node to tail, as ID=PATH to its JSON-lines query log. Repeatable.
    #[arg(short = 'n', long = "node", value_name = "ID=PATH")]
    nodes: Vec<String>,

    /// Config file to use instead of the platform default.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Tail window capacity.
    #[arg(long = "capacity")]
    capacity: Option<usize>,

    /// Entries requested per node per poll.
    #[arg(long = "page-size")]
    page_size: Option<usize>,

    /// Poll interval in milliseconds.
    #[arg(long = "interval-ms")]
    interval_ms: Option<u64>,

    /// Keep the newest rows when the capacity changes instead of clearing.
    #[arg(long = "retain-on-resize")]
    retain_on_resize: bool,

    /// Only show entries whose subject contains this text.
    #[arg(short = 's', long = "subject")]
    subject: Option<String>,

    /// Only show entries whose subject matches this regex.
    #[arg(short = 'r', long = "regex")]
    regex: Option<String>,

    /// Write the final window to this file (.csv or .json) on exit.
    #[arg(short = 'e', long = "export")]
    export: Option<PathBuf>,

    /// Stop after this many seconds (runs until interrupted if omitted).
    #[arg(long = "duration-secs")]
    duration_secs: Option<u64>,

    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long = "debug")]
    debug: bool,
}

fn main() {
    let cli = Cli::parse();

    let platform_paths = PlatformPaths::resolve();
    let (mut app_config, config_warnings) = match cli.config {
        Some(ref path) => config::load_config_file(path),
        None => config::load_config(&platform_paths.config_dir),
    };

    companion::util::logging::init(
        cli.debug,
        app_config.log_level.as_deref(),
        app_config.log_file.as_deref(),
    );

    tracing::info!(
        version = constants::APP_VERSION,
        debug = cli.debug,
        "Companion starting"
    );
    for warning in &config_warnings {
        tracing::warn!("{}", warning);
    }

    let session_file = session::session_path(&platform_paths.data_dir);
    let saved = session::load(&session_file);

    if let Err(e) = run(&cli, &mut app_config, saved, &session_file) {
        tracing::error!(error = %e, "Companion failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(
    cli: &Cli,
    app_config: &mut AppConfig,
    saved: Option<SessionData>,
    session_file: &Path,
) -> Result<(), CompanionError> {
    apply_saved_preferences(app_config, saved.as_ref());
    apply_cli_overrides(cli, app_config)?;

    if app_config.nodes.is_empty() {
        return Err(ConfigError::NoNodes.into());
    }

    let source = JsonLinesSource::new(&app_config.nodes);
    let selectors = select_nodes(&source, saved.as_ref(), cli.nodes.is_empty());

    let mut view = TailView::from_config(app_config);
    view.filter_state = match saved.as_ref() {
        Some(data) if cli.subject.is_none() && cli.regex.is_none() => data.filter.to_state(),
        _ => Default::default(),
    };
    if let Some(ref subject) = cli.subject {
        view.filter_state.subject_search = subject.clone();
    }
    if let Some(ref pattern) = cli.regex {
        view.filter_state.set_regex(pattern)?;
    }

    let mut poller = TailPoller::new();
    let generation = poller.start(
        Arc::new(source),
        selectors.clone(),
        PollSettings::from_config(app_config),
    );
    view.enter_tail(generation);

    let terminate = Arc::new(AtomicBool::new(false));
    for sig in signal_hook::consts::TERM_SIGNALS {
        signal_hook::flag::register(*sig, Arc::clone(&terminate)).map_err(|e| {
            CompanionError::Io {
                path: PathBuf::from("<signal>"),
                operation: "register termination handler",
                source: e,
            }
        })?;
    }

    let deadline = cli
        .duration_secs
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    let refresh = Duration::from_millis(constants::CONSOLE_REFRESH_MS);
    let stdout = std::io::stdout();

    loop {
        let now = Instant::now();
        for msg in poller.poll_progress(constants::MAX_TAIL_MESSAGES_PER_FRAME) {
            if let Some(result) = view.handle_progress(msg, now) {
                let mut out = stdout.lock();
                print_new_rows(&mut out, &view, &result).map_err(|e| CompanionError::Io {
                    path: PathBuf::from("<stdout>"),
                    operation: "write tail output",
                    source: e,
                })?;
            }
        }
        view.expire_highlights(now);

        if terminate.load(Ordering::Relaxed) || deadline.is_some_and(|d| now >= d) {
            break;
        }
        std::thread::sleep(refresh);
    }

    poller.stop();
    tracing::info!(
        retained = view.rows().len(),
        warnings = view.warnings.len(),
        "Live tail finished"
    );

    if let Some(ref path) = cli.export {
        let count = export_window(view.rows(), path)?;
        tracing::info!(path = %path.display(), count, "Exported tail window");
    }

    let data = SessionData {
        capacity: view.capacity(),
        capacity_policy: view.capacity_policy,
        page_size: app_config.page_size,
        poll_interval_ms: app_config.poll_interval_ms,
        selected_nodes: selectors.into_iter().map(|s| s.id).collect(),
        filter: PersistedFilter::from_state(&view.filter_state),
        ..SessionData::default()
    };
    if let Err(e) = session::save(&data, session_file) {
        tracing::warn!(error = %e, "Could not save preferences");
    }

    view.exit_tail();
    Ok(())
}

/// Saved preferences take precedence over config-file tail settings.
fn apply_saved_preferences(app_config: &mut AppConfig, saved: Option<&SessionData>) {
    let Some(data) = saved else {
        return;
    };
    if (constants::MIN_TAIL_CAPACITY..=constants::MAX_TAIL_CAPACITY).contains(&data.capacity) {
        app_config.capacity = data.capacity;
    }
    if (constants::MIN_TAIL_PAGE_SIZE..=constants::MAX_TAIL_PAGE_SIZE).contains(&data.page_size) {
        app_config.page_size = data.page_size;
    }
    if (constants::MIN_TAIL_POLL_INTERVAL_MS..=constants::MAX_TAIL_POLL_INTERVAL_MS)
        .contains(&data.poll_interval_ms)
    {
        app_config.poll_interval_ms = data.poll_interval_ms;
    }
    app_config.capacity_policy = data.capacity_policy;
}

/// CLI flags override both config and saved preferences.
fn apply_cli_overrides(cli: &Cli, app_config: &mut AppConfig) -> Result<(), CompanionError> {
    for spec in &cli.nodes {
        app_config.add_node(NodeConfig::parse_spec(spec)?)?;
    }
    if let Some(capacity) = cli.capacity {
        app_config.capacity = checked(
            "capacity",
            capacity,
            constants::MIN_TAIL_CAPACITY,
            constants::MAX_TAIL_CAPACITY,
        )?;
    }
    if let Some(page_size) = cli.page_size {
        app_config.page_size = checked(
            "page-size",
            page_size,
            constants::MIN_TAIL_PAGE_SIZE,
            constants::MAX_TAIL_PAGE_SIZE,
        )?;
    }
    if let Some(interval) = cli.interval_ms {
        app_config.poll_interval_ms = checked(
            "interval-ms",
            interval,
            constants::MIN_TAIL_POLL_INTERVAL_MS,
            constants::MAX_TAIL_POLL_INTERVAL_MS,
        )?;
    }
    if cli.retain_on_resize {
        app_config.capacity_policy = CapacityPolicy::Retain;
    }
    Ok(())
}

fn checked<T>(field: &str, value: T, min: T, max: T) -> Result<T, CompanionError>
where
    T: PartialOrd + std::fmt::Display,
{
    if value >= min && value <= max {
        Ok(value)
    } else {
        Err(ConfigError::ValueOutOfRange {
            field: field.to_string(),
            value: value.to_string(),
            expected: format!("{min}-{max}"),
        }
        .into())
    }
}

/// Nodes to poll: the saved selection when no nodes were given on the command
/// line, else every configured node.
fn select_nodes(
    source: &JsonLinesSource,
    saved: Option<&SessionData>,
    use_saved: bool,
) -> Vec<NodeSelector> {
    let all = source.selectors();
    let Some(data) = saved.filter(|d| use_saved && !d.selected_nodes.is_empty()) else {
        return all;
    };
    let wanted: HashSet<&str> = data.selected_nodes.iter().map(String::as_str).collect();
    let chosen: Vec<NodeSelector> = all
        .iter()
        .filter(|s| wanted.contains(s.id.as_str()))
        .cloned()
        .collect();
    if chosen.is_empty() {
        tracing::debug!("Saved node selection matches no configured node; polling all");
        all
    } else {
        chosen
    }
}

/// Print the rows a merge added that pass the filter, oldest first so the
/// console reads top to bottom.
fn print_new_rows<W: Write>(
    out: &mut W,
    view: &TailView,
    result: &MergeResult,
) -> std::io::Result<()> {
    if result.new_keys.is_empty() {
        return Ok(());
    }
    let fresh: HashSet<&EntryKey> = result.new_keys.iter().collect();
    let rows: Vec<&TailRow> = view
        .visible_rows()
        .filter(|row| fresh.contains(&row.key()))
        .collect();
    for row in rows.into_iter().rev() {
        writeln!(out, "{}", format_row(row))?;
    }
    out.flush()
}

fn format_row(row: &TailRow) -> String {
    let entry = &row.entry;
    let timestamp = match row.resolved {
        Some(ts) => ts.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        None => entry.timestamp.clone().unwrap_or_else(|| "-".to_string()),
    };
    format!(
        "{timestamp}  {:<12} #{:<8} {}",
        entry.source_id,
        entry.sequence,
        entry.subject.as_deref().unwrap_or("-")
    )
}

fn export_window(rows: &[TailRow], path: &Path) -> Result<usize, CompanionError> {
    let file = std::fs::File::create(path).map_err(|e| ExportError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let writer = std::io::BufWriter::new(file);
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let count = if is_json {
        export::export_json(rows, writer, path)?
    } else {
        export::export_csv(rows, writer, path)?
    };
    Ok(count)
}
