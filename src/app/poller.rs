// Companion - app/poller.rs
//
// Live tail polling: fetches the most recent page from each selected node on
// a fixed cadence and streams the pages to the view session.
//
// Architecture:
//   - `TailPoller` lives on the front-end thread; `run_poll_loop` runs on a
//     background thread.
//   - An `Arc<AtomicBool>` cancel flag allows the front-end to stop the loop.
//   - Pages are sent as `TailProgress::Page` over an mpsc channel; the
//     front-end drains the channel on each refresh.
//   - Every run gets a new generation number stamped on each message, so a
//     view that was reset (or a poller that was restarted) can discard results
//     from a superseded run that were already queued.
//
// Fetch discipline:
//   - One fetch at a time: nodes are polled sequentially and the next tick
//     only starts once every fetch of the current tick has finished or timed
//     out. The view therefore never sees two merges racing.
//   - Each fetch runs on a short-lived worker thread and is abandoned after
//     `fetch_timeout`. The abandoned worker's late result is dropped with its
//     channel, so a hung node cannot wedge the loop.
//   - A node has at most one worker alive, across runs too. While an
//     abandoned worker is still blocked, that node is skipped and reported
//     as `StillRunning` instead of stacking another worker on top of it.
//   - A failed or timed-out fetch is reported as `FetchFailed`; the next tick
//     simply retries.
//   - Sleeps and fetch waits are sliced so cancel is noticed within
//     `cancel_check` of the flag being set.

use crate::app::source::LogSource;
use crate::core::model::{LogEntry, NodeSelector, TailProgress};
use crate::platform::config::AppConfig;
use crate::util::constants::TAIL_CANCEL_CHECK_INTERVAL_MS;
use crate::util::error::SourceError;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

// =============================================================================
// Settings
// =============================================================================

/// Timing and sizing for one polling run.
#[derive(Debug, Clone)]
pub struct PollSettings {
    /// Entries requested per node per tick.
    pub page_size: usize,
    /// Time between the end of one tick and the start of the next.
    pub poll_interval: Duration,
    /// Hard timeout for a single fetch.
    pub fetch_timeout: Duration,
    /// Granularity at which the cancel flag is checked.
    pub cancel_check: Duration,
}

impl PollSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            page_size: config.page_size,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            fetch_timeout: Duration::from_millis(config.fetch_timeout_ms),
            cancel_check: Duration::from_millis(TAIL_CANCEL_CHECK_INTERVAL_MS),
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

// =============================================================================
// TailPoller
// =============================================================================

/// Manages a polling run on a background thread.
pub struct TailPoller {
    /// Channel receiver for the front-end to drain progress messages.
    progress_rx: Option<mpsc::Receiver<TailProgress>>,
    /// Cancel flag shared with the background thread.
    cancel_flag: Option<Arc<AtomicBool>>,
    /// Generation of the most recently started run.
    generation: u64,
    /// Node ids with a fetch worker still alive. Outlives individual runs.
    in_flight: InFlight,
}

impl TailPoller {
    pub fn new() -> Self {
        Self {
            progress_rx: None,
            cancel_flag: None,
            generation: 0,
            in_flight: InFlight::default(),
        }
    }

    /// Start polling `nodes` through `source`. Returns the new generation.
    ///
    /// If a run is already active it is stopped first; anything it still
    /// sends is discarded along with its channel.
    pub fn start(
        &mut self,
        source: Arc<dyn LogSource>,
        nodes: Vec<NodeSelector>,
        settings: PollSettings,
    ) -> u64 {
        self.stop();

        self.generation += 1;
        let generation = self.generation;

        let (tx, rx) = mpsc::channel();
        let cancel = Arc::new(AtomicBool::new(false));

        self.progress_rx = Some(rx);
        self.cancel_flag = Some(Arc::clone(&cancel));

        let node_count = nodes.len();
        let in_flight = self.in_flight.clone();
        std::thread::spawn(move || {
            run_poll_loop(source, nodes, settings, generation, tx, cancel, in_flight);
        });

        tracing::info!(nodes = node_count, generation, "Live tail polling started");
        generation
    }

    /// Request the background thread to stop.
    pub fn stop(&mut self) {
        if let Some(flag) = self.cancel_flag.take() {
            flag.store(true, Ordering::SeqCst);
            tracing::info!(generation = self.generation, "Live tail polling stopped");
        }
        self.progress_rx = None;
    }

    /// Returns `true` if a polling run is currently active.
    pub fn is_active(&self) -> bool {
        self.cancel_flag.is_some()
    }

    /// Generation of the most recently started run (0 before the first start).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Drain up to `max` queued messages without blocking.
    pub fn poll_progress(&self, max: usize) -> Vec<TailProgress> {
        let mut messages = Vec::new();
        if let Some(ref rx) = self.progress_rx {
            while messages.len() < max {
                match rx.try_recv() {
                    Ok(msg) => messages.push(msg),
                    Err(_) => break,
                }
            }
        }
        messages
    }
}

impl Default for TailPoller {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TailPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

// =============================================================================
// Background poll loop
// =============================================================================

/// Set of node ids whose fetch worker has not returned yet.
#[derive(Debug, Clone, Default)]
struct InFlight(Arc<Mutex<HashSet<String>>>);

impl InFlight {
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim `node` for a new worker. `None` if one is already running.
    fn claim(&self, node: &str) -> Option<InFlightGuard> {
        if self.lock().insert(node.to_string()) {
            Some(InFlightGuard {
                set: self.clone(),
                node: node.to_string(),
            })
        } else {
            None
        }
    }
}

/// Releases the node's claim when the worker finishes (or panics).
struct InFlightGuard {
    set: InFlight,
    node: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.lock().remove(&self.node);
    }
}

enum FetchOutcome {
    Done(Result<Vec<LogEntry>, SourceError>),
    Cancelled,
}

fn run_poll_loop(
    source: Arc<dyn LogSource>,
    nodes: Vec<NodeSelector>,
    settings: PollSettings,
    generation: u64,
    tx: mpsc::Sender<TailProgress>,
    cancel: Arc<AtomicBool>,
    in_flight: InFlight,
) {
    macro_rules! send {
        ($msg:expr) => {
            if tx.send($msg).is_err() {
                // Front-end channel closed; nobody is listening.
                return;
            }
        };
    }

    send!(TailProgress::Started {
        generation,
        node_count: nodes.len(),
    });

    let slice = settings.cancel_check.max(Duration::from_millis(1));

    loop {
        for node in &nodes {
            if cancel.load(Ordering::SeqCst) {
                send!(TailProgress::Stopped { generation });
                return;
            }

            match fetch_with_timeout(&source, node, &settings, slice, &cancel, &in_flight) {
                FetchOutcome::Cancelled => {
                    send!(TailProgress::Stopped { generation });
                    return;
                }
                FetchOutcome::Done(Ok(entries)) => {
                    send!(TailProgress::Page {
                        generation,
                        node: node.id.clone(),
                        entries,
                    });
                }
                FetchOutcome::Done(Err(e)) => {
                    tracing::warn!(node = %node.id, error = %e, "Tail fetch failed");
                    send!(TailProgress::FetchFailed {
                        generation,
                        node: node.id.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        // Interruptible sleep until the next tick.
        let wake_at = Instant::now() + settings.poll_interval;
        loop {
            if cancel.load(Ordering::SeqCst) {
                send!(TailProgress::Stopped { generation });
                return;
            }
            let now = Instant::now();
            if now >= wake_at {
                break;
            }
            std::thread::sleep(slice.min(wake_at - now));
        }
    }
}

/// Run one fetch on a worker thread, waiting at most `settings.fetch_timeout`.
fn fetch_with_timeout(
    source: &Arc<dyn LogSource>,
    node: &NodeSelector,
    settings: &PollSettings,
    slice: Duration,
    cancel: &AtomicBool,
    in_flight: &InFlight,
) -> FetchOutcome {
    let Some(claim) = in_flight.claim(&node.id) else {
        return FetchOutcome::Done(Err(SourceError::StillRunning {
            source_id: node.id.clone(),
        }));
    };

    let (tx, rx) = mpsc::channel();
    let worker_source = Arc::clone(source);
    let worker_node = node.clone();
    let page_size = settings.page_size;

    let spawned = std::thread::Builder::new()
        .name(format!("fetch-{}", node.id))
        .spawn(move || {
            let result = worker_source.fetch_recent_page(&worker_node, page_size);
            drop(claim);
            // Receiver may be gone if this fetch was abandoned.
            let _ = tx.send(result);
        });
    if let Err(e) = spawned {
        tracing::error!(node = %node.id, error = %e, "Cannot spawn fetch worker");
        return FetchOutcome::Done(Err(SourceError::Disconnected {
            source_id: node.id.clone(),
        }));
    }

    let deadline = Instant::now() + settings.fetch_timeout;
    loop {
        let now = Instant::now();
        if now >= deadline {
            return FetchOutcome::Done(Err(SourceError::Timeout {
                source_id: node.id.clone(),
                timeout_ms: settings.fetch_timeout.as_millis() as u64,
            }));
        }
        match rx.recv_timeout(slice.min(deadline - now)) {
            Ok(result) => return FetchOutcome::Done(result),
            Err(RecvTimeoutError::Timeout) => {
                if cancel.load(Ordering::SeqCst) {
                    return FetchOutcome::Cancelled;
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                return FetchOutcome::Done(Err(SourceError::Disconnected {
                    source_id: node.id.clone(),
                }));
            }
        }
    }
}
