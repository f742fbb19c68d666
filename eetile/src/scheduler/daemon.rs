//! Request scheduler daemon.
//!
//! The [`SchedulerDaemon`] is a background task that owns every piece of
//! scheduling state: the per-coordinate request map, the priority queue and
//! the in-flight counter. Callers talk to it only through a
//! [`SchedulerHandle`], so the at-most-one-fetch-per-coordinate rule holds
//! without any locking.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        SchedulerDaemon                            │
//! │                                                                   │
//! │  Load ──► ┌──────────────┐                                        │
//! │           │ Request map  │──► Tracked ──► attach listener         │
//! │           └──────┬───────┘                                        │
//! │                  │ New                                            │
//! │                  ▼                                                │
//! │           ┌──────────────┐      slot free      ┌──────────────┐   │
//! │           │ PriorityQueue│────────────────────►│ fetch task   │   │
//! │           └──────────────┘                     │ (with retry) │   │
//! │                  ▲                             └──────┬───────┘   │
//! │                  │ pump                               │           │
//! │           ┌──────┴───────┐      Completion            │           │
//! │           │   Fan-out    │◄───────────────────────────┘           │
//! │           └──────────────┘ ──► every listener, then evict         │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use eetile::scheduler::{SchedulerConfig, SchedulerDaemon};
//!
//! let (daemon, handle) = SchedulerDaemon::new(SchedulerConfig::default(), fetcher);
//! let shutdown = CancellationToken::new();
//! tokio::spawn(daemon.run(shutdown.clone()));
//!
//! let tile = handle.load(coord, Priority::VISIBLE, &shutdown).await;
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::coord::TileCoordinate;
use crate::source::{TileCompleter, TileHandle};

use super::fetch::{fetch_with_retry, FetchReport, TileFetcher};
use super::policy::{Priority, RetryPolicy, DEFAULT_MAX_ATTEMPTS};
use super::queue::PriorityQueue;
use super::request::{ListenerId, RequestId, RequestState, TrackedRequest};

// =============================================================================
// Configuration
// =============================================================================

/// Default cap on simultaneous network operations.
pub const DEFAULT_MAX_CONCURRENT: usize = 8;

/// Configuration for the scheduler daemon.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Maximum number of fetches in flight at once (including backoff).
    pub max_concurrent: usize,

    /// How transient failures are retried.
    pub retry: RetryPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            retry: RetryPolicy::exponential(DEFAULT_MAX_ATTEMPTS),
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Snapshot of scheduler activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Total `load` calls received
    pub requests: u64,
    /// Calls that joined an already tracked request
    pub coalesced: u64,
    /// Requests dispatched to the network
    pub fetches: u64,
    /// Extra attempts spent on transient failures
    pub retries: u64,
    /// Requests completed with image data
    pub succeeded: u64,
    /// Requests completed with an error
    pub failed: u64,
    /// Requests abandoned by their last listener
    pub cancelled: u64,
    /// Fetches currently holding a concurrency slot
    pub in_flight: usize,
    /// Entries waiting in the priority queue
    pub queued: usize,
    /// Coordinates currently tracked
    pub tracked: usize,
}

impl SchedulerStats {
    /// Returns the coalescing ratio (0.0 to 1.0)
    pub fn coalescing_ratio(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.coalesced as f64 / self.requests as f64
        }
    }
}

// =============================================================================
// Messages
// =============================================================================

enum Command {
    Load {
        coord: TileCoordinate,
        priority: Priority,
        listener: ListenerId,
        completer: TileCompleter,
    },
    Detach {
        coord: TileCoordinate,
        listener: ListenerId,
    },
    Stats {
        reply: oneshot::Sender<SchedulerStats>,
    },
    State {
        coord: TileCoordinate,
        reply: oneshot::Sender<Option<RequestState>>,
    },
}

struct Completion {
    coord: TileCoordinate,
    request: RequestId,
    report: Option<FetchReport>,
}

// =============================================================================
// Handle
// =============================================================================

/// Cloneable front end of a running [`SchedulerDaemon`].
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::UnboundedSender<Command>,
    next_listener: Arc<AtomicU64>,
}

impl SchedulerHandle {
    /// Begins or joins a fetch for `coord`.
    ///
    /// The returned handle is bound to `disposal`: once that token fires it
    /// resolves to `None`. Dropping the handle unresolved detaches it from
    /// the request, cancelling the fetch if no other listener remains.
    pub fn load(
        &self,
        coord: TileCoordinate,
        priority: Priority,
        disposal: &CancellationToken,
    ) -> TileHandle {
        let listener = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        let (completer, handle) = TileHandle::channel(disposal.clone());

        let command = Command::Load {
            coord,
            priority,
            listener,
            completer,
        };
        if self.commands.send(command).is_err() {
            // Daemon is gone; the dropped completer resolves the handle to None
            return handle;
        }

        let commands = self.commands.clone();
        handle.on_release(move || {
            let _ = commands.send(Command::Detach { coord, listener });
        })
    }

    /// Returns a snapshot of scheduler statistics.
    ///
    /// Returns `None` once the daemon has stopped.
    pub async fn stats(&self) -> Option<SchedulerStats> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(Command::Stats { reply }).ok()?;
        rx.await.ok()
    }

    /// Returns the state of the request tracked for `coord`, if any.
    ///
    /// Requests are evicted as soon as they reach a terminal state, so this
    /// only ever reports `Pending` or `InFlight`.
    pub async fn request_state(&self, coord: TileCoordinate) -> Option<RequestState> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(Command::State { coord, reply }).ok()?;
        rx.await.ok().flatten()
    }

    /// Returns true once the daemon has stopped.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

impl std::fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("closed", &self.commands.is_closed())
            .finish()
    }
}

// =============================================================================
// Scheduler Daemon
// =============================================================================

/// The request scheduler daemon.
///
/// Owns all scheduling state and receives commands from [`SchedulerHandle`]s.
/// Runs as a long-lived background task.
///
/// # Type Parameters
///
/// * `F` - Performs a single network attempt for one tile
pub struct SchedulerDaemon<F: TileFetcher> {
    config: SchedulerConfig,
    fetcher: Arc<F>,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl<F: TileFetcher> SchedulerDaemon<F> {
    /// Creates a new daemon with its command channel.
    ///
    /// Returns the daemon and a handle that can be cloned for callers.
    pub fn new(config: SchedulerConfig, fetcher: Arc<F>) -> (Self, SchedulerHandle) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let daemon = Self {
            config,
            fetcher,
            commands,
        };
        let handle = SchedulerHandle {
            commands: commands_tx,
            next_listener: Arc::new(AtomicU64::new(0)),
        };
        (daemon, handle)
    }

    /// Runs the daemon until `shutdown` fires or every handle is dropped.
    ///
    /// On exit every tracked request is cancelled and every listener is
    /// dropped without an outcome.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            max_concurrent = self.config.max_concurrent,
            max_attempts = self.config.retry.max_attempts(),
            "Request scheduler starting"
        );

        let Self {
            config,
            fetcher,
            mut commands,
        } = self;

        let (completions_tx, mut completions) = mpsc::unbounded_channel();
        let mut state = SchedulerState::new(config, fetcher, completions_tx, shutdown.clone());

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Request scheduler shutting down");
                    break;
                }

                Some(completion) = completions.recv() => {
                    state.handle_completion(completion);
                }

                command = commands.recv() => match command {
                    Some(command) => state.handle_command(command),
                    None => {
                        debug!("All scheduler handles dropped");
                        break;
                    }
                },
            }
        }

        state.close();
        info!("Request scheduler stopped");
    }
}

// =============================================================================
// Scheduling State
// =============================================================================

struct Entry {
    request: TrackedRequest,
    listeners: Vec<(ListenerId, TileCompleter)>,
    cancel: CancellationToken,
}

struct SchedulerState<F: TileFetcher> {
    config: SchedulerConfig,
    fetcher: Arc<F>,
    completions: mpsc::UnboundedSender<Completion>,
    shutdown: CancellationToken,
    entries: HashMap<TileCoordinate, Entry>,
    queue: PriorityQueue,
    in_flight: usize,
    next_request: u64,
    stats: SchedulerStats,
}

impl<F: TileFetcher> SchedulerState<F> {
    fn new(
        config: SchedulerConfig,
        fetcher: Arc<F>,
        completions: mpsc::UnboundedSender<Completion>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            fetcher,
            completions,
            shutdown,
            entries: HashMap::new(),
            queue: PriorityQueue::new(),
            in_flight: 0,
            next_request: 0,
            stats: SchedulerStats::default(),
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Load {
                coord,
                priority,
                listener,
                completer,
            } => self.load(coord, priority, listener, completer),
            Command::Detach { coord, listener } => self.detach(coord, listener),
            Command::Stats { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::State { coord, reply } => {
                let state = self.entries.get(&coord).map(|entry| entry.request.state());
                let _ = reply.send(state);
            }
        }
    }

    fn load(
        &mut self,
        coord: TileCoordinate,
        priority: Priority,
        listener: ListenerId,
        completer: TileCompleter,
    ) {
        self.stats.requests += 1;

        if completer.is_closed() {
            trace!(tile = %coord, "Caller gone before request was registered");
            return;
        }

        if let Some(entry) = self.entries.get_mut(&coord) {
            if entry.request.state().is_joinable() {
                self.stats.coalesced += 1;
                entry.listeners.push((listener, completer));

                if entry.request.raise_priority(priority)
                    && entry.request.state() == RequestState::Pending
                {
                    self.queue.remove_request(entry.request.id());
                    self.queue.push(coord, entry.request.id(), priority);
                }

                debug!(
                    tile = %coord,
                    request = %entry.request.id(),
                    listeners = entry.listeners.len(),
                    "Joined in-flight request"
                );
                return;
            }
        }

        let id = RequestId(self.next_request);
        self.next_request += 1;

        debug!(tile = %coord, request = %id, priority = %priority, "New request");

        self.entries.insert(
            coord,
            Entry {
                request: TrackedRequest::new(id, coord, priority),
                listeners: vec![(listener, completer)],
                cancel: self.shutdown.child_token(),
            },
        );
        self.queue.push(coord, id, priority);
        self.pump();
    }

    fn detach(&mut self, coord: TileCoordinate, listener: ListenerId) {
        let Some(entry) = self.entries.get_mut(&coord) else {
            return;
        };

        let before = entry.listeners.len();
        entry.listeners.retain(|(id, _)| *id != listener);
        if entry.listeners.len() == before {
            return;
        }
        if !entry.listeners.is_empty() {
            trace!(
                tile = %coord,
                remaining = entry.listeners.len(),
                "Listener detached"
            );
            return;
        }

        if let Some(mut entry) = self.entries.remove(&coord) {
            let was = entry.request.state();
            entry.request.advance(RequestState::Cancelled);
            entry.cancel.cancel();
            self.queue.remove_request(entry.request.id());
            self.stats.cancelled += 1;
            debug!(
                tile = %coord,
                request = %entry.request.id(),
                was = %was,
                "Last listener detached, request cancelled"
            );
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        let Completion {
            coord,
            request,
            report,
        } = completion;

        self.in_flight = self.in_flight.saturating_sub(1);

        if let Some(report) = &report {
            self.stats.retries += u64::from(report.attempts.saturating_sub(1));
        }

        let current = self
            .entries
            .get(&coord)
            .is_some_and(|entry| entry.request.id() == request);

        if !current {
            trace!(tile = %coord, request = %request, "Discarding stale completion");
            self.pump();
            return;
        }

        if let Some(mut entry) = self.entries.remove(&coord) {
            match report {
                Some(report) => {
                    let next = if report.result.is_ok() {
                        self.stats.succeeded += 1;
                        RequestState::Succeeded
                    } else {
                        self.stats.failed += 1;
                        RequestState::Failed
                    };
                    entry.request.advance(next);

                    debug!(
                        tile = %coord,
                        request = %request,
                        state = %next,
                        attempts = report.attempts,
                        listeners = entry.listeners.len(),
                        "Request completed"
                    );

                    for (_, completer) in entry.listeners.drain(..) {
                        completer.complete(report.result.clone());
                    }
                }
                None => {
                    entry.request.advance(RequestState::Cancelled);
                    self.stats.cancelled += 1;
                }
            }
        }

        self.pump();
    }

    /// Dispatches queued requests while concurrency slots are free.
    fn pump(&mut self) {
        while self.in_flight < self.config.max_concurrent {
            let Some(queued) = self.queue.pop() else {
                break;
            };

            let Some(entry) = self.entries.get_mut(&queued.coord) else {
                continue;
            };
            if entry.request.id() != queued.request
                || entry.request.state() != RequestState::Pending
            {
                continue;
            }

            entry.request.advance(RequestState::InFlight);
            self.in_flight += 1;
            self.stats.fetches += 1;

            debug!(
                tile = %queued.coord,
                request = %queued.request,
                priority = %queued.priority,
                wait_ms = queued.wait_time().as_millis() as u64,
                in_flight = self.in_flight,
                "Dispatching fetch"
            );

            let fetcher = Arc::clone(&self.fetcher);
            let retry = self.config.retry.clone();
            let cancel = entry.cancel.clone();
            let completions = self.completions.clone();
            let coord = queued.coord;
            let request = queued.request;

            tokio::spawn(async move {
                let report = fetch_with_retry(fetcher.as_ref(), coord, &retry, &cancel).await;
                let _ = completions.send(Completion {
                    coord,
                    request,
                    report,
                });
            });
        }
    }

    fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            in_flight: self.in_flight,
            queued: self.queue.len(),
            tracked: self.entries.len(),
            ..self.stats
        }
    }

    /// Cancels everything outstanding and drops every listener.
    fn close(&mut self) {
        let outstanding = self.entries.len();
        for (_, mut entry) in self.entries.drain() {
            entry.request.advance(RequestState::Cancelled);
            entry.cancel.cancel();
        }
        self.queue.clear();

        if outstanding > 0 {
            debug!(outstanding, "Cancelled outstanding requests");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
