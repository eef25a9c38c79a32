//! Bounded-retry status polling.
//!
//! [`JobPoller::start`] spawns one task that sleeps for the configured
//! interval, awaits the status fetch, classifies the result and repeats.
//! The fetch is awaited inline, so ticks of one poll are strictly
//! sequential and a slow response can never overwrite a later one.
//!
//! Each poll is represented by an owned [`PollHandle`]. A poller keeps at
//! most one active handle: starting a new poll stops (and waits for) the
//! previous one, and dropping the poller stops whatever is still running.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Default delay between two status fetches.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2_000);

/// Default number of consecutive failed fetches before polling is abandoned.
pub const DEFAULT_ERROR_THRESHOLD: u32 = 3;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunable parameters of a poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay before each fetch.
    pub interval: Duration,
    /// Consecutive failures tolerated; the poll fails when this is reached.
    pub error_threshold: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            error_threshold: DEFAULT_ERROR_THRESHOLD,
        }
    }
}

impl From<&atelier_client::ClientConfig> for PollConfig {
    fn from(config: &atelier_client::ClientConfig) -> Self {
        Self {
            interval: config.poll_interval,
            error_threshold: config.poll_error_threshold,
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// How a fetched status should affect the poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollVerdict {
    /// Not finished yet; keep polling.
    Continue,
    /// Finished successfully.
    Done,
    /// Finished, and the remote side reports failure.
    Failed,
}

/// Why a poll ended in [`PollState::Failed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollFailure<T> {
    /// The fetched status itself was a terminal failure.
    Terminal(T),
    /// Too many consecutive fetch errors; the remote outcome is unknown.
    Abandoned { attempts: u32, last_error: String },
}

/// Lifecycle of one poll: `Polling -> {Done, Failed, Stopped}`.
///
/// A poll exists only once started; "no poll yet" is the absence of a
/// [`PollHandle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState<T> {
    Polling {
        /// Most recent non-terminal status, if any fetch succeeded yet.
        last: Option<T>,
        consecutive_errors: u32,
    },
    Done(T),
    Failed(PollFailure<T>),
    Stopped,
}

impl<T> PollState<T> {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Polling { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Failed(_) | Self::Stopped)
    }

    pub fn consecutive_errors(&self) -> u32 {
        match self {
            Self::Polling {
                consecutive_errors, ..
            } => *consecutive_errors,
            Self::Failed(PollFailure::Abandoned { attempts, .. }) => *attempts,
            _ => 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Owned reference to one poll loop.
///
/// Cloning a handle yields another observer of the same poll; any clone
/// may stop it.
pub struct PollHandle<T> {
    id: u64,
    config: PollConfig,
    cancel: CancellationToken,
    state: Arc<watch::Sender<PollState<T>>>,
}

impl<T> Clone for PollHandle<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            config: self.config,
            cancel: self.cancel.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Clone> PollHandle<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> PollConfig {
        self.config
    }

    /// Current state of the poll.
    pub fn state(&self) -> PollState<T> {
        self.state.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        self.state.borrow().is_active()
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.state.borrow().consecutive_errors()
    }

    /// Receive every state change of this poll.
    pub fn subscribe(&self) -> watch::Receiver<PollState<T>> {
        self.state.subscribe()
    }

    /// Stop the poll. Non-terminal states become [`PollState::Stopped`];
    /// terminal states are left as they are. Safe to call repeatedly.
    pub fn stop(&self) {
        self.cancel.cancel();
        let stopped = self.state.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                *state = PollState::Stopped;
                true
            }
        });
        if stopped {
            tracing::debug!(poll_id = self.id, "Poll stopped");
        }
    }

    /// Wait until the poll reaches a terminal state and return it.
    pub async fn finished(&self) -> PollState<T> {
        let mut rx = self.state.subscribe();
        let result = rx.wait_for(|state| state.is_terminal()).await;
        match result {
            Ok(state) => state.clone(),
            // The sender lives in `self`, so the channel cannot close here.
            Err(_) => self.state(),
        }
    }
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

struct ActivePoll<T> {
    handle: PollHandle<T>,
    task: JoinHandle<()>,
}

/// Owner of at most one active poll loop.
pub struct JobPoller<T> {
    active: Option<ActivePoll<T>>,
    next_id: u64,
}

impl<T> Default for JobPoller<T> {
    fn default() -> Self {
        Self {
            active: None,
            next_id: 1,
        }
    }
}

impl<T> JobPoller<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle of the most recently started poll, if any.
    pub fn handle(&self) -> Option<&PollHandle<T>> {
        self.active.as_ref().map(|active| &active.handle)
    }

    /// Start polling.
    ///
    /// Any poll previously started by this poller is stopped and its task
    /// awaited before the new task is spawned, so two loops never overlap.
    pub async fn start<F, Fut, E, C>(
        &mut self,
        fetch_status: F,
        classify: C,
        config: PollConfig,
    ) -> PollHandle<T>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Display + Send + 'static,
        C: Fn(&T) -> PollVerdict + Send + 'static,
    {
        self.stop().await;

        let config = PollConfig {
            error_threshold: config.error_threshold.max(1),
            ..config
        };
        let id = self.next_id;
        self.next_id += 1;

        let (state, _) = watch::channel(PollState::Polling {
            last: None,
            consecutive_errors: 0,
        });
        let handle = PollHandle {
            id,
            config,
            cancel: CancellationToken::new(),
            state: Arc::new(state),
        };

        tracing::debug!(
            poll_id = id,
            interval_ms = config.interval.as_millis() as u64,
            error_threshold = config.error_threshold,
            "Poll started",
        );

        let task = tokio::spawn(run_poll_loop(
            fetch_status,
            classify,
            config,
            handle.cancel.clone(),
            Arc::clone(&handle.state),
            id,
        ));

        self.active = Some(ActivePoll {
            handle: handle.clone(),
            task,
        });
        handle
    }

    /// Stop the active poll (if any) and wait for its task to exit.
    pub async fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.handle.stop();
            if let Err(e) = active.task.await {
                tracing::error!(poll_id = active.handle.id, error = %e, "Poll task panicked");
            }
        }
    }
}

impl<T> Drop for JobPoller<T> {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.handle.cancel.cancel();
            active.handle.state.send_if_modified(|state| {
                if state.is_terminal() {
                    false
                } else {
                    *state = PollState::Stopped;
                    true
                }
            });
        }
    }
}

/// Core poll loop: sleep -> fetch -> classify, until terminal or cancelled.
async fn run_poll_loop<T, F, Fut, E, C>(
    mut fetch_status: F,
    classify: C,
    config: PollConfig,
    cancel: CancellationToken,
    state: Arc<watch::Sender<PollState<T>>>,
    poll_id: u64,
) where
    T: Clone + Send + Sync + 'static,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: Display + Send + 'static,
    C: Fn(&T) -> PollVerdict + Send + 'static,
{
    let mut last: Option<T> = None;
    let mut consecutive_errors = 0u32;
    let mut attempt = 0u32;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(config.interval) => {}
        }

        attempt += 1;
        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            result = fetch_status() => result,
        };

        let next = match result {
            Ok(value) => {
                consecutive_errors = 0;
                match classify(&value) {
                    PollVerdict::Continue => {
                        last = Some(value);
                        PollState::Polling {
                            last: last.clone(),
                            consecutive_errors,
                        }
                    }
                    PollVerdict::Done => {
                        tracing::info!(poll_id, attempt, "Poll finished");
                        PollState::Done(value)
                    }
                    PollVerdict::Failed => {
                        tracing::info!(poll_id, attempt, "Poll finished with remote failure");
                        PollState::Failed(PollFailure::Terminal(value))
                    }
                }
            }
            Err(e) => {
                consecutive_errors += 1;
                if consecutive_errors >= config.error_threshold {
                    tracing::warn!(
                        poll_id,
                        consecutive_errors,
                        error = %e,
                        "Polling abandoned after repeated errors",
                    );
                    PollState::Failed(PollFailure::Abandoned {
                        attempts: consecutive_errors,
                        last_error: e.to_string(),
                    })
                } else {
                    tracing::warn!(
                        poll_id,
                        consecutive_errors,
                        threshold = config.error_threshold,
                        error = %e,
                        "Status fetch failed, will retry",
                    );
                    PollState::Polling {
                        last: last.clone(),
                        consecutive_errors,
                    }
                }
            }
        };

        let terminal = next.is_terminal();
        // Only a still-running poll may be advanced; a concurrent stop wins.
        let applied = state.send_if_modified(|current| {
            if current.is_active() {
                *current = next;
                true
            } else {
                false
            }
        });

        if terminal || !applied {
            return;
        }
    }
}
