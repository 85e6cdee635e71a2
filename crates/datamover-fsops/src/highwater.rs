//! Free-space watcher raising transition events around a high water mark.
//!
//! # Design
//! - Two states, above and below; the first sample compares against "above".
//! - Events fire only on transitions and are delivered synchronously on the
//!   sampling thread through a typed broadcast channel, then mirrored on the
//!   shared event bus.
//! - A negative threshold disables sampling entirely.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use datamover_config::PathWithHighwaterMark;
use datamover_events::Event;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::error::{FsOpsError, FsOpsResult};
use crate::retry::RetryPolicy;
use crate::sink::EventSink;
use crate::space::FreeSpaceProvider;

const SUBSCRIBER_CAPACITY: usize = 64;

/// Immutable free-space sample for a watched path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighwaterMarkState {
    path: PathBuf,
    threshold_kb: i64,
    free_space_kb: u64,
}

impl HighwaterMarkState {
    /// Build a sample.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, threshold_kb: i64, free_space_kb: u64) -> Self {
        Self {
            path: path.into(),
            threshold_kb,
            free_space_kb,
        }
    }

    /// Watched path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Threshold in kilobytes; negative when disabled.
    #[must_use]
    pub const fn threshold_kb(&self) -> i64 {
        self.threshold_kb
    }

    /// Measured free space in kilobytes.
    #[must_use]
    pub const fn free_space_kb(&self) -> u64 {
        self.free_space_kb
    }

    /// Whether free space is below an enabled threshold.
    #[must_use]
    pub fn is_below(&self) -> bool {
        u64::try_from(self.threshold_kb).is_ok_and(|threshold| self.free_space_kb < threshold)
    }
}

/// Transition between above and below the high water mark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighwaterMarkEvent {
    state: HighwaterMarkState,
    previously_below: bool,
}

impl HighwaterMarkEvent {
    /// Sample that triggered the transition.
    #[must_use]
    pub const fn state(&self) -> &HighwaterMarkState {
        &self.state
    }

    /// Whether free space is now below the threshold.
    #[must_use]
    pub fn is_below(&self) -> bool {
        self.state.is_below()
    }

    /// State before the transition.
    #[must_use]
    pub const fn previously_below(&self) -> bool {
        self.previously_below
    }
}

/// Samples free space and reports crossings of the high water mark.
pub struct HighwaterMarkWatcher {
    target: Mutex<PathWithHighwaterMark>,
    provider: Arc<dyn FreeSpaceProvider>,
    retry: RetryPolicy,
    last_state: Mutex<Option<HighwaterMarkState>>,
    subscribers: broadcast::Sender<HighwaterMarkEvent>,
    sink: EventSink,
}

impl std::fmt::Debug for HighwaterMarkWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HighwaterMarkWatcher")
            .field("target", &*lock(&self.target))
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl HighwaterMarkWatcher {
    /// Watch `target` using `provider`, retrying failed probes per `retry`.
    #[must_use]
    pub fn new(
        target: PathWithHighwaterMark,
        provider: Arc<dyn FreeSpaceProvider>,
        retry: RetryPolicy,
        sink: EventSink,
    ) -> Self {
        let (subscribers, _) = broadcast::channel(SUBSCRIBER_CAPACITY);
        Self {
            target: Mutex::new(target),
            provider,
            retry,
            last_state: Mutex::new(None),
            subscribers,
            sink,
        }
    }

    /// Receive every future transition event.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<HighwaterMarkEvent> {
        self.subscribers.subscribe()
    }

    /// Last-known state; `false` before the first successful sample.
    #[must_use]
    pub fn is_below(&self) -> bool {
        lock(&self.last_state)
            .as_ref()
            .is_some_and(HighwaterMarkState::is_below)
    }

    /// Most recent sample, if any.
    #[must_use]
    pub fn last_state(&self) -> Option<HighwaterMarkState> {
        lock(&self.last_state).clone()
    }

    /// Currently watched target.
    #[must_use]
    pub fn target(&self) -> PathWithHighwaterMark {
        lock(&self.target).clone()
    }

    /// Repoint the watcher. The last sample stays the comparison baseline.
    pub fn set_path(&self, target: PathWithHighwaterMark) {
        *lock(&self.target) = target;
    }

    /// Repoint the watcher and sample immediately.
    pub fn set_path_and_run(&self, target: PathWithHighwaterMark) {
        self.set_path(target);
        self.run();
    }

    /// Sample once, reporting failures to the sink instead of returning them.
    pub fn run(&self) {
        if let Err(err) = self.try_run() {
            let path = self.target().path().display().to_string();
            error!(
                component = "highwater",
                path = %path,
                error = %err,
                source = ?std::error::Error::source(&err),
                "free space measurement failed"
            );
            self.sink.emit(Event::HighwaterProbeFailed {
                message: render_error(&err),
                path,
            });
        }
    }

    /// Sample once and return the transition event, if one fired.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::FreeSpaceUnavailable`] when every probe attempt failed.
    pub fn try_run(&self) -> FsOpsResult<Option<HighwaterMarkEvent>> {
        let target = self.target();
        if !target.has_highwater_mark() {
            return Ok(None);
        }

        let free_space_kb = self
            .retry
            .run(
                |attempt| {
                    self.provider.free_space_kb(target.path()).inspect_err(|err| {
                        warn!(
                            component = "highwater",
                            path = %target.path().display(),
                            attempt,
                            error = %err,
                            "free space probe failed"
                        );
                    })
                },
                |_| true,
            )
            .map_err(|exhausted| FsOpsError::FreeSpaceUnavailable {
                path: target.path().to_path_buf(),
                attempts: exhausted.attempts,
                source: exhausted.last_error,
            })?;

        let state = HighwaterMarkState::new(target.path(), target.highwater_kb(), free_space_kb);
        let below = state.is_below();
        let previously_below = lock(&self.last_state)
            .replace(state.clone())
            .is_some_and(|previous| previous.is_below());
        self.sink.metrics().set_highwater(below, free_space_kb);

        if below == previously_below {
            return Ok(None);
        }
        if below {
            warn!(
                component = "highwater",
                path = %state.path().display(),
                free_space_kb,
                threshold_kb = state.threshold_kb(),
                "free space dropped below the high water mark"
            );
        } else {
            info!(
                component = "highwater",
                path = %state.path().display(),
                free_space_kb,
                threshold_kb = state.threshold_kb(),
                "free space is above the high water mark again"
            );
        }

        let event = HighwaterMarkEvent {
            state,
            previously_below,
        };
        let _ = self.subscribers.send(event.clone());
        self.sink.emit(Event::HighwaterMarkChanged {
            path: event.state().path().display().to_string(),
            threshold_kb: event.state().threshold_kb(),
            free_space_kb,
            below,
        });
        Ok(Some(event))
    }
}

fn render_error(err: &FsOpsError) -> String {
    match std::error::Error::source(err) {
        Some(source) => format!("{err}: {source}"),
        None => err.to_string(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
