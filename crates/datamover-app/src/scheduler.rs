//! Interval loops driving the scanner and the high water mark watcher.
//!
//! # Design
//! - Each component has its own ticker. The watcher samples on a spawned task
//!   so a long scan never delays it; scans run on the scheduler task.
//! - Both components are synchronous; each tick runs them on the blocking pool
//!   and waits, so ticks of one kind never overlap.
//! - When pausing is enabled the watcher publishes the pause flag through a
//!   `watch` channel and the scan tick is disabled while it is set.
//! - A panicking tick is logged and reported as a failure event; the next
//!   tick runs as usual. Only the shutdown future ends the loop.
//! - Shutdown during a scan terminates the running copy and waits for the scan
//!   to return before leaving the loop.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use datamover_config::DatamoverConfig;
use datamover_events::Event;
use datamover_fsops::{
    DirectoryScanner, EventSink, HighwaterMarkEvent, HighwaterMarkWatcher, ProcessCopier,
};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::bootstrap::Services;
use crate::error::{AppError, AppResult};

const TERMINATE_RETRY: Duration = Duration::from_millis(20);

/// Periodic driver for one scanner and one watcher.
#[derive(Debug, Clone)]
pub struct Scheduler {
    scanner: Arc<DirectoryScanner>,
    watcher: Arc<HighwaterMarkWatcher>,
    copier: Option<Arc<ProcessCopier>>,
    sink: EventSink,
    check_interval: Duration,
    highwater_interval: Duration,
    pause_on_highwater: bool,
}

impl Scheduler {
    /// Schedule `services` with explicit intervals.
    #[must_use]
    pub fn new(
        services: &Services,
        check_interval: Duration,
        highwater_interval: Duration,
        pause_on_highwater: bool,
    ) -> Self {
        Self {
            scanner: Arc::clone(&services.scanner),
            watcher: Arc::clone(&services.watcher),
            copier: services.copier.clone(),
            sink: services.sink.clone(),
            check_interval,
            highwater_interval,
            pause_on_highwater,
        }
    }

    /// Schedule `services` with the intervals from `config`.
    #[must_use]
    pub fn from_services(services: &Services, config: &DatamoverConfig) -> Self {
        Self::new(
            services,
            config.check_interval,
            config.highwater_interval,
            config.pause_on_highwater,
        )
    }

    /// Tick until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns the error of a failed `shutdown` future.
    pub async fn run_until<F>(&self, shutdown: F) -> AppResult<()>
    where
        F: Future<Output = AppResult<()>>,
    {
        tokio::pin!(shutdown);
        info!(
            check_interval_ms = duration_ms(self.check_interval),
            highwater_interval_ms = duration_ms(self.highwater_interval),
            pause_on_highwater = self.pause_on_highwater,
            "scheduler started"
        );

        let ticker = self.watcher_ticker();
        let mut highwater_events = self.watcher.subscribe();
        // First sample before the first scan so a full destination pauses it.
        ticker.sample().await;
        log_transitions(&mut highwater_events, self.pause_on_highwater);
        let (pause_tx, mut pause_rx) = watch::channel(ticker.scanning_paused());
        let mut paused = *pause_rx.borrow_and_update();
        let mut pause_open = true;
        let watcher_task = tokio::spawn(ticker.run(highwater_events, pause_tx));

        let mut scan_tick = time::interval(self.check_interval);
        scan_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                biased;
                signal = shutdown.as_mut() => {
                    info!("shutdown requested");
                    break signal;
                }
                changed = pause_rx.changed(), if pause_open => {
                    if changed.is_ok() {
                        paused = *pause_rx.borrow_and_update();
                    } else {
                        warn!("high water mark ticker stopped; scanning stays enabled");
                        pause_open = false;
                        paused = false;
                    }
                }
                _ = scan_tick.tick(), if !paused => {
                    if let Some(signal) = self.scan(shutdown.as_mut()).await {
                        break signal;
                    }
                }
            }
        };

        watcher_task.abort();
        if let Err(err) = watcher_task.await
            && err.is_panic()
        {
            error!(error = %err, "high water mark ticker panicked");
        }
        info!("scheduler stopped");
        result
    }

    fn watcher_ticker(&self) -> WatcherTicker {
        WatcherTicker {
            watcher: Arc::clone(&self.watcher),
            sink: self.sink.clone(),
            interval: self.highwater_interval,
            pause_on_highwater: self.pause_on_highwater,
        }
    }

    /// Run one scan. Returns the shutdown result when shutdown arrived meanwhile.
    async fn scan<F>(&self, shutdown: Pin<&mut F>) -> Option<AppResult<()>>
    where
        F: Future<Output = AppResult<()>>,
    {
        let scanner = Arc::clone(&self.scanner);
        let mut task = tokio::task::spawn_blocking(move || scanner.run());
        tokio::select! {
            biased;
            joined = &mut task => {
                self.report_scan_panic(joined);
                None
            }
            signal = shutdown => {
                info!("shutdown requested during scan");
                self.stop_scan(task).await;
                Some(signal)
            }
        }
    }

    async fn stop_scan(&self, task: JoinHandle<()>) {
        if let Some(copier) = &self.copier {
            while !task.is_finished() {
                copier.terminate();
                time::sleep(TERMINATE_RETRY).await;
            }
        }
        self.report_scan_panic(task.await);
    }

    fn report_scan_panic(&self, joined: Result<(), JoinError>) {
        let Err(source) = joined else {
            return;
        };
        let err = AppError::join("scheduler.scan", source);
        let directory = self.scanner.config().directory().display().to_string();
        error!(
            directory = %directory,
            error = %err,
            source = ?std::error::Error::source(&err),
            "scan panicked"
        );
        self.sink.metrics().inc_scan_failure();
        self.sink.emit(Event::ScanFailed {
            directory,
            message: render_error(&err),
        });
    }
}

/// Free-space sampling loop owned by the spawned watcher task.
struct WatcherTicker {
    watcher: Arc<HighwaterMarkWatcher>,
    sink: EventSink,
    interval: Duration,
    pause_on_highwater: bool,
}

impl WatcherTicker {
    async fn run(
        self,
        mut events: broadcast::Receiver<HighwaterMarkEvent>,
        paused: watch::Sender<bool>,
    ) {
        let mut tick = time::interval_at(Instant::now() + self.interval, self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            self.sample().await;
            log_transitions(&mut events, self.pause_on_highwater);
            let next = self.scanning_paused();
            paused.send_if_modified(|current| {
                let changed = *current != next;
                *current = next;
                changed
            });
        }
    }

    async fn sample(&self) {
        let watcher = Arc::clone(&self.watcher);
        let Err(source) = tokio::task::spawn_blocking(move || watcher.run()).await else {
            return;
        };
        let err = AppError::join("scheduler.highwater", source);
        let path = self.watcher.target().path().display().to_string();
        error!(
            path = %path,
            error = %err,
            source = ?std::error::Error::source(&err),
            "free space sampling panicked"
        );
        self.sink.emit(Event::HighwaterProbeFailed {
            path,
            message: render_error(&err),
        });
    }

    fn scanning_paused(&self) -> bool {
        self.pause_on_highwater && self.watcher.is_below()
    }
}

fn log_transitions(
    events: &mut broadcast::Receiver<HighwaterMarkEvent>,
    pause_on_highwater: bool,
) {
    loop {
        match events.try_recv() {
            Ok(event) => info!(
                free_space_kb = event.state().free_space_kb(),
                threshold_kb = event.state().threshold_kb(),
                below = event.is_below(),
                scanning_paused = pause_on_highwater && event.is_below(),
                "high water mark crossed"
            ),
            Err(TryRecvError::Lagged(skipped)) => {
                warn!(skipped, "high water mark events lagged");
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
}

fn render_error(err: &AppError) -> String {
    match std::error::Error::source(err) {
        Some(source) => format!("{err}: {source}"),
        None => err.to_string(),
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
