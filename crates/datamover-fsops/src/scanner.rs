//! Polling scanner dispatching directory entries to a path handler.
//!
//! # Design
//! - Entries are handled strictly sequentially, oldest mtime first; ties keep
//!   listing order.
//! - The sentinel file is never handed out; known-faulty paths are skipped
//!   silently until an operator edits or deletes the sentinel.
//! - Whether a path is faulty is decided by its existence after handling, not
//!   by the handler's outcome.
//! - A terminated copy ends the scan after the entry is recorded.
//! - Listing failures are reported once and suppressed while they persist.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use datamover_events::Event;
use tracing::{debug, error, info, warn};

use crate::error::{FsOpsError, FsOpsResult};
use crate::faults::{FaultTracker, SENTINEL_FILE_NAME};
use crate::filter::PathFilter;
use crate::handler::PathHandler;
use crate::outcome::CopyOutcome;
use crate::sink::EventSink;

const HEALTH_COMPONENT: &str = "scanner";

/// Immutable scanner wiring: watched directory, entry filter, and handler.
#[derive(Clone)]
pub struct ScanConfig {
    directory: PathBuf,
    filter: Arc<dyn PathFilter>,
    handler: Arc<dyn PathHandler>,
}

impl std::fmt::Debug for ScanConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanConfig")
            .field("directory", &self.directory)
            .finish_non_exhaustive()
    }
}

impl ScanConfig {
    /// Wire a scanner for `directory`.
    #[must_use]
    pub fn new(
        directory: impl Into<PathBuf>,
        filter: Arc<dyn PathFilter>,
        handler: Arc<dyn PathHandler>,
    ) -> Self {
        Self {
            directory: directory.into(),
            filter,
            handler,
        }
    }

    /// Watched directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

/// What a single scan did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Paths handed to the handler, in dispatch order.
    pub handled: Vec<PathBuf>,
    /// Handled paths that are gone afterwards.
    pub moved: Vec<PathBuf>,
    /// Handled paths that remained and were recorded as faulty.
    pub new_faults: Vec<PathBuf>,
    /// Entries skipped because they were already faulty.
    pub skipped_faulty: usize,
}

impl ScanReport {
    /// Whether the scan found nothing to do.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.handled.is_empty()
    }
}

/// Scans one directory and dispatches its entries.
pub struct DirectoryScanner {
    config: ScanConfig,
    faults: Mutex<FaultTracker>,
    health_degraded: Mutex<bool>,
    sink: EventSink,
}

impl std::fmt::Debug for DirectoryScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryScanner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DirectoryScanner {
    /// Build a scanner, deleting any sentinel left by a previous run.
    ///
    /// # Errors
    ///
    /// Returns an error if a stale sentinel exists but cannot be removed.
    pub fn new(config: ScanConfig, sink: EventSink) -> FsOpsResult<Self> {
        let mut faults = FaultTracker::new(config.directory());
        faults.clear()?;
        Ok(Self {
            config,
            faults: Mutex::new(faults),
            health_degraded: Mutex::new(false),
            sink,
        })
    }

    /// Scanner wiring.
    #[must_use]
    pub const fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Paths currently recorded as faulty.
    #[must_use]
    pub fn faulty_paths(&self) -> Vec<PathBuf> {
        self.lock_faults().paths().map(Path::to_path_buf).collect()
    }

    /// Scan once; failures are reported to the sink and never returned.
    pub fn run(&self) {
        if let Ok(report) = self.scan()
            && !report.is_idle()
        {
            debug!(
                component = HEALTH_COMPONENT,
                handled = report.handled.len(),
                moved = report.moved.len(),
                faulty = report.new_faults.len(),
                "scan finished"
            );
        }
    }

    /// Scan once and describe what happened.
    ///
    /// Every error is also reported to the sink before being returned.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory cannot be listed.
    pub fn scan(&self) -> FsOpsResult<ScanReport> {
        let mut faults = self.lock_faults();
        self.reconcile_faults(&mut faults);

        let entries = match self.list_entries() {
            Ok(entries) => {
                self.mark_recovered();
                entries
            }
            Err(err) => {
                self.mark_degraded(&err);
                return Err(err);
            }
        };

        let mut report = ScanReport::default();
        for path in entries {
            if faults.contains(&path) {
                report.skipped_faulty += 1;
                continue;
            }
            let outcome = self.config.handler.handle(&path);
            self.sink.metrics().inc_path_handled(outcome.label());
            report.handled.push(path.clone());

            if fs::symlink_metadata(&path).is_err() {
                self.sink.emit(Event::PathMoved {
                    path: path.display().to_string(),
                });
                report.moved.push(path);
                continue;
            }
            self.record_fault(&mut faults, &path, &outcome);
            report.new_faults.push(path);
            if outcome.is_terminated() {
                info!(component = HEALTH_COMPONENT, "scan stopped by terminated copy");
                break;
            }
        }
        drop(faults);
        Ok(report)
    }

    fn reconcile_faults(&self, faults: &mut FaultTracker) {
        match faults.reload_if_changed() {
            Ok(true) => {
                info!(
                    component = HEALTH_COMPONENT,
                    sentinel = %faults.sentinel_path().display(),
                    count = faults.len(),
                    "faulty paths reloaded from sentinel"
                );
                self.sink.emit(Event::FaultsReloaded {
                    directory: self.config.directory.display().to_string(),
                    count: faults.len(),
                });
            }
            Ok(false) => {}
            Err(err) => warn!(
                component = HEALTH_COMPONENT,
                sentinel = %faults.sentinel_path().display(),
                error = %err,
                source = ?std::error::Error::source(&err),
                "failed to reload faulty paths"
            ),
        }
    }

    fn list_entries(&self) -> FsOpsResult<Vec<PathBuf>> {
        let directory = self.config.directory();
        let listing =
            fs::read_dir(directory).map_err(|err| FsOpsError::io("scan.list", directory, err))?;
        let mut entries = Vec::new();
        for entry in listing {
            let entry = entry.map_err(|err| FsOpsError::io("scan.list", directory, err))?;
            let path = entry.path();
            if entry.file_name() == SENTINEL_FILE_NAME || !self.config.filter.accept(&path) {
                continue;
            }
            match entry.metadata().and_then(|metadata| metadata.modified()) {
                Ok(modified) => entries.push((modified, path)),
                Err(err) => debug!(
                    component = HEALTH_COMPONENT,
                    path = %path.display(),
                    error = %err,
                    "entry vanished while listing"
                ),
            }
        }
        entries.sort_by_key(|(modified, _)| *modified);
        Ok(entries.into_iter().map(|(_, path)| path).collect())
    }

    fn record_fault(&self, faults: &mut FaultTracker, path: &Path, outcome: &CopyOutcome) {
        let reason = match outcome {
            CopyOutcome::Ok => {
                warn!(
                    component = HEALTH_COMPONENT,
                    path = %path.display(),
                    "handler reported success but the path still exists"
                );
                "handler reported success but the path still exists".to_string()
            }
            CopyOutcome::RetriableError(message) => {
                info!(
                    component = HEALTH_COMPONENT,
                    path = %path.display(),
                    detail = %message,
                    "path could not be handled and is now skipped"
                );
                message.clone()
            }
            CopyOutcome::FatalError(message) => {
                error!(
                    component = HEALTH_COMPONENT,
                    path = %path.display(),
                    detail = %message,
                    "path could not be handled and is now skipped"
                );
                message.clone()
            }
        };

        if let Err(err) = faults.record_fault(path) {
            error!(
                component = HEALTH_COMPONENT,
                sentinel = %faults.sentinel_path().display(),
                error = %err,
                source = ?std::error::Error::source(&err),
                "failed to persist faulty path"
            );
        }
        self.sink.metrics().inc_path_faulty();
        self.sink.emit(Event::PathFaulty {
            path: path.display().to_string(),
            reason,
        });
    }

    fn mark_degraded(&self, err: &FsOpsError) {
        self.sink.metrics().inc_scan_failure();
        let detail = std::error::Error::source(err)
            .map_or_else(|| err.to_string(), |source| format!("{err}: {source}"));
        let mut guard = self.lock_health_flag();
        if *guard {
            drop(guard);
            debug!(
                component = HEALTH_COMPONENT,
                detail = %detail,
                "directory still cannot be listed"
            );
        } else {
            *guard = true;
            drop(guard);
            warn!(
                component = HEALTH_COMPONENT,
                directory = %self.config.directory.display(),
                detail = %detail,
                "directory cannot be listed"
            );
            self.sink.emit(Event::ScanFailed {
                directory: self.config.directory.display().to_string(),
                message: detail,
            });
            self.sink.emit(Event::HealthChanged {
                degraded: vec![HEALTH_COMPONENT.to_string()],
            });
        }
    }

    fn mark_recovered(&self) {
        let mut guard = self.lock_health_flag();
        if std::mem::take(&mut *guard) {
            drop(guard);
            self.sink.emit(Event::HealthChanged { degraded: vec![] });
            info!(
                component = HEALTH_COMPONENT,
                directory = %self.config.directory.display(),
                "directory can be listed again"
            );
        }
    }

    fn lock_faults(&self) -> MutexGuard<'_, FaultTracker> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_health_flag(&self) -> MutexGuard<'_, bool> {
        match self.health_degraded.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("scanner health mutex poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::EntryFilter;
    use datamover_events::EventBus;
    use datamover_telemetry::Metrics;
    use datamover_test_support::{Scratch, set_mtime_secs};

    fn sink() -> anyhow::Result<EventSink> {
        Ok(EventSink::new(EventBus::new(), Metrics::new()?))
    }

    fn recording(calls: Arc<Mutex<Vec<String>>>) -> Arc<dyn PathHandler> {
        Arc::new(move |path: &Path| {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(name);
            match fs::remove_file(path) {
                Ok(()) => CopyOutcome::Ok,
                Err(err) => CopyOutcome::retriable(err.to_string()),
            }
        })
    }

    #[test]
    fn entries_are_handled_oldest_first() -> anyhow::Result<()> {
        let scratch = Scratch::new()?;
        let incoming = scratch.dir("incoming")?;
        scratch.file_with_mtime("incoming/a", "a", 1_000)?;
        scratch.file_with_mtime("incoming/b", "b", 3_000)?;
        scratch.file_with_mtime("incoming/c", "c", 2_000)?;

        let calls = Arc::new(Mutex::new(Vec::new()));
        let scanner = DirectoryScanner::new(
            ScanConfig::new(
                &incoming,
                Arc::new(EntryFilter::accept_all()),
                recording(Arc::clone(&calls)),
            ),
            sink()?,
        )?;
        let report = scanner.scan()?;
        assert_eq!(report.moved.len(), 3);
        assert_eq!(*calls.lock().unwrap_or_else(PoisonError::into_inner), ["a", "c", "b"]);
        Ok(())
    }

    #[test]
    fn construction_deletes_stale_sentinel() -> anyhow::Result<()> {
        let scratch = Scratch::new()?;
        let incoming = scratch.dir("incoming")?;
        let sentinel = scratch.file("incoming/.faulty_paths", "/stale\n")?;
        let _scanner = DirectoryScanner::new(
            ScanConfig::new(
                &incoming,
                Arc::new(EntryFilter::accept_all()),
                Arc::new(|_: &Path| CopyOutcome::Ok),
            ),
            sink()?,
        )?;
        assert!(!sentinel.exists());
        Ok(())
    }

    #[test]
    fn listing_failure_is_reported_once() -> anyhow::Result<()> {
        let scratch = Scratch::new()?;
        let missing = scratch.path().join("missing");
        let sink = sink()?;
        let scanner = DirectoryScanner::new(
            ScanConfig::new(
                &missing,
                Arc::new(EntryFilter::accept_all()),
                Arc::new(|_: &Path| CopyOutcome::Ok),
            ),
            sink.clone(),
        )?;

        assert!(scanner.scan().is_err());
        scanner.run();
        scanner.run();
        let kinds: Vec<_> = sink
            .events()
            .backlog_since(0)
            .into_iter()
            .map(|envelope| envelope.event.kind())
            .collect();
        assert_eq!(kinds, ["scan_failed", "health_changed"]);
        assert_eq!(sink.metrics().snapshot().scan_failures_total, 3);

        fs::create_dir(&missing)?;
        assert!(scanner.scan()?.is_idle());
        let last = sink.events().backlog_since(2);
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].event, Event::HealthChanged { degraded: vec![] });
        Ok(())
    }

    #[test]
    fn success_reported_for_remaining_path_is_recorded_as_fault() -> anyhow::Result<()> {
        let scratch = Scratch::new()?;
        let incoming = scratch.dir("incoming")?;
        let path = scratch.file("incoming/stuck", "x")?;
        set_mtime_secs(&path, 1_000)?;
        let sink = sink()?;
        let scanner = DirectoryScanner::new(
            ScanConfig::new(
                &incoming,
                Arc::new(EntryFilter::accept_all()),
                Arc::new(|_: &Path| CopyOutcome::Ok),
            ),
            sink.clone(),
        )?;

        let report = scanner.scan()?;
        assert_eq!(report.new_faults, vec![path.clone()]);
        assert_eq!(scanner.faulty_paths(), vec![fs::canonicalize(&path)?]);
        assert_eq!(sink.metrics().snapshot().paths_faulty_total, 1);

        let second = scanner.scan()?;
        assert!(second.is_idle());
        assert_eq!(second.skipped_faulty, 1);
        Ok(())
    }

    #[test]
    fn terminated_copy_stops_scan() -> anyhow::Result<()> {
        let scratch = Scratch::new()?;
        let incoming = scratch.dir("incoming")?;
        scratch.file_with_mtime("incoming/a", "a", 1_000)?;
        scratch.file_with_mtime("incoming/b", "b", 2_000)?;

        let calls = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&calls);
        let handler = move |path: &Path| {
            recorded
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(path.to_path_buf());
            CopyOutcome::terminated()
        };
        let scanner = DirectoryScanner::new(
            ScanConfig::new(
                &incoming,
                Arc::new(EntryFilter::accept_all()),
                Arc::new(handler),
            ),
            sink()?,
        )?;

        let report = scanner.scan()?;
        assert_eq!(report.handled, vec![incoming.join("a")]);
        assert_eq!(report.new_faults, vec![incoming.join("a")]);
        assert_eq!(
            *calls.lock().unwrap_or_else(PoisonError::into_inner),
            vec![incoming.join("a")]
        );
        Ok(())
    }
}
