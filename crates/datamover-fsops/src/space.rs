//! Free-space probes.
//!
//! # Design
//! - `StatvfsFreeSpace` asks the OS; on network mounts the call can hang.
//! - `TimeBoundedFreeSpace` runs any probe on a helper thread and gives up
//!   after a deadline; a hung helper is abandoned, never joined.
//! - At most one helper runs per path. While an abandoned helper is still
//!   stuck, later measurements of that path fail fast instead of piling up
//!   more threads.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

/// Source of free-space measurements in kilobytes.
pub trait FreeSpaceProvider: Send + Sync {
    /// Free space available to unprivileged users at `path`, in kilobytes.
    ///
    /// # Errors
    ///
    /// Returns an error when the measurement cannot be taken.
    fn free_space_kb(&self, path: &Path) -> io::Result<u64>;
}

/// Probe backed by `statvfs(2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatvfsFreeSpace;

impl FreeSpaceProvider for StatvfsFreeSpace {
    #[cfg(unix)]
    #[allow(clippy::useless_conversion)]
    fn free_space_kb(&self, path: &Path) -> io::Result<u64> {
        let stat = nix::sys::statvfs::statvfs(path).map_err(io::Error::from)?;
        let blocks = u64::from(stat.blocks_available());
        let fragment = u64::from(stat.fragment_size());
        Ok(blocks.saturating_mul(fragment) / 1_024)
    }

    #[cfg(not(unix))]
    fn free_space_kb(&self, _path: &Path) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "free space probing requires statvfs",
        ))
    }
}

/// Wrapper bounding the execution time of another probe.
pub struct TimeBoundedFreeSpace {
    inner: Arc<dyn FreeSpaceProvider>,
    timeout: Duration,
    in_flight: Arc<Mutex<Vec<PathBuf>>>,
}

impl std::fmt::Debug for TimeBoundedFreeSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeBoundedFreeSpace")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl TimeBoundedFreeSpace {
    /// Bound `inner` to `timeout` per measurement.
    #[must_use]
    pub fn new(inner: Arc<dyn FreeSpaceProvider>, timeout: Duration) -> Self {
        Self {
            inner,
            timeout,
            in_flight: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Whether a helper for `path` is still running.
    #[must_use]
    pub fn is_in_flight(&self, path: &Path) -> bool {
        lock_in_flight(&self.in_flight)
            .iter()
            .any(|busy| busy == path)
    }
}

fn lock_in_flight(in_flight: &Mutex<Vec<PathBuf>>) -> MutexGuard<'_, Vec<PathBuf>> {
    in_flight.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FreeSpaceProvider for TimeBoundedFreeSpace {
    fn free_space_kb(&self, path: &Path) -> io::Result<u64> {
        let target: PathBuf = path.to_path_buf();
        {
            let mut busy = lock_in_flight(&self.in_flight);
            if busy.contains(&target) {
                return Err(io::Error::new(
                    io::ErrorKind::WouldBlock,
                    "previous free space measurement still running",
                ));
            }
            busy.push(target.clone());
        }

        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let in_flight = Arc::clone(&self.in_flight);
        let spawned = thread::Builder::new()
            .name("free-space-probe".into())
            .spawn({
                let target = target.clone();
                move || {
                    let result = inner.free_space_kb(&target);
                    lock_in_flight(&in_flight).retain(|busy| busy != &target);
                    let _ = tx.send(result);
                }
            });
        if let Err(err) = spawned {
            lock_in_flight(&self.in_flight).retain(|busy| busy != &target);
            return Err(err);
        }
        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "free space probe timed out",
            )),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(io::Error::other("free space probe exited without a result"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed(u64);

    impl FreeSpaceProvider for Fixed {
        fn free_space_kb(&self, _path: &Path) -> io::Result<u64> {
            Ok(self.0)
        }
    }

    struct Hanging;

    impl FreeSpaceProvider for Hanging {
        fn free_space_kb(&self, _path: &Path) -> io::Result<u64> {
            thread::sleep(Duration::from_secs(5));
            Ok(0)
        }
    }

    struct Gated {
        calls: AtomicUsize,
        gate: Mutex<mpsc::Receiver<()>>,
    }

    impl FreeSpaceProvider for Gated {
        fn free_space_kb(&self, _path: &Path) -> io::Result<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _ = self
                .gate
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .recv_timeout(Duration::from_secs(5));
            Ok(7)
        }
    }

    #[cfg(unix)]
    #[test]
    fn statvfs_reports_space_for_existing_directory() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        StatvfsFreeSpace.free_space_kb(dir.path())?;
        assert!(
            StatvfsFreeSpace
                .free_space_kb(&dir.path().join("missing"))
                .is_err()
        );
        Ok(())
    }

    #[test]
    fn bounded_probe_passes_results_through() -> io::Result<()> {
        let probe = TimeBoundedFreeSpace::new(Arc::new(Fixed(42)), Duration::from_secs(1));
        assert_eq!(probe.free_space_kb(Path::new("/"))?, 42);
        Ok(())
    }

    #[test]
    fn bounded_probe_times_out() {
        let probe = TimeBoundedFreeSpace::new(Arc::new(Hanging), Duration::from_millis(20));
        let err = probe.free_space_kb(Path::new("/"));
        assert!(matches!(err, Err(e) if e.kind() == io::ErrorKind::TimedOut));
    }

    #[test]
    fn stuck_helper_blocks_new_measurements_of_same_path() -> io::Result<()> {
        let (release, gate) = mpsc::channel();
        let gated = Arc::new(Gated {
            calls: AtomicUsize::new(0),
            gate: Mutex::new(gate),
        });
        let probe = TimeBoundedFreeSpace::new(gated.clone(), Duration::from_millis(200));
        let path = Path::new("/mnt/slow");

        let first = probe.free_space_kb(path);
        assert!(matches!(first, Err(e) if e.kind() == io::ErrorKind::TimedOut));
        let second = probe.free_space_kb(path);
        assert!(matches!(second, Err(e) if e.kind() == io::ErrorKind::WouldBlock));
        assert_eq!(gated.calls.load(Ordering::SeqCst), 1);
        assert!(probe.is_in_flight(path));

        let _ = release.send(());
        for _ in 0..200 {
            if !probe.is_in_flight(path) {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(!probe.is_in_flight(path));

        let _ = release.send(());
        assert_eq!(probe.free_space_kb(path)?, 7);
        assert_eq!(gated.calls.load(Ordering::SeqCst), 2);
        Ok(())
    }
}
