//! Cancellable single-slot holder for a running child process.
//!
//! # Design
//! - The slot is locked only for short `try_wait`/`kill` calls so another
//!   thread can always reach `cancel()` while a wait is in progress.
//! - Output pipes are drained by helper threads to keep the child from
//!   blocking on a full pipe.

use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, ExitStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

const WAIT_POLL: Duration = Duration::from_millis(20);

/// How a waited-for child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Completion {
    /// The child exited on its own.
    Exited(ExitStatus),
    /// The child was killed through [`ProcessSlot::cancel`].
    Cancelled,
}

/// Holds at most one running child so another thread can cancel it.
#[derive(Debug, Default)]
pub struct ProcessSlot {
    child: Mutex<Option<Child>>,
    cancelled: AtomicBool,
}

impl ProcessSlot {
    /// Empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a child is currently held.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lock().is_some()
    }

    /// Kill the held child. Returns `false` when no child is running or the
    /// child already exited on its own; its exit status is then reported
    /// unchanged.
    pub fn cancel(&self) -> bool {
        let mut guard = self.lock();
        let Some(child) = guard.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(Some(_)) => return false,
            Ok(None) => {}
            Err(err) => {
                warn!(pid = child.id(), error = %err, "failed to poll child before kill");
            }
        }
        self.cancelled.store(true, Ordering::SeqCst);
        if let Err(err) = child.kill() {
            warn!(pid = child.id(), error = %err, "failed to kill child process");
        }
        true
    }

    /// Store `child` and wait for it, emptying the slot whatever happens.
    pub(crate) fn run(&self, child: Child) -> io::Result<Completion> {
        self.cancelled.store(false, Ordering::SeqCst);
        *self.lock() = Some(child);
        let result = self.wait();
        let leftover = self.lock().take();
        if let Some(mut child) = leftover {
            let _ = child.kill();
            let _ = child.wait();
        }
        result
    }

    fn wait(&self) -> io::Result<Completion> {
        loop {
            let polled = {
                let mut guard = self.lock();
                match guard.as_mut() {
                    Some(child) => child.try_wait()?,
                    None => return Err(io::Error::other("process slot emptied while waiting")),
                }
            };
            if let Some(status) = polled {
                if self.cancelled.swap(false, Ordering::SeqCst) {
                    return Ok(Completion::Cancelled);
                }
                return Ok(Completion::Exited(status));
            }
            thread::sleep(WAIT_POLL);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Child>> {
        self.child.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Forward each line of `reader` to the log and hand the collected text to `done`.
pub(crate) fn drain<R>(reader: R, stream: &'static str, done: mpsc::Sender<String>)
where
    R: Read + Send + 'static,
{
    let spawned = thread::Builder::new()
        .name(format!("process-{stream}"))
        .spawn(move || {
            let mut collected = String::new();
            for line in BufReader::new(reader).lines() {
                let Ok(line) = line else {
                    break;
                };
                debug!(stream, line = %line, "process output");
                collected.push_str(&line);
                collected.push('\n');
            }
            let _ = done.send(collected);
        });
    if let Err(err) = spawned {
        warn!(stream, error = %err, "failed to spawn output reader");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::{Command, Stdio};
    use std::sync::Arc;

    #[test]
    fn cancel_without_child_returns_false() {
        let slot = ProcessSlot::new();
        assert!(!slot.cancel());
        assert!(!slot.is_running());
    }

    #[test]
    fn exit_status_is_reported_and_slot_cleared() -> anyhow::Result<()> {
        let slot = ProcessSlot::new();
        let child = Command::new("/bin/sh").args(["-c", "exit 3"]).spawn()?;
        let completion = slot.run(child)?;
        assert!(matches!(completion, Completion::Exited(status) if status.code() == Some(3)));
        assert!(!slot.is_running());
        Ok(())
    }

    #[test]
    fn cancel_from_another_thread_kills_child() -> anyhow::Result<()> {
        let slot = Arc::new(ProcessSlot::new());
        let canceller = Arc::clone(&slot);
        let handle = thread::spawn(move || {
            for _ in 0..250 {
                if canceller.cancel() {
                    return true;
                }
                thread::sleep(Duration::from_millis(10));
            }
            false
        });
        let child = Command::new("/bin/sh")
            .args(["-c", "exec sleep 30"])
            .stdout(Stdio::null())
            .spawn()?;
        let completion = slot.run(child)?;
        assert!(handle.join().unwrap_or(false));
        assert_eq!(completion, Completion::Cancelled);
        assert!(!slot.is_running());
        Ok(())
    }

    #[test]
    fn cancel_after_exit_keeps_exit_status() -> anyhow::Result<()> {
        let slot = ProcessSlot::new();
        let child = Command::new("/bin/sh").args(["-c", "exit 4"]).spawn()?;
        *slot.lock() = Some(child);
        thread::sleep(Duration::from_millis(300));

        assert!(!slot.cancel());
        let completion = slot.wait()?;
        assert!(matches!(completion, Completion::Exited(status) if status.code() == Some(4)));
        Ok(())
    }

    #[test]
    fn drain_collects_output() -> anyhow::Result<()> {
        let mut child = Command::new("/bin/sh")
            .args(["-c", "echo one; echo two"])
            .stdout(Stdio::piped())
            .spawn()?;
        let (tx, rx) = mpsc::channel();
        if let Some(stdout) = child.stdout.take() {
            drain(stdout, "stdout", tx);
        }
        child.wait()?;
        let collected = rx.recv_timeout(Duration::from_secs(5))?;
        assert_eq!(collected, "one\ntwo\n");
        Ok(())
    }
}
