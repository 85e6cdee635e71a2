//! External copy tool driven as a child process.
//!
//! # Design
//! - Invocation: `<tool> <source> <target> /E /I /Q /H /R /K /O /X /Y`. File
//!   sources target the destination directory, directory sources target
//!   `destination/name`, so the tool never asks whether the target is a file.
//! - The source mtime is bumped before copying and restored afterwards on
//!   both sides by a drop guard, whatever the outcome.
//! - Exit code 0 is success, any other exit is retriable, a launch failure is
//!   fatal. `terminate()` and interrupted waits yield retriable outcomes.
//! - Only `check()` uses a watchdog; copies are cancelled with `terminate()`.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use datamover_config::CopierConfig;
use datamover_events::Event;
use filetime::FileTime;
use tracing::{debug, error, info, warn};

use crate::error::{FsOpsError, FsOpsResult};
use crate::handler::PathHandler;
use crate::outcome::CopyOutcome;
use crate::process::{Completion, ProcessSlot, drain};
use crate::sink::EventSink;

const COPY_FLAGS: [&str; 9] = ["/E", "/I", "/Q", "/H", "/R", "/K", "/O", "/X", "/Y"];
const HELP_FLAG: &str = "/?";
const OUTPUT_GRACE: Duration = Duration::from_secs(1);

/// Copies paths with an external tool; one copy at a time per instance.
#[derive(Debug)]
pub struct ProcessCopier {
    executable: PathBuf,
    destination: PathBuf,
    overwrite_supported: bool,
    check_timeout: Duration,
    expected_help_output: String,
    slot: ProcessSlot,
    sink: EventSink,
}

impl ProcessCopier {
    /// Copier using `config` whose handler target is `destination`.
    #[must_use]
    pub fn new(config: &CopierConfig, destination: impl Into<PathBuf>, sink: EventSink) -> Self {
        Self {
            executable: config.executable.clone(),
            destination: destination.into(),
            overwrite_supported: config.overwrite_supported,
            check_timeout: Duration::from_millis(config.check_timeout_ms),
            expected_help_output: config.expected_help_output.clone(),
            slot: ProcessSlot::new(),
            sink,
        }
    }

    /// Directory used when the copier acts as a [`PathHandler`].
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Copy `source` into `destination_dir`, blocking until the tool exits.
    pub fn copy(&self, source: &Path, destination_dir: &Path) -> CopyOutcome {
        let Some(name) = source.file_name() else {
            return CopyOutcome::fatal(format!("{} has no file name", source.display()));
        };
        let copied = destination_dir.join(name);
        let outcome = self.copy_to(source, destination_dir, &copied);
        match &outcome {
            CopyOutcome::Ok => info!(
                component = "copier",
                source = %source.display(),
                destination = %copied.display(),
                "copy finished"
            ),
            CopyOutcome::RetriableError(message) => warn!(
                component = "copier",
                source = %source.display(),
                destination = %copied.display(),
                detail = %message,
                "copy failed, will retry"
            ),
            CopyOutcome::FatalError(message) => error!(
                component = "copier",
                source = %source.display(),
                destination = %copied.display(),
                detail = %message,
                "copy failed"
            ),
        }
        self.sink.emit(Event::CopyFinished {
            source: source.display().to_string(),
            destination: copied.display().to_string(),
            outcome: outcome.label().to_string(),
            message: outcome.message().map(str::to_string),
        });
        outcome
    }

    /// Whether a copy is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.slot.is_running()
    }

    /// Kill the running copy. Returns `false` when no copy is running.
    pub fn terminate(&self) -> bool {
        let killed = self.slot.cancel();
        if killed {
            info!(component = "copier", "running copy terminated");
        }
        killed
    }

    /// Run the tool's help under a watchdog and look for the expected output.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::CopierMissing`] when the tool cannot be found and
    /// [`FsOpsError::CopierInvalid`] when it exists but misbehaves.
    pub fn check(&self) -> FsOpsResult<()> {
        debug!(component = "copier", executable = %self.executable.display(), "testing copy executable");
        let mut command = Command::new(&self.executable);
        command
            .arg(HELP_FLAG)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(source) if source.kind() == io::ErrorKind::NotFound => {
                return Err(FsOpsError::CopierMissing {
                    executable: self.executable.clone(),
                    source,
                });
            }
            Err(_) => return Err(self.invalid("executable cannot be launched", None)),
        };

        let (output_tx, output_rx) = mpsc::channel();
        let mut readers = 0;
        if let Some(stdout) = child.stdout.take() {
            drain(stdout, "stdout", output_tx.clone());
            readers += 1;
        }
        if let Some(stderr) = child.stderr.take() {
            drain(stderr, "stderr", output_tx);
            readers += 1;
        }

        let slot = Arc::new(ProcessSlot::new());
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let watchdog_slot = Arc::clone(&slot);
        let timeout = self.check_timeout;
        let watchdog = thread::Builder::new()
            .name("copier-check-watchdog".into())
            .spawn(move || {
                if matches!(stop_rx.recv_timeout(timeout), Err(mpsc::RecvTimeoutError::Timeout)) {
                    watchdog_slot.cancel();
                }
            });
        if watchdog.is_err() {
            let _ = child.kill();
            let _ = child.wait();
            return Err(self.invalid("watchdog cannot be started", None));
        }

        let completion = slot.run(child);
        drop(stop_tx);

        let mut output = String::new();
        for _ in 0..readers {
            match output_rx.recv_timeout(OUTPUT_GRACE) {
                Ok(chunk) => output.push_str(&chunk),
                Err(_) => break,
            }
        }
        let output = Some(output).filter(|text| !text.trim().is_empty());

        match completion {
            Ok(Completion::Cancelled) => Err(self.invalid("help output timed out", output)),
            Err(_) => Err(self.invalid("waiting for the executable failed", output)),
            Ok(Completion::Exited(_)) => {
                if output
                    .as_deref()
                    .is_some_and(|text| text.contains(&self.expected_help_output))
                {
                    info!(
                        component = "copier",
                        executable = %self.executable.display(),
                        overwrite = self.overwrite_supported,
                        "copy executable verified"
                    );
                    Ok(())
                } else {
                    Err(self.invalid("unexpected help output", output))
                }
            }
        }
    }

    fn invalid(&self, reason: &'static str, output: Option<String>) -> FsOpsError {
        FsOpsError::CopierInvalid {
            executable: self.executable.clone(),
            reason,
            output,
        }
    }

    fn copy_to(&self, source: &Path, destination_dir: &Path, copied: &Path) -> CopyOutcome {
        if !self.overwrite_supported
            && let Err(err) = remove_existing(copied)
        {
            return CopyOutcome::retriable(format!(
                "cannot remove existing {}: {err}",
                copied.display()
            ));
        }

        let metadata = match fs::metadata(source) {
            Ok(metadata) => metadata,
            Err(err) => {
                return CopyOutcome::retriable(format!("cannot stat {}: {err}", source.display()));
            }
        };
        let original = FileTime::from_last_modification_time(&metadata);
        if let Err(err) = filetime::set_file_mtime(source, FileTime::now()) {
            return CopyOutcome::retriable(format!(
                "cannot touch {}: {err}",
                source.display()
            ));
        }
        let _restore = MtimeGuard {
            source,
            copied,
            original,
        };

        let target = if metadata.is_dir() {
            copied
        } else {
            destination_dir
        };
        self.run_tool(source, target)
    }

    fn run_tool(&self, source: &Path, target: &Path) -> CopyOutcome {
        let mut command = Command::new(&self.executable);
        command
            .arg(native_path(source))
            .arg(native_path(target))
            .args(COPY_FLAGS)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                return CopyOutcome::fatal(format!(
                    "cannot launch {}: {err}",
                    self.executable.display()
                ));
            }
        };

        let (output_tx, _output_rx) = mpsc::channel();
        if let Some(stdout) = child.stdout.take() {
            drain(stdout, "stdout", output_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            drain(stderr, "stderr", output_tx);
        }

        match self.slot.run(child) {
            Ok(Completion::Cancelled) => CopyOutcome::terminated(),
            Ok(Completion::Exited(status)) if status.success() => CopyOutcome::Ok,
            Ok(Completion::Exited(status)) => match status.code() {
                Some(code) => CopyOutcome::retriable(format!("copy tool exited with code {code}")),
                None => CopyOutcome::retriable("copy tool was killed by a signal"),
            },
            Err(err) if err.kind() == io::ErrorKind::Interrupted => CopyOutcome::interrupted(),
            Err(err) => CopyOutcome::retriable(format!("waiting for the copy tool failed: {err}")),
        }
    }
}

impl PathHandler for ProcessCopier {
    fn handle(&self, path: &Path) -> CopyOutcome {
        let outcome = self.copy(path, &self.destination);
        if !outcome.is_ok() {
            return outcome;
        }
        match remove_existing(path) {
            Ok(()) => outcome,
            Err(err) => CopyOutcome::retriable(format!(
                "copied but cannot remove {}: {err}",
                path.display()
            )),
        }
    }
}

struct MtimeGuard<'a> {
    source: &'a Path,
    copied: &'a Path,
    original: FileTime,
}

impl Drop for MtimeGuard<'_> {
    fn drop(&mut self) {
        for path in [self.source, self.copied] {
            if fs::symlink_metadata(path).is_err() {
                continue;
            }
            if let Err(err) = filetime::set_file_mtime(path, self.original) {
                warn!(
                    component = "copier",
                    path = %path.display(),
                    error = %err,
                    "failed to restore modification time"
                );
            }
        }
    }
}

fn remove_existing(path: &Path) -> io::Result<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(err) => Err(err),
    };
    match result {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(windows)]
fn native_path(path: &Path) -> OsString {
    OsString::from(path.to_string_lossy().replace('/', "\\"))
}

#[cfg(not(windows))]
fn native_path(path: &Path) -> OsString {
    path.as_os_str().to_os_string()
}
