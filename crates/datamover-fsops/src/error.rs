//! # Design
//!
//! - Constant messages; paths, executables, and attempt counts travel as fields.
//! - Setup failures (destination, copy tool) are distinct variants so the
//!   binary can report them before scheduling starts.
//! - Per-entry copy failures are not errors; they are `CopyOutcome`s.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for datamover filesystem operations.
pub type FsOpsResult<T> = Result<T, FsOpsError>;

/// Errors produced by the datamover core.
#[derive(Debug, Error)]
pub enum FsOpsError {
    /// Filesystem call failed.
    #[error("filesystem operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path the call was made on.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// An exclude pattern did not compile.
    #[error("invalid exclude pattern")]
    Glob {
        /// Operation identifier.
        operation: &'static str,
        /// Offending pattern.
        pattern: String,
        /// Underlying globset error.
        source: globset::Error,
    },
    /// A permission probe failed.
    #[cfg(unix)]
    #[error("access check failed")]
    Nix {
        /// Operation identifier.
        operation: &'static str,
        /// Path that was probed.
        path: PathBuf,
        /// Underlying errno.
        source: nix::Error,
    },
    /// Destination directory cannot be used by a mover.
    #[error("destination directory is not accessible")]
    DestinationInaccessible {
        /// Offending destination.
        path: PathBuf,
        /// Static reason for the failure.
        reason: &'static str,
    },
    /// Free space could not be measured within the retry budget.
    #[error("free space is unavailable")]
    FreeSpaceUnavailable {
        /// Path whose free space was probed.
        path: PathBuf,
        /// Number of attempts made.
        attempts: u32,
        /// Error from the last attempt.
        source: io::Error,
    },
    /// The copy tool does not exist.
    #[error("copy executable does not exist")]
    CopierMissing {
        /// Executable that could not be launched.
        executable: PathBuf,
        /// Launch error.
        source: io::Error,
    },
    /// The copy tool exists but does not behave as expected.
    #[error("copy executable is invalid")]
    CopierInvalid {
        /// Executable that failed the self-test.
        executable: PathBuf,
        /// Static reason for the failure.
        reason: &'static str,
        /// Output captured during the self-test, when any.
        output: Option<String>,
    },
}

impl FsOpsError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) const fn glob(
        operation: &'static str,
        pattern: String,
        source: globset::Error,
    ) -> Self {
        Self::Glob {
            operation,
            pattern,
            source,
        }
    }
}
