//! Same-filesystem mover based on `rename(2)`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{FsOpsError, FsOpsResult};
use crate::handler::PathHandler;
use crate::outcome::CopyOutcome;

/// Renames handled paths into a destination on the same filesystem.
#[derive(Debug, Clone)]
pub struct IntraFsMover {
    destination: PathBuf,
}

impl IntraFsMover {
    /// Mover targeting `destination`.
    ///
    /// # Errors
    ///
    /// Returns an error unless `destination` is an existing directory that is
    /// readable, writable, and traversable.
    pub fn new(destination: impl Into<PathBuf>) -> FsOpsResult<Self> {
        let destination = destination.into();
        ensure_accessible_directory(&destination)?;
        Ok(Self { destination })
    }

    /// Directory receiving moved paths.
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }
}

impl PathHandler for IntraFsMover {
    fn handle(&self, path: &Path) -> CopyOutcome {
        let Some(name) = path.file_name() else {
            return CopyOutcome::fatal(format!("{} has no file name", path.display()));
        };
        let target = self.destination.join(name);
        match fs::rename(path, &target) {
            Ok(()) => {
                info!(
                    component = "mover",
                    source = %path.display(),
                    destination = %target.display(),
                    "path moved"
                );
                CopyOutcome::Ok
            }
            Err(err) => {
                warn!(
                    component = "mover",
                    source = %path.display(),
                    destination = %target.display(),
                    error = %err,
                    "rename failed"
                );
                let message = format!("rename to {} failed: {err}", target.display());
                if err.kind() == io::ErrorKind::CrossesDevices {
                    CopyOutcome::FatalError(message)
                } else {
                    CopyOutcome::RetriableError(message)
                }
            }
        }
    }
}

fn ensure_accessible_directory(path: &Path) -> FsOpsResult<()> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(FsOpsError::DestinationInaccessible {
                path: path.to_path_buf(),
                reason: "destination does not exist",
            });
        }
        Err(err) => return Err(FsOpsError::io("mover.stat_destination", path, err)),
    };
    if !metadata.is_dir() {
        return Err(FsOpsError::DestinationInaccessible {
            path: path.to_path_buf(),
            reason: "destination is not a directory",
        });
    }
    check_access(path, &metadata)
}

#[cfg(unix)]
fn check_access(path: &Path, _metadata: &fs::Metadata) -> FsOpsResult<()> {
    use nix::unistd::{AccessFlags, access};

    access(path, AccessFlags::R_OK | AccessFlags::W_OK | AccessFlags::X_OK).map_err(|source| {
        FsOpsError::Nix {
            operation: "mover.access_destination",
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(not(unix))]
fn check_access(path: &Path, metadata: &fs::Metadata) -> FsOpsResult<()> {
    if metadata.permissions().readonly() {
        return Err(FsOpsError::DestinationInaccessible {
            path: path.to_path_buf(),
            reason: "destination is read-only",
        });
    }
    Ok(())
}
