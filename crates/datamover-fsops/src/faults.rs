//! Sentinel-backed set of paths that survived handling.
//!
//! # Design
//! - The sentinel file lives inside the watched directory and lists one
//!   absolute path per line.
//! - Membership is keyed by canonical path, falling back to the absolute path
//!   once the entry is gone.
//! - Operators clear faults by editing or deleting the sentinel; a newer mtime
//!   triggers a reload, a missing file empties the set.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::error::{FsOpsError, FsOpsResult};

/// Name of the sentinel file inside the watched directory.
pub const SENTINEL_FILE_NAME: &str = ".faulty_paths";

/// Persistent set of faulty paths owned by one scanner.
#[derive(Debug)]
pub struct FaultTracker {
    sentinel: PathBuf,
    paths: BTreeSet<PathBuf>,
    last_seen: Option<SystemTime>,
}

impl FaultTracker {
    /// Tracker for the sentinel file inside `directory`. No IO is performed.
    #[must_use]
    pub fn new(directory: &Path) -> Self {
        Self {
            sentinel: directory.join(SENTINEL_FILE_NAME),
            paths: BTreeSet::new(),
            last_seen: None,
        }
    }

    /// Location of the sentinel file.
    #[must_use]
    pub fn sentinel_path(&self) -> &Path {
        &self.sentinel
    }

    /// Whether `path` is recorded as faulty.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(&fault_key(path))
    }

    /// Number of recorded paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether no path is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Recorded paths in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }

    /// Forget every fault and remove the sentinel file.
    ///
    /// # Errors
    ///
    /// Returns an error if the sentinel exists but cannot be removed.
    pub fn clear(&mut self) -> FsOpsResult<()> {
        self.paths.clear();
        self.last_seen = None;
        match fs::remove_file(&self.sentinel) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(FsOpsError::io("faults.clear", &self.sentinel, err)),
        }
    }

    /// Re-read the sentinel when it changed on disk since the last read or write.
    ///
    /// Returns `true` when the in-memory set was rebuilt or cleared.
    ///
    /// # Errors
    ///
    /// Returns an error if the sentinel exists but cannot be read.
    pub fn reload_if_changed(&mut self) -> FsOpsResult<bool> {
        let modified = match fs::metadata(&self.sentinel).and_then(|meta| meta.modified()) {
            Ok(modified) => modified,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                let changed = self.last_seen.take().is_some() || !self.paths.is_empty();
                self.paths.clear();
                return Ok(changed);
            }
            Err(err) => return Err(FsOpsError::io("faults.stat", &self.sentinel, err)),
        };
        if self.last_seen.is_some_and(|seen| modified <= seen) {
            return Ok(false);
        }

        let contents = fs::read_to_string(&self.sentinel)
            .map_err(|err| FsOpsError::io("faults.read", &self.sentinel, err))?;
        self.paths = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| fault_key(Path::new(line)))
            .collect();
        self.last_seen = Some(modified);
        debug!(
            sentinel = %self.sentinel.display(),
            count = self.paths.len(),
            "faulty paths reloaded"
        );
        Ok(true)
    }

    /// Record `path` as faulty and rewrite the sentinel.
    ///
    /// Returns `false` when the path was already recorded; the file is then
    /// left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the sentinel cannot be written.
    pub fn record_fault(&mut self, path: &Path) -> FsOpsResult<bool> {
        if !self.paths.insert(fault_key(path)) {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    fn persist(&mut self) -> FsOpsResult<()> {
        let mut contents = String::new();
        for path in &self.paths {
            // A lossy line would name a different path on reload.
            let Some(line) = path.to_str() else {
                warn!(
                    path = %path.display(),
                    "faulty path is not valid UTF-8; kept in memory only"
                );
                continue;
            };
            contents.push_str(line);
            contents.push('\n');
        }
        fs::write(&self.sentinel, contents)
            .map_err(|err| FsOpsError::io("faults.write", &self.sentinel, err))?;
        let modified = fs::metadata(&self.sentinel)
            .and_then(|meta| meta.modified())
            .map_err(|err| FsOpsError::io("faults.stat", &self.sentinel, err))?;
        self.last_seen = Some(modified);
        Ok(())
    }
}

fn fault_key(path: &Path) -> PathBuf {
    fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
