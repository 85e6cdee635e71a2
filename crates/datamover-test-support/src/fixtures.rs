//! Scratch directories, mtime control, and fake copy tools.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use filetime::FileTime;
use tempfile::TempDir;

/// Temporary directory tree removed on drop.
#[derive(Debug)]
pub struct Scratch {
    root: TempDir,
}

impl Scratch {
    /// Create an empty scratch tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary directory cannot be created.
    pub fn new() -> Result<Self> {
        let root = tempfile::Builder::new()
            .prefix("datamover-")
            .tempdir()
            .context("failed to create scratch directory")?;
        Ok(Self { root })
    }

    /// Root of the scratch tree.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Create (or reuse) a directory below the root.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn dir(&self, relative: impl AsRef<Path>) -> Result<PathBuf> {
        let path = self.root.path().join(relative);
        fs::create_dir_all(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        Ok(path)
    }

    /// Write a file below the root, creating parents as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or its parents cannot be written.
    pub fn file(&self, relative: impl AsRef<Path>, contents: &str) -> Result<PathBuf> {
        let path = self.root.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Write a file and pin its modification time to `secs` since the epoch.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or its mtime set.
    pub fn file_with_mtime(
        &self,
        relative: impl AsRef<Path>,
        contents: &str,
        secs: i64,
    ) -> Result<PathBuf> {
        let path = self.file(relative, contents)?;
        set_mtime_secs(&path, secs)?;
        Ok(path)
    }

    /// Write an executable `/bin/sh` script below the root.
    ///
    /// # Errors
    ///
    /// Returns an error if the script cannot be written or made executable.
    pub fn script(&self, name: &str, body: &str) -> Result<PathBuf> {
        let path = self.file(name, &format!("#!/bin/sh\n{body}\n"))?;
        make_executable(&path)?;
        Ok(path)
    }
}

/// Pin the modification time of `path` to `secs` since the epoch.
///
/// # Errors
///
/// Returns an error if the timestamp cannot be applied.
pub fn set_mtime_secs(path: &Path, secs: i64) -> Result<()> {
    filetime::set_file_mtime(path, FileTime::from_unix_time(secs, 0))
        .with_context(|| format!("failed to set mtime of {}", path.display()))
}

/// Returns `true` when `/bin/sh` is present to run fake copy tools.
#[must_use]
pub fn shell_available() -> bool {
    Path::new("/bin/sh").exists()
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("failed to mark {} executable", path.display()))
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
