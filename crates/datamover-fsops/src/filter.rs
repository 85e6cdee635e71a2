//! Entry filters applied while listing the watched directory.

use std::path::Path;

use datamover_config::FilterConfig;
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::{FsOpsError, FsOpsResult};

/// Predicate deciding which directory entries are handed to the handler.
pub trait PathFilter: Send + Sync {
    /// Whether `path` should be scanned.
    fn accept(&self, path: &Path) -> bool;
}

impl<F> PathFilter for F
where
    F: Fn(&Path) -> bool + Send + Sync,
{
    fn accept(&self, path: &Path) -> bool {
        self(path)
    }
}

/// Name-based filter: hidden-entry exclusion plus glob exclusions.
#[derive(Debug, Clone)]
pub struct EntryFilter {
    include_hidden: bool,
    exclude: GlobSet,
}

impl EntryFilter {
    /// Filter accepting every entry.
    #[must_use]
    pub fn accept_all() -> Self {
        Self {
            include_hidden: true,
            exclude: GlobSet::empty(),
        }
    }

    /// Compile a filter from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if an exclusion pattern is not a valid glob.
    pub fn from_config(config: &FilterConfig) -> FsOpsResult<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &config.exclude {
            let glob = Glob::new(pattern)
                .map_err(|source| FsOpsError::glob("filter.compile", pattern.clone(), source))?;
            builder.add(glob);
        }
        let exclude = builder
            .build()
            .map_err(|source| FsOpsError::glob("filter.build", config.exclude.join(","), source))?;
        Ok(Self {
            include_hidden: config.include_hidden,
            exclude,
        })
    }
}

impl PathFilter for EntryFilter {
    fn accept(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        if !self.include_hidden && name.to_string_lossy().starts_with('.') {
            return false;
        }
        !self.exclude.is_match(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_entries_are_skipped_by_default() -> FsOpsResult<()> {
        let filter = EntryFilter::from_config(&FilterConfig::default())?;
        assert!(filter.accept(Path::new("/in/data.txt")));
        assert!(!filter.accept(Path::new("/in/.partial")));
        assert!(EntryFilter::accept_all().accept(Path::new("/in/.partial")));
        Ok(())
    }

    #[test]
    fn exclusion_globs_match_entry_names() -> FsOpsResult<()> {
        let filter = EntryFilter::from_config(&FilterConfig {
            include_hidden: true,
            exclude: vec!["*.tmp".into(), "lock-*".into()],
        })?;
        assert!(!filter.accept(Path::new("/in/upload.tmp")));
        assert!(!filter.accept(Path::new("/in/lock-42")));
        assert!(filter.accept(Path::new("/in/.hidden")));
        assert!(filter.accept(Path::new("/in/tmp/data")));
        Ok(())
    }

    #[test]
    fn invalid_glob_is_rejected() {
        let result = EntryFilter::from_config(&FilterConfig {
            include_hidden: false,
            exclude: vec!["[".into()],
        });
        assert!(matches!(result, Err(FsOpsError::Glob { .. })));
    }
}
