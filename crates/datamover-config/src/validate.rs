//! Validation helpers and parsing utilities for configuration values.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::defaults::HIGHWATER_DISABLED;
use crate::error::{ConfigError, ConfigResult};

const HIGHWATER_SEPARATOR: char = '>';

/// Directory paired with an optional high water mark, written as `DIR[>KB]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathWithHighwaterMark {
    path: PathBuf,
    highwater_kb: i64,
}

impl PathWithHighwaterMark {
    /// Pair a directory with a threshold in kilobytes; negative disables it.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, highwater_kb: i64) -> Self {
        Self {
            path: path.into(),
            highwater_kb,
        }
    }

    /// Directory part of the value.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Threshold in kilobytes; negative when no mark was given.
    #[must_use]
    pub const fn highwater_kb(&self) -> i64 {
        self.highwater_kb
    }

    /// Whether a high water mark is configured.
    #[must_use]
    pub const fn has_highwater_mark(&self) -> bool {
        self.highwater_kb >= 0
    }
}

impl FromStr for PathWithHighwaterMark {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let (dir, mark) = match trimmed.rsplit_once(HIGHWATER_SEPARATOR) {
            Some((dir, mark)) => (dir.trim(), Some(mark.trim())),
            None => (trimmed, None),
        };
        if dir.is_empty() {
            return Err(ConfigError::invalid(
                "paths",
                "directory",
                value,
                "directory must not be empty",
            ));
        }
        let highwater_kb = match mark {
            None => HIGHWATER_DISABLED,
            Some(raw) => {
                let parsed = raw.parse::<i64>().map_err(|_| {
                    ConfigError::invalid(
                        "paths",
                        "highwater_kb",
                        raw,
                        "high water mark must be an integer number of kilobytes",
                    )
                })?;
                if parsed < 0 {
                    return Err(ConfigError::invalid(
                        "paths",
                        "highwater_kb",
                        raw,
                        "high water mark must not be negative",
                    ));
                }
                parsed
            }
        };
        Ok(Self::new(dir, highwater_kb))
    }
}

impl fmt::Display for PathWithHighwaterMark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_highwater_mark() {
            write!(
                f,
                "{}{HIGHWATER_SEPARATOR}{}",
                self.path.display(),
                self.highwater_kb
            )
        } else {
            write!(f, "{}", self.path.display())
        }
    }
}

pub(crate) fn positive_duration(
    section: &'static str,
    field: &'static str,
    value: u64,
    unit: fn(u64) -> Duration,
) -> ConfigResult<Duration> {
    if value == 0 {
        return Err(ConfigError::invalid(
            section,
            field,
            value.to_string(),
            "must be positive",
        ));
    }
    Ok(unit(value))
}

pub(crate) fn parse_u64(section: &'static str, field: &'static str, raw: &str) -> ConfigResult<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::invalid(section, field, raw, "must be an unsigned integer"))
}

pub(crate) fn parse_bool(section: &'static str, field: &'static str, raw: &str) -> ConfigResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(
            section,
            field,
            raw,
            "must be a boolean flag",
        )),
    }
}
