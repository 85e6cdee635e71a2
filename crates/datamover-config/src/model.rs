//! Typed configuration models.
//!
//! # Design
//! - `RawConfig` mirrors the YAML document and environment overlay verbatim.
//! - `DatamoverConfig` is the validated form handed to the services.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{ConfigError, ConfigResult};
use crate::validate::{PathWithHighwaterMark, positive_duration};

/// Strategy used to move paths out of the incoming directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MoverKind {
    /// Atomic rename within one filesystem.
    #[default]
    Rename,
    /// External copy process followed by removal of the source.
    Process,
}

impl MoverKind {
    /// Render the kind as its lowercase configuration spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rename => "rename",
            Self::Process => "process",
        }
    }
}

impl FromStr for MoverKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "rename" => Ok(Self::Rename),
            "process" => Ok(Self::Process),
            other => Err(ConfigError::invalid(
                "mover",
                "kind",
                other,
                "expected `rename` or `process`",
            )),
        }
    }
}

/// Settings for the external copy process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CopierConfig {
    /// Copy tool executable name or path.
    pub executable: PathBuf,
    /// Whether the destination filesystem tolerates overwriting in place.
    pub overwrite_supported: bool,
    /// Watchdog for the self-test invocation, in milliseconds.
    pub check_timeout_ms: u64,
    /// Substring the help output must contain.
    pub expected_help_output: String,
}

impl Default for CopierConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from(defaults::COPIER_EXECUTABLE),
            overwrite_supported: true,
            check_timeout_ms: defaults::COPIER_CHECK_TIMEOUT_MS,
            expected_help_output: defaults::COPIER_EXPECTED_HELP_OUTPUT.to_string(),
        }
    }
}

/// Retry settings for free-space probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    /// Number of probe attempts before giving up.
    pub attempts: u32,
    /// Delay between attempts in milliseconds.
    pub delay_ms: u64,
    /// Upper bound for a single probe in milliseconds.
    pub probe_timeout_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: defaults::HIGHWATER_RETRY_ATTEMPTS,
            delay_ms: defaults::HIGHWATER_RETRY_DELAY_MS,
            probe_timeout_ms: defaults::HIGHWATER_PROBE_TIMEOUT_MS,
        }
    }
}

/// Entry filter settings for the scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct FilterConfig {
    /// Whether entries whose name starts with a dot are scanned.
    pub include_hidden: bool,
    /// Glob patterns matched against entry names; matches are skipped.
    pub exclude: Vec<String>,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    /// Log level used when `RUST_LOG` is unset.
    pub level: String,
    /// Output format (`json` or `pretty`); inferred from the build when unset.
    pub format: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            format: None,
        }
    }
}

/// Configuration document as written by operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawConfig {
    /// Directory watched for new paths.
    pub incoming: Option<String>,
    /// Destination directory, optionally suffixed with `>KB`.
    pub destination: Option<String>,
    /// Mover strategy.
    pub mover: MoverKind,
    /// External copier settings.
    pub copier: CopierConfig,
    /// Seconds between two scans.
    pub check_interval_secs: u64,
    /// Seconds between two free-space samples.
    pub highwater_interval_secs: u64,
    /// Free-space retry settings.
    pub highwater_retry: RetrySettings,
    /// Entry filter.
    pub filter: FilterConfig,
    /// Pause scanning while the destination is below its high water mark.
    pub pause_on_highwater: bool,
    /// Logging settings.
    pub logging: LoggingSettings,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            incoming: None,
            destination: None,
            mover: MoverKind::default(),
            copier: CopierConfig::default(),
            check_interval_secs: defaults::CHECK_INTERVAL_SECS,
            highwater_interval_secs: defaults::HIGHWATER_INTERVAL_SECS,
            highwater_retry: RetrySettings::default(),
            filter: FilterConfig::default(),
            pause_on_highwater: true,
            logging: LoggingSettings::default(),
        }
    }
}

/// Validated datamover configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatamoverConfig {
    /// Directory watched for new paths.
    pub incoming: PathBuf,
    /// Destination directory and its high water mark.
    pub destination: PathWithHighwaterMark,
    /// Mover strategy.
    pub mover: MoverKind,
    /// External copier settings.
    pub copier: CopierConfig,
    /// Interval between two scans.
    pub check_interval: Duration,
    /// Interval between two free-space samples.
    pub highwater_interval: Duration,
    /// Free-space retry settings.
    pub highwater_retry: RetrySettings,
    /// Entry filter.
    pub filter: FilterConfig,
    /// Pause scanning while the destination is below its high water mark.
    pub pause_on_highwater: bool,
    /// Logging settings.
    pub logging: LoggingSettings,
}

impl DatamoverConfig {
    /// Watchdog applied to the copier self-test.
    #[must_use]
    pub const fn copier_check_timeout(&self) -> Duration {
        Duration::from_millis(self.copier.check_timeout_ms)
    }
}

impl TryFrom<RawConfig> for DatamoverConfig {
    type Error = ConfigError;

    fn try_from(raw: RawConfig) -> ConfigResult<Self> {
        let incoming = raw
            .incoming
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .ok_or(ConfigError::MissingField {
                section: "paths",
                field: "incoming",
            })?;
        let destination = raw
            .destination
            .as_deref()
            .ok_or(ConfigError::MissingField {
                section: "paths",
                field: "destination",
            })?
            .parse::<PathWithHighwaterMark>()?;
        if destination.path() == incoming {
            return Err(ConfigError::invalid(
                "paths",
                "destination",
                destination.to_string(),
                "destination must differ from the incoming directory",
            ));
        }

        let check_interval = positive_duration(
            "scan",
            "check_interval_secs",
            raw.check_interval_secs,
            Duration::from_secs,
        )?;
        let highwater_interval = positive_duration(
            "highwater",
            "highwater_interval_secs",
            raw.highwater_interval_secs,
            Duration::from_secs,
        )?;
        if raw.highwater_retry.attempts == 0 {
            return Err(ConfigError::invalid(
                "highwater",
                "highwater_retry.attempts",
                "0",
                "must be positive",
            ));
        }
        positive_duration(
            "highwater",
            "highwater_retry.probe_timeout_ms",
            raw.highwater_retry.probe_timeout_ms,
            Duration::from_millis,
        )?;
        positive_duration(
            "copier",
            "copier.check_timeout_ms",
            raw.copier.check_timeout_ms,
            Duration::from_millis,
        )?;
        if raw.copier.executable.as_os_str().is_empty() {
            return Err(ConfigError::invalid(
                "copier",
                "copier.executable",
                "",
                "executable must not be empty",
            ));
        }

        Ok(Self {
            incoming,
            destination,
            mover: raw.mover,
            copier: raw.copier,
            check_interval,
            highwater_interval,
            highwater_retry: raw.highwater_retry,
            filter: raw.filter,
            pause_on_highwater: raw.pause_on_highwater,
            logging: raw.logging,
        })
    }
}
