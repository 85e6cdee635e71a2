//! Logging setup for the datamover binary.
//!
//! # Design
//! - One entry point installs the global subscriber; `RUST_LOG` wins over the
//!   configured level, and an unparsable level falls back to `info`.
//! - Thread names are kept in the output because scans, probes, and copier
//!   watchdogs all run on dedicated blocking threads.
//! - The build identifier is recorded once and readable afterwards.

use once_cell::sync::OnceCell;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::error::{Result, TelemetryError};

/// Level used when neither `RUST_LOG` nor the configuration names one.
pub const DEFAULT_LOG_LEVEL: &str = "info";

static BUILD_SHA: OnceCell<String> = OnceCell::new();

/// Install the global tracing subscriber described by `config`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig<'_>) -> Result<()> {
    let _ = BUILD_SHA.set(config.build_sha.to_string());

    let output: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_target(false)
            .with_thread_names(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(false)
            .with_thread_names(true)
            .boxed(),
    };
    tracing_subscriber::registry()
        .with(output)
        .with(env_filter(config.level))
        .try_init()
        .map_err(|source| TelemetryError::SubscriberInstall { source })
}

/// Build identifier recorded by [`init_logging`], or `dev` before that.
#[must_use]
pub fn build_sha() -> &'static str {
    BUILD_SHA.get().map_or("dev", String::as_str)
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig<'a> {
    /// Level directive (e.g., `info`, `datamover_fsops=debug`).
    pub level: &'a str,
    /// Output format.
    pub format: LogFormat,
    /// Build identifier reported at startup.
    pub build_sha: &'a str,
}

impl Default for LoggingConfig<'_> {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL,
            format: LogFormat::infer(),
            build_sha: build_sha(),
        }
    }
}

/// Available output formats for the logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line.
    Json,
    /// Human-readable lines.
    Pretty,
}

impl LogFormat {
    /// Pretty for debug builds, JSON for release builds.
    #[must_use]
    pub const fn infer() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }

    /// Parse a configured format name, falling back to [`LogFormat::infer`].
    #[must_use]
    pub fn from_name(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            Self::Json
        } else if value.eq_ignore_ascii_case("pretty") {
            Self::Pretty
        } else {
            Self::infer()
        }
    }
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL))
}
