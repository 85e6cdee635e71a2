//! # Design
//!
//! - Centralize application-level errors for bootstrap and scheduling.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Preserve source errors without re-logging at call sites.

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration operations failed.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: datamover_config::ConfigError,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: datamover_telemetry::TelemetryError,
    },
    /// Filesystem component operations failed.
    #[error("filesystem operation failed")]
    FsOps {
        /// Operation identifier.
        operation: &'static str,
        /// Source fsops error.
        source: datamover_fsops::FsOpsError,
    },
    /// A blocking task panicked or was cancelled.
    #[error("background task failed")]
    Join {
        /// Operation identifier.
        operation: &'static str,
        /// Source join error.
        source: tokio::task::JoinError,
    },
    /// Waiting for the shutdown signal failed.
    #[error("shutdown signal failed")]
    Signal {
        /// Source IO error.
        source: std::io::Error,
    },
}

impl AppError {
    pub(crate) const fn config(
        operation: &'static str,
        source: datamover_config::ConfigError,
    ) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: datamover_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn fsops(operation: &'static str, source: datamover_fsops::FsOpsError) -> Self {
        Self::FsOps { operation, source }
    }

    pub(crate) const fn join(operation: &'static str, source: tokio::task::JoinError) -> Self {
        Self::Join { operation, source }
    }
}
