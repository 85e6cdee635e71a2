//! Error types for telemetry operations.

use prometheus::Error as PrometheusError;
use thiserror::Error;

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Errors raised by telemetry helpers.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Installing the tracing subscriber failed.
    #[error("failed to install tracing subscriber")]
    SubscriberInstall {
        /// Underlying tracing subscriber error.
        source: tracing_subscriber::util::TryInitError,
    },
    /// Building or registering a collector failed.
    #[error("metrics collector setup failed")]
    Collector {
        /// Setup step (`build` or `register`).
        operation: &'static str,
        /// Metric name tied to the failure.
        name: &'static str,
        /// Underlying Prometheus error.
        source: PrometheusError,
    },
    /// Encoding the registry in text format failed.
    #[error("failed to render metrics")]
    Render {
        /// Underlying Prometheus error.
        source: PrometheusError,
    },
    /// Rendered metrics were not valid UTF-8.
    #[error("metrics output was not valid utf-8")]
    RenderUtf8 {
        /// Underlying UTF-8 conversion error.
        source: std::string::FromUtf8Error,
    },
}
