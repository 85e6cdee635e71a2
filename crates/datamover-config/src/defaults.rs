//! Default values applied when the configuration document omits a field.
//!
//! # Design
//! - Keep time-based defaults explicit for auditability.
//! - Mirror the polling cadence operators expect from the datamover daemon.

/// Seconds between two scans of the incoming directory.
pub const CHECK_INTERVAL_SECS: u64 = 60;
/// Seconds between two free-space samples.
pub const HIGHWATER_INTERVAL_SECS: u64 = 60;
/// Attempts made to measure free space before giving up.
pub const HIGHWATER_RETRY_ATTEMPTS: u32 = 3;
/// Delay between two free-space attempts in milliseconds.
pub const HIGHWATER_RETRY_DELAY_MS: u64 = 1_000;
/// Upper bound for a single free-space probe in milliseconds.
pub const HIGHWATER_PROBE_TIMEOUT_MS: u64 = 10_000;
/// Copy tool invoked by the process copier.
pub const COPIER_EXECUTABLE: &str = "xcopy";
/// Watchdog for the copy tool self-test in milliseconds.
pub const COPIER_CHECK_TIMEOUT_MS: u64 = 3_000;
/// Text the copy tool prints when asked for help.
pub const COPIER_EXPECTED_HELP_OUTPUT: &str = "XCOPY";
/// Threshold meaning "no high water mark".
pub const HIGHWATER_DISABLED: i64 = -1;
/// Default log level.
pub const LOG_LEVEL: &str = "info";
