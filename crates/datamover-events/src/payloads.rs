//! Event payload types carried across the datamover.

use chrono::{DateTime, Utc};

/// Identifier assigned to each event emitted by the datamover.
pub type EventId = u64;

/// Default number of events kept in the bus journal.
pub const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Typed domain events surfaced across the system.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A handler moved a path out of the watched directory.
    PathMoved {
        /// Absolute path that was handled.
        path: String,
    },
    /// A path remained after handling and is now skipped by future scans.
    PathFaulty {
        /// Absolute path recorded as faulty.
        path: String,
        /// Handler-provided reason, or a note that the handler reported success.
        reason: String,
    },
    /// The set of faulty paths was reloaded or cleared from the sentinel file.
    FaultsReloaded {
        /// Directory owning the sentinel file.
        directory: String,
        /// Number of faulty paths after the reload.
        count: usize,
    },
    /// Listing the watched directory failed.
    ScanFailed {
        /// Directory that could not be listed.
        directory: String,
        /// Rendered failure detail.
        message: String,
    },
    /// Free space crossed the configured high water mark.
    HighwaterMarkChanged {
        /// Path whose free space is watched.
        path: String,
        /// Configured threshold in kilobytes.
        threshold_kb: i64,
        /// Measured free space in kilobytes.
        free_space_kb: u64,
        /// Whether free space is now below the threshold.
        below: bool,
    },
    /// Free space could not be measured even after retrying.
    HighwaterProbeFailed {
        /// Path whose free space could not be measured.
        path: String,
        /// Rendered failure detail.
        message: String,
    },
    /// An external copy process finished.
    CopyFinished {
        /// Source path handed to the copy tool.
        source: String,
        /// Destination path handed to the copy tool.
        destination: String,
        /// Outcome label (`ok`, `retriable_error`, `fatal_error`).
        outcome: String,
        /// Failure detail for non-ok outcomes.
        message: Option<String>,
    },
    /// The set of degraded components changed.
    HealthChanged {
        /// Components currently reporting degraded health.
        degraded: Vec<String>,
    },
}

impl Event {
    /// Machine-friendly discriminator for log and stream consumers.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PathMoved { .. } => "path_moved",
            Self::PathFaulty { .. } => "path_faulty",
            Self::FaultsReloaded { .. } => "faults_reloaded",
            Self::ScanFailed { .. } => "scan_failed",
            Self::HighwaterMarkChanged { .. } => "highwater_mark_changed",
            Self::HighwaterProbeFailed { .. } => "highwater_probe_failed",
            Self::CopyFinished { .. } => "copy_finished",
            Self::HealthChanged { .. } => "health_changed",
        }
    }
}

/// Metadata wrapper around events. Each envelope tracks the event id and
/// emission timestamp.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Sequential identifier for the event.
    pub id: EventId,
    /// Time at which the event was published.
    pub timestamp: DateTime<Utc>,
    /// Event payload.
    pub event: Event,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_event_kind(event: &Event, expected: &str) {
        assert_eq!(event.kind(), expected);
    }

    #[test]
    fn event_kind_maps_scanner_variants() {
        assert_event_kind(
            &Event::PathMoved {
                path: "/incoming/a".into(),
            },
            "path_moved",
        );
        assert_event_kind(
            &Event::PathFaulty {
                path: "/incoming/b".into(),
                reason: "rename failed".into(),
            },
            "path_faulty",
        );
        assert_event_kind(
            &Event::FaultsReloaded {
                directory: "/incoming".into(),
                count: 0,
            },
            "faults_reloaded",
        );
        assert_event_kind(
            &Event::ScanFailed {
                directory: "/incoming".into(),
                message: "not a directory".into(),
            },
            "scan_failed",
        );
    }

    #[test]
    fn event_kind_maps_system_variants() {
        assert_event_kind(
            &Event::HighwaterMarkChanged {
                path: "/outgoing".into(),
                threshold_kb: 100,
                free_space_kb: 70,
                below: true,
            },
            "highwater_mark_changed",
        );
        assert_event_kind(
            &Event::HighwaterProbeFailed {
                path: "/outgoing".into(),
                message: "timeout".into(),
            },
            "highwater_probe_failed",
        );
        assert_event_kind(
            &Event::CopyFinished {
                source: "/incoming/a".into(),
                destination: "/outgoing/a".into(),
                outcome: "ok".into(),
                message: None,
            },
            "copy_finished",
        );
        assert_event_kind(
            &Event::HealthChanged {
                degraded: vec!["scanner".into()],
            },
            "health_changed",
        );
    }

    #[test]
    fn events_serialise_with_type_tag() {
        let event = Event::PathFaulty {
            path: "/incoming/b".into(),
            reason: "still present".into(),
        };
        let value = serde_json::to_value(&event).expect("serialise event");
        assert_eq!(value["type"], "path_faulty");
        assert_eq!(value["path"], "/incoming/b");
    }
}
