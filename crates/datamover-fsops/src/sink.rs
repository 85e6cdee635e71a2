//! Error and event sink shared by the scanner, watcher, and movers.

use datamover_events::{Event, EventBus};
use datamover_telemetry::Metrics;
use tracing::trace;

/// Event bus plus metrics registry handed to every component.
#[derive(Debug, Clone)]
pub struct EventSink {
    events: EventBus,
    metrics: Metrics,
}

impl EventSink {
    /// Pair an event bus with a metrics registry.
    #[must_use]
    pub const fn new(events: EventBus, metrics: Metrics) -> Self {
        Self { events, metrics }
    }

    /// Publish an event and count it by type.
    pub fn emit(&self, event: Event) {
        let kind = event.kind();
        self.metrics.inc_event(kind);
        let id = self.events.publish(event);
        trace!(event_id = id, event_kind = kind, "event emitted");
    }

    /// Underlying event bus.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Underlying metrics registry.
    #[must_use]
    pub const fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}
