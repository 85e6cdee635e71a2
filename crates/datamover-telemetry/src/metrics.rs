//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes a minimal set of counters/gauges relevant to the datamover.

use std::sync::Arc;

use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
    core::Collector,
};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Prometheus-backed metrics registry shared across components.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    paths_handled_total: IntCounterVec,
    paths_faulty_total: IntCounter,
    scan_failures_total: IntCounter,
    events_emitted_total: IntCounterVec,
    highwater_below: IntGauge,
    free_space_kb: IntGauge,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

/// Snapshot of selected gauges and counters for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Total paths recorded as faulty.
    pub paths_faulty_total: u64,
    /// Total directory listing failures.
    pub scan_failures_total: u64,
    /// `1` while free space is below the high water mark.
    pub highwater_below: i64,
    /// Latest measured free space in kilobytes.
    pub free_space_kb: i64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let paths_handled_total = build(
            "paths_handled_total",
            IntCounterVec::new(
                Opts::new("paths_handled_total", "Paths handed to a handler by outcome"),
                &["outcome"],
            ),
        )?;
        let paths_faulty_total = build(
            "paths_faulty_total",
            IntCounter::with_opts(Opts::new(
                "paths_faulty_total",
                "Paths recorded as faulty after handling",
            )),
        )?;
        let scan_failures_total = build(
            "scan_failures_total",
            IntCounter::with_opts(Opts::new(
                "scan_failures_total",
                "Failed attempts to list the watched directory",
            )),
        )?;
        let events_emitted_total = build(
            "events_emitted_total",
            IntCounterVec::new(
                Opts::new("events_emitted_total", "Domain events emitted by type"),
                &["type"],
            ),
        )?;
        let highwater_below = build(
            "highwater_below",
            IntGauge::with_opts(Opts::new(
                "highwater_below",
                "Whether free space is below the high water mark",
            )),
        )?;
        let free_space_kb = build(
            "free_space_kb",
            IntGauge::with_opts(Opts::new(
                "free_space_kb",
                "Latest free space measurement in kilobytes",
            )),
        )?;

        register(&registry, "paths_handled_total", &paths_handled_total)?;
        register(&registry, "paths_faulty_total", &paths_faulty_total)?;
        register(&registry, "scan_failures_total", &scan_failures_total)?;
        register(&registry, "events_emitted_total", &events_emitted_total)?;
        register(&registry, "highwater_below", &highwater_below)?;
        register(&registry, "free_space_kb", &free_space_kb)?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                paths_handled_total,
                paths_faulty_total,
                scan_failures_total,
                events_emitted_total,
                highwater_below,
                free_space_kb,
            }),
        })
    }

    /// Increment the handled-path counter for the given outcome label.
    pub fn inc_path_handled(&self, outcome: &str) {
        self.inner
            .paths_handled_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Increment the faulty-path counter.
    pub fn inc_path_faulty(&self) {
        self.inner.paths_faulty_total.inc();
    }

    /// Increment the directory listing failure counter.
    pub fn inc_scan_failure(&self) {
        self.inner.scan_failures_total.inc();
    }

    /// Increment the emitted event counter for the specific event type.
    pub fn inc_event(&self, event_type: &str) {
        self.inner
            .events_emitted_total
            .with_label_values(&[event_type])
            .inc();
    }

    /// Record the latest high water mark state.
    pub fn set_highwater(&self, below: bool, free_space_kb: u64) {
        self.inner.highwater_below.set(i64::from(below));
        self.inner
            .free_space_kb
            .set(i64::try_from(free_space_kb).unwrap_or(i64::MAX));
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::Render { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::RenderUtf8 { source })
    }

    /// Take a point-in-time snapshot of the most relevant gauges and counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            paths_faulty_total: self.inner.paths_faulty_total.get(),
            scan_failures_total: self.inner.scan_failures_total.get(),
            highwater_below: self.inner.highwater_below.get(),
            free_space_kb: self.inner.free_space_kb.get(),
        }
    }
}

fn build<C>(name: &'static str, collector: prometheus::Result<C>) -> Result<C> {
    collector.map_err(|source| TelemetryError::Collector {
        operation: "build",
        name,
        source,
    })
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::Collector {
            operation: "register",
            name,
            source,
        })
}
