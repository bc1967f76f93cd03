//! Process-level self-metrics served on `/metrics`.
//!
//! These describe the exporter itself. Probe metrics never enter this
//! registry; they live in a fresh [`ProbeMetrics`](crate::collector::ProbeMetrics)
//! per request.

use std::sync::Arc;
use std::time::{Duration, Instant};

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tracing::{debug, warn};

use crate::collector::CollectionSummary;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ModuleLabels {
    pub module: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct BuildLabels {
    version: String,
}

/// Exporter self-metrics.
pub struct ExporterMetrics {
    registry: Registry,
    probes: Counter,
    invalid_requests: Counter,
    cancelled_probes: Counter,
    module_errors: Family<ModuleLabels, Counter>,
    probe_duration: Histogram,
}

impl ExporterMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("klipper_exporter");

        let probes = Counter::default();
        registry.register("probes", "Probe requests served", probes.clone());

        let invalid_requests = Counter::default();
        registry.register(
            "invalid_requests",
            "Probe requests rejected before collection",
            invalid_requests.clone(),
        );

        let cancelled_probes = Counter::default();
        registry.register(
            "cancelled_probes",
            "Probes abandoned because the scraper went away",
            cancelled_probes.clone(),
        );

        let module_errors = Family::<ModuleLabels, Counter>::default();
        registry.register(
            "module_errors",
            "Upstream failures per module branch",
            module_errors.clone(),
        );

        let probe_duration = Histogram::new(exponential_buckets(0.005, 2.0, 12));
        registry.register(
            "probe_duration_seconds",
            "Time spent collecting a probe",
            probe_duration.clone(),
        );

        let build_info = Family::<BuildLabels, Gauge>::default();
        build_info
            .get_or_create(&BuildLabels {
                version: env!("CARGO_PKG_VERSION").to_string(),
            })
            .set(1);
        registry.register("build_info", "Exporter build information", build_info);

        Self {
            registry,
            probes,
            invalid_requests,
            cancelled_probes,
            module_errors,
            probe_duration,
        }
    }

    pub fn record_probe(&self, summary: &CollectionSummary, elapsed: Duration) {
        self.probes.inc();
        if summary.cancelled {
            self.cancelled_probes.inc();
        }
        for branch in &summary.failed {
            self.module_errors
                .get_or_create(&ModuleLabels {
                    module: branch.as_str().to_string(),
                })
                .inc();
        }
        self.probe_duration.observe(elapsed.as_secs_f64());
    }

    pub fn record_invalid_request(&self) {
        self.invalid_requests.inc();
    }

    /// Render the registry in text exposition format.
    pub fn render(&self) -> String {
        let mut output = String::new();
        if let Err(e) = encode(&mut output, &self.registry) {
            warn!(error = %e, "Failed to encode exporter metrics");
        }
        output
    }
}

impl Default for ExporterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Times one probe and records it when dropped.
///
/// A probe whose handler future goes away before [`ProbeRecorder::finish`]
/// is recorded as cancelled.
pub struct ProbeRecorder {
    metrics: Arc<ExporterMetrics>,
    started: Instant,
    finished: bool,
}

impl ProbeRecorder {
    pub fn start(metrics: Arc<ExporterMetrics>) -> Self {
        Self {
            metrics,
            started: Instant::now(),
            finished: false,
        }
    }

    /// Record a completed collection and return its duration.
    pub fn finish(mut self, summary: &CollectionSummary) -> Duration {
        self.finished = true;
        let elapsed = self.started.elapsed();
        self.metrics.record_probe(summary, elapsed);
        elapsed
    }
}

impl Drop for ProbeRecorder {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        debug!("Probe abandoned before collection finished");
        let summary = CollectionSummary {
            cancelled: true,
            ..Default::default()
        };
        self.metrics.record_probe(&summary, self.started.elapsed());
    }
}
