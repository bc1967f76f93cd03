//! Mapping from decoded Moonraker responses to gauge observations.
//!
//! Every mapper is a pure function of its response. Metric identity is the
//! name alone: dynamic keys such as interface and sensor names become part
//! of the metric name, never labels.

use serde_json::Value;
use tracing::{debug, error, warn};

use klipper_common::moonraker::{DirectoryInfo, JobQueue, ProcStats, SystemInfo, TemperatureStore};

/// Prefix shared by every probe metric.
pub const METRIC_PREFIX: &str = "klipper";

/// The only memory unit Moonraker is known to report.
pub const EXPECTED_MEMORY_UNITS: &str = "kB";

/// A single gauge sample produced by a probe.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub name: String,
    pub help: String,
    pub value: f64,
}

impl Observation {
    pub fn gauge(name: impl Into<String>, help: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            value,
        }
    }
}

/// Sanitize a dynamic key for use inside a metric name.
///
/// Spaces and any other character outside `[a-zA-Z0-9_:]` become `_`.
/// Unlike a general-purpose sanitizer this keeps runs of underscores, so
/// the mapping from key to name stays one character per character.
pub fn sanitize_name_part(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == ':' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Metric name fragment for a temperature store attribute.
///
/// Attribute keys are plural (`temperatures`, `targets`, `powers`); the
/// trailing `s` is dropped when present.
pub fn attribute_label(attribute: &str) -> String {
    sanitize_name_part(attribute.strip_suffix('s').unwrap_or(attribute))
}

/// Moonraker process and host metrics from `/server/proc_stats`.
///
/// Memory is only reported when the latest sample is in kB; any other unit
/// is logged and suppresses that one metric.
pub fn map_process_stats(stats: &ProcStats) -> Vec<Observation> {
    let mut out = Vec::with_capacity(9);

    match stats.latest_sample() {
        Some(sample) => {
            if sample.mem_units == EXPECTED_MEMORY_UNITS {
                out.push(Observation::gauge(
                    "klipper_moonraker_memory_kb",
                    "Moonraker memory usage in Kb.",
                    sample.memory as f64,
                ));
            } else {
                error!(
                    units = %sample.mem_units,
                    "Unexpected units {} for Moonraker memory usage", sample.mem_units
                );
            }
            out.push(Observation::gauge(
                "klipper_moonraker_cpu_usage",
                "Moonraker CPU usage.",
                sample.cpu_usage,
            ));
        }
        None => warn!("Moonraker returned no process samples, skipping memory and CPU usage"),
    }

    out.push(Observation::gauge(
        "klipper_moonraker_websocket_connections",
        "Moonraker Websocket connection count.",
        stats.websocket_connections as f64,
    ));

    match stats.cpu_temp {
        Some(temp) => out.push(Observation::gauge(
            "klipper_system_cpu_temp",
            "Klipper system CPU temperature in celsius.",
            temp,
        )),
        None => debug!("Host reports no CPU temperature"),
    }

    out.push(Observation::gauge(
        "klipper_system_cpu",
        "Klipper system CPU usage.",
        stats.system_cpu_usage.cpu,
    ));
    out.push(Observation::gauge(
        "klipper_system_memory_total",
        "Klipper system total memory.",
        stats.system_memory.total as f64,
    ));
    out.push(Observation::gauge(
        "klipper_system_memory_available",
        "Klipper system available memory.",
        stats.system_memory.available as f64,
    ));
    out.push(Observation::gauge(
        "klipper_system_memory_used",
        "Klipper system used memory.",
        stats.system_memory.used as f64,
    ));
    out.push(Observation::gauge(
        "klipper_system_uptime",
        "Klipper system uptime.",
        stats.system_uptime,
    ));

    out
}

/// Per-interface network counters from `/server/proc_stats`.
///
/// Nine gauges per interface, named `klipper_network_<interface>_<field>`.
pub fn map_network_stats(stats: &ProcStats) -> Vec<Observation> {
    let mut out = Vec::with_capacity(stats.network.len() * 9);

    for (interface, counters) in &stats.network {
        let prefix = format!("{}_network_{}", METRIC_PREFIX, sanitize_name_part(interface));
        let fields = [
            ("rx_bytes", "Klipper network received bytes.", counters.rx_bytes as f64),
            ("tx_bytes", "Klipper network transmitted bytes.", counters.tx_bytes as f64),
            ("rx_packets", "Klipper network received packets.", counters.rx_packets as f64),
            ("tx_packets", "Klipper network transmitted packets.", counters.tx_packets as f64),
            ("rx_errs", "Klipper network received errored packets.", counters.rx_errs as f64),
            ("tx_errs", "Klipper network transmitted errored packets.", counters.tx_errs as f64),
            ("rx_drop", "Klipper network received dropped packets.", counters.rx_drop as f64),
            ("tx_drop", "Klipper network transmitted dropped packets.", counters.tx_drop as f64),
            ("bandwidth", "Klipper network bandwidth.", counters.bandwidth),
        ];

        for (field, help, value) in fields {
            out.push(Observation::gauge(format!("{}_{}", prefix, field), help, value));
        }
    }

    out
}

pub fn map_directory_info(info: &DirectoryInfo) -> Vec<Observation> {
    let usage = &info.disk_usage;
    vec![
        Observation::gauge(
            "klipper_disk_usage_total",
            "Klipper total disk space.",
            usage.total as f64,
        ),
        Observation::gauge(
            "klipper_disk_usage_used",
            "Klipper used disk space.",
            usage.used as f64,
        ),
        Observation::gauge(
            "klipper_disk_usage_available",
            "Klipper available disk space.",
            usage.free as f64,
        ),
    ]
}

pub fn map_job_queue(queue: &JobQueue) -> Vec<Observation> {
    vec![Observation::gauge(
        "klipper_job_queue_length",
        "Klipper job queue length.",
        queue.queued_jobs.len() as f64,
    )]
}

pub fn map_system_info(info: &SystemInfo) -> Vec<Observation> {
    vec![Observation::gauge(
        "klipper_system_cpu_count",
        "Klipper system CPU count.",
        info.system_info.cpu_info.cpu_count as f64,
    )]
}

/// Latest sample of every sensor attribute in the temperature store.
///
/// The store has no fixed schema. Each sensor must be an object of arrays;
/// anything else, an empty array, or a non-numeric last sample skips that
/// single observation with a warning.
pub fn map_temperatures(store: &TemperatureStore) -> Vec<Observation> {
    let mut out = Vec::new();

    for (sensor, attributes) in store {
        let Some(attributes) = attributes.as_object() else {
            warn!(sensor = %sensor, "Temperature store entry is not an object, skipping");
            continue;
        };
        let item = sanitize_name_part(sensor);

        for (attribute, samples) in attributes {
            if attribute.is_empty() {
                warn!(sensor = %sensor, "Temperature store attribute has an empty name, skipping");
                continue;
            }

            match latest_numeric(samples) {
                Some(value) => {
                    let label = attribute_label(attribute);
                    out.push(Observation::gauge(
                        format!("{}_{}_{}", METRIC_PREFIX, item, label),
                        format!("Klipper {} {}", sensor, label),
                        value,
                    ));
                }
                None => warn!(
                    sensor = %sensor,
                    attribute = %attribute,
                    "Temperature store attribute has no numeric latest sample, skipping"
                ),
            }
        }
    }

    out
}

fn latest_numeric(samples: &Value) -> Option<f64> {
    samples.as_array()?.last()?.as_f64()
}
