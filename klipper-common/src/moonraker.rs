//! Typed response model for the Moonraker API endpoints the exporter reads.
//!
//! Every Moonraker response wraps its payload in a `result` envelope, see
//! [`ApiResponse`]. Unknown fields are ignored so that additions on the
//! firmware side never break decoding.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The `{"result": ...}` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub result: T,
}

/// Payload of `/server/proc_stats`.
///
/// Older Moonraker releases omit some of these fields; missing ones decode
/// as zero so the remaining metrics still emit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcStats {
    /// Rolling window of Moonraker process samples, oldest first.
    #[serde(default)]
    pub moonraker_stats: Vec<ProcessSample>,

    /// Host CPU temperature; `null` when the host has no sensor.
    #[serde(default)]
    pub cpu_temp: Option<f64>,

    /// Network counters keyed by interface name.
    #[serde(default)]
    pub network: BTreeMap<String, NetworkCounters>,

    #[serde(default)]
    pub system_cpu_usage: SystemCpuUsage,

    #[serde(default)]
    pub system_memory: SystemMemory,

    /// Host uptime in seconds.
    #[serde(default)]
    pub system_uptime: f64,

    #[serde(default)]
    pub websocket_connections: u64,
}

impl ProcStats {
    /// The most recent process sample, if any.
    pub fn latest_sample(&self) -> Option<&ProcessSample> {
        self.moonraker_stats.last()
    }
}

/// One Moonraker process sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSample {
    #[serde(default)]
    pub time: f64,
    pub cpu_usage: f64,
    pub memory: u64,
    pub mem_units: String,
}

/// Per-interface network counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_errs: u64,
    pub tx_errs: u64,
    pub rx_drop: u64,
    pub tx_drop: u64,
    pub bandwidth: f64,
}

/// Aggregate host CPU usage. Per-core entries (`cpu0`, `cpu1`, ...) are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemCpuUsage {
    pub cpu: f64,
}

/// Host memory in kilobytes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemMemory {
    pub total: u64,
    pub available: u64,
    pub used: u64,
}

/// Payload of `/server/files/directory`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryInfo {
    pub disk_usage: DiskUsage,
}

/// Disk usage of the volume holding the queried directory, in bytes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiskUsage {
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

/// Payload of `/server/job_queue/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobQueue {
    /// Queued job records. Only the count is consumed.
    pub queued_jobs: Vec<serde_json::Value>,
}

/// Payload of `/machine/system_info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub system_info: SystemInfoDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfoDetails {
    pub cpu_info: CpuInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuInfo {
    pub cpu_count: u64,
}

/// Payload of `/server/temperature_store`.
///
/// Sensor name to attribute map. The attribute set depends on the sensor
/// type (`temperatures`, `targets`, `powers`, `speeds`, ...), so values are
/// kept as raw JSON and traversed by the mapper.
pub type TemperatureStore = BTreeMap<String, serde_json::Value>;
