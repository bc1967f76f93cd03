//! Prometheus exporter for Klipper 3D printers.
//!
//! Each `/probe` request queries the Moonraker API of one target host and
//! republishes the latest values as gauges. Nothing is kept between probes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   /probe    ┌──────────────┐   JSON    ┌──────────────┐
//! │  Prometheus  │────────────>│  Collection  │<─────────│  Moonraker   │
//! │   scraper    │<────────────│ (per probe)  │  (HTTP)   │   (target)   │
//! └──────────────┘  text fmt   └──────────────┘           └──────────────┘
//! ```
//!
//! A probe selects [`modules`], fetches each needed endpoint through the
//! [`client`], turns responses into observations with [`mapping`] and emits
//! them into a fresh [`collector::ProbeMetrics`]. A failing upstream call only
//! removes that module's metrics from the response.
//!
//! # Usage
//!
//! ```bash
//! klipper-exporter --web.listen-address :9101 --moonraker.apikey <key>
//! curl 'http://localhost:9101/probe?target=printer.local:7125&modules=temperature'
//! ```

pub mod client;
pub mod collector;
pub mod config;
pub mod http;
pub mod mapping;
pub mod metrics;
pub mod modules;

pub use client::{ClientError, MoonrakerClient};
pub use collector::{Collection, CollectionRequest, CollectionSummary, MetricSink, ProbeMetrics};
pub use config::ExporterConfig;
pub use http::{AppState, HttpServer};
pub use mapping::Observation;
pub use metrics::ExporterMetrics;
pub use modules::{Branch, Module, ModuleSet};
