//! Request-scoped collection cycle and the per-probe metric set.

use std::collections::HashSet;
use std::fmt::Write;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::client::{ClientError, MoonrakerClient};
use crate::mapping::{
    Observation, map_directory_info, map_job_queue, map_network_stats, map_process_stats,
    map_system_info, map_temperatures,
};
use crate::modules::{Branch, Module, ModuleSet};

/// Receiver for the observations a collection cycle produces.
pub trait MetricSink {
    /// Accept an observation. Returns `false` when the sink discarded it.
    fn emit(&mut self, observation: Observation) -> bool;
}

impl MetricSink for Vec<Observation> {
    fn emit(&mut self, observation: Observation) -> bool {
        self.push(observation);
        true
    }
}

/// Errors rejecting a probe request before any upstream call is made.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("'target' parameter must be specified once")]
    Target,
}

/// One scrape: which host to query, for which modules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRequest {
    pub target: String,
    pub modules: ModuleSet,
}

impl CollectionRequest {
    /// Build a request from raw query pairs.
    ///
    /// `target` must occur exactly once and be non-empty. `modules` may be
    /// repeated; when absent `default_modules` applies.
    pub fn from_query(
        params: &[(String, String)],
        default_modules: &ModuleSet,
    ) -> Result<Self, RequestError> {
        let targets: Vec<&str> = params
            .iter()
            .filter(|(k, _)| k == "target")
            .map(|(_, v)| v.as_str())
            .collect();

        let target = match targets.as_slice() {
            [target] if !target.is_empty() => target.to_string(),
            _ => return Err(RequestError::Target),
        };

        let names: Vec<&str> = params
            .iter()
            .filter(|(k, _)| k == "modules")
            .map(|(_, v)| v.as_str())
            .collect();

        let modules = if names.is_empty() {
            default_modules.clone()
        } else {
            ModuleSet::parse(names)
        };

        Ok(Self { target, modules })
    }
}

/// Outcome of one collection cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionSummary {
    /// Observations the sink accepted.
    pub emitted: usize,
    /// Branches whose upstream call failed.
    pub failed: Vec<Branch>,
    /// Set when the probe was cancelled before all branches ran.
    pub cancelled: bool,
}

/// A single linear pass over the selected branches for one target.
///
/// Branches run sequentially. A failing branch is logged and skipped; the
/// remaining branches still run.
pub struct Collection<'a> {
    client: &'a MoonrakerClient,
}

impl<'a> Collection<'a> {
    pub fn new(client: &'a MoonrakerClient) -> Self {
        Self { client }
    }

    pub async fn run<S>(&self, modules: &ModuleSet, sink: &mut S) -> CollectionSummary
    where
        S: MetricSink + Send,
    {
        let mut summary = CollectionSummary::default();
        let host = self.client.base_url();

        for branch in modules.branches() {
            info!(host, module = %branch, "Collecting {} for {}", branch, host);

            match self.collect_branch(branch, modules).await {
                Ok(observations) => {
                    for observation in observations {
                        if sink.emit(observation) {
                            summary.emitted += 1;
                        }
                    }
                }
                Err(e) if e.is_cancelled() => {
                    debug!(host, module = %branch, "Probe cancelled, abandoning collection");
                    summary.cancelled = true;
                    break;
                }
                Err(e) => {
                    debug!(host, module = %branch, error = ?e, "Upstream request failed");
                    error!(host, module = %branch, error = %e, "Skipping {} for this scrape", branch);
                    summary.failed.push(branch);
                }
            }
        }

        summary
    }

    async fn collect_branch(
        &self,
        branch: Branch,
        modules: &ModuleSet,
    ) -> Result<Vec<Observation>, ClientError> {
        let observations = match branch {
            Branch::Stats => {
                let stats = self.client.proc_stats().await?;
                let mut out = Vec::new();
                if modules.contains(Module::ProcessStats) {
                    out.extend(map_process_stats(&stats));
                }
                if modules.contains(Module::NetworkStats) {
                    out.extend(map_network_stats(&stats));
                }
                out
            }
            Branch::Directory => map_directory_info(&self.client.directory_info().await?),
            Branch::JobQueue => map_job_queue(&self.client.job_queue().await?),
            Branch::SystemInfo => map_system_info(&self.client.system_info().await?),
            Branch::Temperature => map_temperatures(&self.client.temperature_store().await?),
        };

        Ok(observations)
    }
}

/// Metrics produced by a single probe, in emission order.
///
/// Lives only for one request. A repeated metric name is dropped so the
/// rendered output never contains the same series twice.
#[derive(Debug, Default)]
pub struct ProbeMetrics {
    observations: Vec<Observation>,
    seen: HashSet<String>,
}

impl MetricSink for ProbeMetrics {
    fn emit(&mut self, observation: Observation) -> bool {
        if !self.seen.insert(observation.name.clone()) {
            warn!(metric = %observation.name, "Duplicate metric name in probe, dropping");
            return false;
        }
        self.observations.push(observation);
        true
    }
}

impl ProbeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Value of a metric by name.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.observations
            .iter()
            .find(|o| o.name == name)
            .map(|o| o.value)
    }

    /// Render in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut output = String::with_capacity(self.observations.len() * 100);

        for observation in &self.observations {
            writeln!(
                output,
                "# HELP {} {}",
                observation.name,
                escape_help(&observation.help)
            )
            .ok();
            writeln!(output, "# TYPE {} gauge", observation.name).ok();
            writeln!(
                output,
                "{} {}",
                observation.name,
                format_value(observation.value)
            )
            .ok();
        }

        output
    }
}

/// Escape backslashes and newlines in HELP text.
fn escape_help(help: &str) -> String {
    let mut result = String::with_capacity(help.len());
    for c in help.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

/// Format a floating point value for Prometheus.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_request_with_defaults() {
        let request =
            CollectionRequest::from_query(&pairs(&[("target", "printer:7125")]), &ModuleSet::default())
                .unwrap();

        assert_eq!(request.target, "printer:7125");
        assert_eq!(request.modules, ModuleSet::default());
    }

    #[test]
    fn test_request_with_repeated_modules() {
        let request = CollectionRequest::from_query(
            &pairs(&[
                ("modules", "job_queue"),
                ("target", "printer"),
                ("modules", "temperature"),
            ]),
            &ModuleSet::default(),
        )
        .unwrap();

        assert_eq!(
            request.modules,
            ModuleSet::new([Module::JobQueue, Module::Temperature])
        );
    }

    #[test]
    fn test_request_target_validation() {
        let defaults = ModuleSet::default();

        assert_eq!(
            CollectionRequest::from_query(&[], &defaults),
            Err(RequestError::Target)
        );
        assert_eq!(
            CollectionRequest::from_query(&pairs(&[("target", "")]), &defaults),
            Err(RequestError::Target)
        );
        assert_eq!(
            CollectionRequest::from_query(&pairs(&[("target", "a"), ("target", "b")]), &defaults),
            Err(RequestError::Target)
        );
        assert_eq!(
            RequestError::Target.to_string(),
            "'target' parameter must be specified once"
        );
    }

    #[test]
    fn test_probe_metrics_drops_duplicates() {
        let mut metrics = ProbeMetrics::new();
        assert!(metrics.emit(Observation::gauge("klipper_a", "A.", 1.0)));
        assert!(!metrics.emit(Observation::gauge("klipper_a", "A again.", 2.0)));
        assert!(metrics.emit(Observation::gauge("klipper_b", "B.", 3.0)));

        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics.get("klipper_a"), Some(1.0));
    }

    #[test]
    fn test_render_exposition_format() {
        let mut metrics = ProbeMetrics::new();
        metrics.emit(Observation::gauge(
            "klipper_job_queue_length",
            "Klipper job queue length.",
            2.0,
        ));
        metrics.emit(Observation::gauge(
            "klipper_system_uptime",
            "Klipper system uptime.",
            12.25,
        ));

        let output = metrics.render();
        assert_eq!(
            output,
            "# HELP klipper_job_queue_length Klipper job queue length.\n\
             # TYPE klipper_job_queue_length gauge\n\
             klipper_job_queue_length 2\n\
             # HELP klipper_system_uptime Klipper system uptime.\n\
             # TYPE klipper_system_uptime gauge\n\
             klipper_system_uptime 12.25\n"
        );
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(ProbeMetrics::new().render(), "");
    }

    #[test]
    fn test_escape_help() {
        assert_eq!(escape_help("plain"), "plain");
        assert_eq!(escape_help("a\\b"), "a\\\\b");
        assert_eq!(escape_help("a\nb"), "a\\nb");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(42.0), "42");
        assert_eq!(format_value(3.14), "3.14");
        assert_eq!(format_value(f64::NAN), "NaN");
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(f64::NEG_INFINITY), "-Inf");
    }

    #[tokio::test]
    async fn test_unreachable_target_fails_every_branch() {
        let client = MoonrakerClient::new(
            reqwest::Client::new(),
            "127.0.0.1:1",
            None,
            tokio_util::sync::CancellationToken::new(),
        );
        let mut metrics = ProbeMetrics::new();
        let modules = ModuleSet::new([Module::JobQueue, Module::SystemInfo]);

        let summary = Collection::new(&client).run(&modules, &mut metrics).await;

        assert!(metrics.is_empty());
        assert_eq!(summary.emitted, 0);
        assert_eq!(summary.failed, vec![Branch::JobQueue, Branch::SystemInfo]);
        assert!(!summary.cancelled);
    }
}
