//! HTTP client for the Moonraker API of a single probe target.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use klipper_common::moonraker::{
    ApiResponse, DirectoryInfo, JobQueue, ProcStats, SystemInfo, TemperatureStore,
};

/// Header Moonraker reads the API key from.
pub const API_KEY_HEADER: &str = "X-Api-Key";

/// Moonraker endpoints queried by the exporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    ProcStats,
    Directory,
    JobQueue,
    SystemInfo,
    TemperatureStore,
}

impl Endpoint {
    /// Path and query string relative to the target base URL.
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::ProcStats => "/server/proc_stats",
            Endpoint::Directory => "/server/files/directory?path=gcodes&extended=false",
            Endpoint::JobQueue => "/server/job_queue/status",
            Endpoint::SystemInfo => "/machine/system_info",
            Endpoint::TemperatureStore => "/server/temperature_store",
        }
    }
}

/// Upstream request errors. All of them are scoped to a single module.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: StatusCode },

    #[error("Failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Request to {url} was cancelled")]
    Cancelled { url: String },
}

impl ClientError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ClientError::Cancelled { .. })
    }
}

/// Build the base URL for a probe target.
///
/// Bare `host[:port]` targets get an `http://` scheme. A trailing slash is
/// dropped so endpoint paths can be appended directly.
pub fn base_url(target: &str) -> String {
    let target = target.trim().trim_end_matches('/');
    if target.starts_with("http://") || target.starts_with("https://") {
        target.to_string()
    } else {
        format!("http://{}", target)
    }
}

/// Moonraker client bound to one target for the duration of a probe.
///
/// The underlying [`reqwest::Client`] is shared across probes; the target,
/// credential and cancellation token are per probe.
#[derive(Debug, Clone)]
pub struct MoonrakerClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    cancel: CancellationToken,
}

impl MoonrakerClient {
    /// Create a client for `target`. An empty `api_key` sends no auth header.
    pub fn new(
        http: reqwest::Client,
        target: &str,
        api_key: Option<&str>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            http,
            base_url: base_url(target),
            api_key: api_key.filter(|k| !k.is_empty()).map(str::to_string),
            cancel,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn proc_stats(&self) -> Result<ProcStats, ClientError> {
        self.fetch(Endpoint::ProcStats).await
    }

    pub async fn directory_info(&self) -> Result<DirectoryInfo, ClientError> {
        self.fetch(Endpoint::Directory).await
    }

    pub async fn job_queue(&self) -> Result<JobQueue, ClientError> {
        self.fetch(Endpoint::JobQueue).await
    }

    pub async fn system_info(&self) -> Result<SystemInfo, ClientError> {
        self.fetch(Endpoint::SystemInfo).await
    }

    pub async fn temperature_store(&self) -> Result<TemperatureStore, ClientError> {
        self.fetch(Endpoint::TemperatureStore).await
    }

    /// GET an endpoint and decode the payload out of its `result` envelope.
    ///
    /// Returns [`ClientError::Cancelled`] as soon as the probe's token is
    /// cancelled, dropping the in-flight request.
    pub async fn fetch<T: DeserializeOwned>(&self, endpoint: Endpoint) -> Result<T, ClientError> {
        let url = format!("{}{}", self.base_url, endpoint.path());

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ClientError::Cancelled { url: url.clone() }),
            result = self.get(&url) => result,
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, ClientError> {
        let mut request = self.http.get(url);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        trace!(url, authenticated = self.api_key.is_some(), "Sending upstream request");

        let transport = |source: reqwest::Error| ClientError::Transport {
            url: url.to_string(),
            source,
        };

        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                url: url.to_string(),
                status,
            });
        }

        let body = response.bytes().await.map_err(transport)?;
        let envelope: ApiResponse<T> =
            serde_json::from_slice(&body).map_err(|source| ClientError::Decode {
                url: url.to_string(),
                source,
            })?;

        Ok(envelope.result)
    }
}
