//! HTTP server exposing `/probe` and the exporter's own `/metrics`.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

use crate::client::MoonrakerClient;
use crate::collector::{Collection, CollectionRequest, ProbeMetrics};
use crate::config::{ApiKeySource, ExporterConfig};
use crate::metrics::{ExporterMetrics, ProbeRecorder};
use crate::modules::ModuleSet;

/// Content type of the Prometheus text exposition format.
pub const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<ExporterConfig>,
    default_modules: Arc<ModuleSet>,
    http: reqwest::Client,
    metrics: Arc<ExporterMetrics>,
}

impl AppState {
    /// Build the shared state, including the pooled upstream HTTP client.
    pub fn new(config: ExporterConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("klipper-exporter/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            default_modules: Arc::new(config.default_module_set()),
            config: Arc::new(config),
            http,
            metrics: Arc::new(ExporterMetrics::new()),
        })
    }

    pub fn metrics(&self) -> &ExporterMetrics {
        &self.metrics
    }
}

/// Create the HTTP router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/probe", get(probe_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Handler for the /probe endpoint.
///
/// Every request gets its own metric set and cancellation token. Dropping
/// the handler future (scraper disconnect) cancels the token, which ends
/// any in-flight upstream call, and records the probe as cancelled.
async fn probe_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let request = match CollectionRequest::from_query(&params, &state.default_modules) {
        Ok(request) => request,
        Err(e) => {
            state.metrics.record_invalid_request();
            debug!(error = %e, "Rejecting probe request");
            return (StatusCode::BAD_REQUEST, format!("{}\n", e)).into_response();
        }
    };

    info!(
        host = %request.target,
        modules = %request.modules,
        "Starting metrics collection of {} for {}",
        request.modules,
        request.target
    );

    let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let api_key = state.config.resolve_api_key(authorization);
    match api_key.source {
        ApiKeySource::Header => {
            debug!("Using API key from the scrape Authorization header")
        }
        ApiKeySource::CommandLine => debug!("Using API key from configuration"),
        ApiKeySource::Environment => {
            debug!("Using API key from the MOONRAKER_APIKEY environment variable")
        }
        ApiKeySource::None => debug!("API key not set"),
    }

    let recorder = ProbeRecorder::start(state.metrics.clone());
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();
    let client = MoonrakerClient::new(state.http.clone(), &request.target, api_key.key, cancel);

    let mut metrics = ProbeMetrics::new();
    let summary = Collection::new(&client)
        .run(&request.modules, &mut metrics)
        .await;
    let elapsed = recorder.finish(&summary);

    info!(
        host = %request.target,
        metrics = metrics.len(),
        failed = summary.failed.len(),
        elapsed_ms = elapsed.as_millis() as u64,
        "Finished metrics collection"
    );

    (StatusCode::OK, [(CONTENT_TYPE, TEXT_FORMAT)], metrics.render()).into_response()
}

/// Handler for the /metrics endpoint.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, TEXT_FORMAT)],
        state.metrics.render(),
    )
        .into_response()
}

/// Handler for the /health endpoint.
async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

async fn index_handler() -> Html<&'static str> {
    Html(
        r#"<html>
<head><title>Klipper Exporter</title></head>
<body>
<h1>Klipper Exporter</h1>
<p><a href="/metrics">Exporter metrics</a></p>
<p>Probe a printer: <code>/probe?target=printer.local:7125&amp;modules=process_stats&amp;modules=temperature</code></p>
</body>
</html>
"#,
    )
}

/// HTTP server configuration.
pub struct HttpServer {
    state: AppState,
    listen_addr: String,
}

impl HttpServer {
    /// Create a new HTTP server. `listen_addr` is `host:port`; the host may
    /// be a name, resolved when binding.
    pub fn new(state: AppState, listen_addr: impl Into<String>) -> Self {
        Self {
            state,
            listen_addr: listen_addr.into(),
        }
    }

    /// Run the HTTP server until the shutdown signal is received.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let router = create_router(self.state);

        let listener = tokio::net::TcpListener::bind(self.listen_addr.as_str())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;
        let local_addr = listener.local_addr()?;

        info!(addr = %local_addr, "Beginning to serve on {}", local_addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}
