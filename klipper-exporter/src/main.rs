//! Prometheus exporter for Klipper 3D printers.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use klipper_common::{LogFormat, LogLevel, init_tracing};
use klipper_exporter::config::API_KEY_ENV;
use klipper_exporter::{AppState, ExporterConfig, HttpServer};

/// Prometheus exporter for Klipper printers.
#[derive(Parser, Debug)]
#[command(name = "klipper-exporter")]
#[command(about = "Export Klipper/Moonraker telemetry as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Logging output level: trace, debug, info, warning, error, fatal or panic.
    #[arg(long = "logging.level")]
    logging_level: Option<String>,

    /// Log output format: text or json.
    #[arg(long = "log-format")]
    log_format: Option<String>,

    /// API key to authenticate with the Moonraker API.
    #[arg(long = "moonraker.apikey")]
    moonraker_apikey: Option<String>,

    /// Address on which to expose metrics and web interface.
    #[arg(long = "web.listen-address")]
    listen_address: Option<String>,

    /// (Deprecated) Enable debug logging. Use --logging.level instead.
    #[arg(long)]
    debug: bool,

    /// (Deprecated) Enable trace logging. Use --logging.level instead.
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(path) = &args.config {
        ExporterConfig::load_from_file(path)?
    } else {
        ExporterConfig::default()
    };

    // Command line overrides
    if let Some(level) = args.logging_level {
        config.logging.level = level;
    }
    if let Some(format) = &args.log_format {
        config.logging.format = format.parse::<LogFormat>()?;
    }
    if let Some(key) = args.moonraker_apikey {
        config.api_key = Some(key);
    }
    if let Some(listen) = args.listen_address {
        config.listen_address = listen;
    }
    config.env_api_key = std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty());

    // Initialize logging
    let mut level: LogLevel = config.logging.parsed_level()?;
    if args.debug {
        level = LogLevel::Debug;
    }
    if args.verbose {
        level = LogLevel::Trace;
    }
    init_tracing(level, config.logging.format)?;

    if args.debug {
        warn!("--debug option is deprecated, change to using '--logging.level debug'");
    }
    if args.verbose {
        warn!("--verbose option is deprecated, change to using '--logging.level trace'");
    }

    let listen_addr = config.listen_addr()?;
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        level = %level,
        default_modules = ?config.default_modules,
        "Starting Klipper exporter"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let state = AppState::new(config)?;
    let http_server = HttpServer::new(state, listen_addr);
    let mut http_task = tokio::spawn(async move { http_server.run(shutdown_rx).await });

    // Wait for shutdown signal, or for the server to exit on its own
    tokio::select! {
        result = &mut http_task => {
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => {
                    error!("HTTP server error: {}", e);
                    Err(e)
                }
                Err(e) => Err(e.into()),
            };
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    shutdown_tx.send(true)?;

    let _ = tokio::time::timeout(Duration::from_secs(5), http_task).await;

    info!("Exporter stopped");
    Ok(())
}

#[cfg(unix)]
async fn terminate() {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
