//! Klipper exporter common library
//!
//! Shared types and utilities for the Klipper/Moonraker Prometheus exporter:
//!
//! - [`moonraker`] - Typed Moonraker API response model
//! - [`config`] - Logging configuration and JSON5 config loading
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod moonraker;

pub use config::{LogFormat, LogLevel, LoggingConfig, load_config, parse_config};
pub use error::{Error, Result};

/// Initialize tracing at the given level.
///
/// `RUST_LOG`, when set, takes precedence over `level`. Supports two output
/// formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
pub fn init_tracing(level: LogLevel, format: LogFormat) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    match format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
