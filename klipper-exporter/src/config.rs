//! Configuration for the Klipper exporter.
//!
//! Built once at startup from an optional JSON5 file, command line flags and
//! the `MOONRAKER_APIKEY` environment variable, then shared read-only with
//! every probe.

use std::path::Path;

use klipper_common::LoggingConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::modules::{Module, ModuleSet};

/// Environment variable holding the fallback API key.
pub const API_KEY_ENV: &str = "MOONRAKER_APIKEY";

/// Authorization scheme scrapers use to pass a per-target key.
pub const AUTH_SCHEME: &str = "APIKEY";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] klipper_common::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Address to listen on. A bare `:port` binds all interfaces.
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// API key used when a scrape carries no `Authorization` header.
    #[serde(default)]
    pub api_key: Option<String>,

    /// API key read from the environment; lowest precedence.
    #[serde(skip)]
    pub env_api_key: Option<String>,

    /// Modules collected when a probe names none.
    #[serde(default = "default_modules")]
    pub default_modules: Vec<String>,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_listen_address() -> String {
    ":9101".to_string()
}

fn default_modules() -> Vec<String> {
    ModuleSet::default()
        .iter()
        .map(|m| m.as_str().to_string())
        .collect()
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            api_key: None,
            env_api_key: None,
            default_modules: default_modules(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Where the API key for a probe came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeySource {
    Header,
    CommandLine,
    Environment,
    None,
}

/// API key chosen for one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedApiKey<'a> {
    pub key: Option<&'a str>,
    pub source: ApiKeySource,
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: ExporterConfig = klipper_common::load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = klipper_common::parse_config(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr()?;

        for name in &self.default_modules {
            name.parse::<Module>()
                .map_err(|e| ConfigError::Validation(e.to_string()))?;
        }

        self.logging
            .parsed_level()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        Ok(())
    }

    /// `host:port` to bind. A bare `:port` binds all interfaces; a host name
    /// is resolved when the listener binds.
    pub fn listen_addr(&self) -> Result<String, ConfigError> {
        let invalid =
            || ConfigError::Validation(format!("Invalid listen address: {}", self.listen_address));

        let (host, port) = self.listen_address.rsplit_once(':').ok_or_else(invalid)?;
        port.parse::<u16>().map_err(|_| invalid())?;

        let host = if host.is_empty() { "0.0.0.0" } else { host };
        Ok(format!("{}:{}", host, port))
    }

    /// Modules for probes that do not specify any.
    pub fn default_module_set(&self) -> ModuleSet {
        ModuleSet::parse(&self.default_modules)
    }

    /// Pick the API key for a probe.
    ///
    /// Precedence: `Authorization: APIKEY <token>` header, then the
    /// configured key, then the environment key, else none. Empty values
    /// fall through to the next source.
    pub fn resolve_api_key<'a>(&'a self, authorization: Option<&'a str>) -> ResolvedApiKey<'a> {
        let from_header = authorization
            .and_then(|value| value.strip_prefix(AUTH_SCHEME))
            .and_then(|rest| rest.strip_prefix(' '))
            .map(str::trim)
            .filter(|key| !key.is_empty());

        let candidates = [
            (from_header, ApiKeySource::Header),
            (self.api_key.as_deref(), ApiKeySource::CommandLine),
            (self.env_api_key.as_deref(), ApiKeySource::Environment),
        ];

        candidates
            .into_iter()
            .find_map(|(key, source)| {
                key.filter(|k| !k.is_empty())
                    .map(|k| ResolvedApiKey { key: Some(k), source })
            })
            .unwrap_or(ResolvedApiKey {
                key: None,
                source: ApiKeySource::None,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config = ExporterConfig::parse("{}").unwrap();

        assert_eq!(config.listen_address, ":9101");
        assert_eq!(config.listen_addr().unwrap(), "0.0.0.0:9101");
        assert_eq!(config.default_module_set(), ModuleSet::default());
        assert_eq!(config.logging.level, "info");
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            listen_address: "127.0.0.1:9102",
            api_key: "secret",
            default_modules: ["process_stats", "network_stats", "temperature"],
            logging: {
                level: "Debug",
                format: "json"
            }
        }"#;

        let config = ExporterConfig::parse(json).unwrap();

        assert_eq!(config.listen_addr().unwrap(), "127.0.0.1:9102");
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(
            config.default_module_set(),
            ModuleSet::new([Module::ProcessStats, Module::NetworkStats, Module::Temperature])
        );
        assert_eq!(config.logging.format, klipper_common::LogFormat::Json);
    }

    #[test]
    fn test_validate_invalid_listen() {
        let result = ExporterConfig::parse(r#"{ listen_address: "not-an-address" }"#);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Invalid listen address")
        );
    }

    #[test]
    fn test_listen_address_forms() {
        let listen = |address: &str| ExporterConfig {
            listen_address: address.to_string(),
            ..Default::default()
        };

        assert_eq!(listen("localhost:9101").listen_addr().unwrap(), "localhost:9101");
        assert_eq!(listen("[::1]:9101").listen_addr().unwrap(), "[::1]:9101");
        assert!(listen("localhost:http").listen_addr().is_err());
        assert!(listen("localhost").listen_addr().is_err());
        assert!(ExporterConfig::parse(r#"{ listen_address: "printer-host:9101" }"#).is_ok());
    }

    #[test]
    fn test_validate_unknown_default_module() {
        let result = ExporterConfig::parse(r#"{ default_modules: ["gpio"] }"#);
        assert!(result.unwrap_err().to_string().contains("Unknown module 'gpio'"));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let result = ExporterConfig::parse(r#"{ logging: { level: "loud" } }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ listen_address: ":9200", api_key: "from-file" }}"#).unwrap();

        let config = ExporterConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.listen_addr().unwrap(), "0.0.0.0:9200");
        assert_eq!(config.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = ExporterConfig::load_from_file("/nonexistent/klipper-exporter.json5").unwrap_err();

        assert!(matches!(err, ConfigError::Load(_)));
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_parse_rejects_malformed_json5() {
        let err = ExporterConfig::parse("{ listen_address: ").unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }

    fn config_with_keys(cli: Option<&str>, env: Option<&str>) -> ExporterConfig {
        ExporterConfig {
            api_key: cli.map(str::to_string),
            env_api_key: env.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_api_key_header_wins() {
        let config = config_with_keys(Some("cli"), Some("env"));
        let resolved = config.resolve_api_key(Some("APIKEY header-key"));

        assert_eq!(resolved.key, Some("header-key"));
        assert_eq!(resolved.source, ApiKeySource::Header);
    }

    #[test]
    fn test_api_key_command_line_over_environment() {
        let config = config_with_keys(Some("cli"), Some("env"));
        let resolved = config.resolve_api_key(None);

        assert_eq!(resolved.key, Some("cli"));
        assert_eq!(resolved.source, ApiKeySource::CommandLine);
    }

    #[test]
    fn test_api_key_environment_fallback() {
        let config = config_with_keys(None, Some("env"));
        let resolved = config.resolve_api_key(Some("Bearer something-else"));

        assert_eq!(resolved.key, Some("env"));
        assert_eq!(resolved.source, ApiKeySource::Environment);
    }

    #[test]
    fn test_api_key_scheme_needs_separator() {
        let config = config_with_keys(Some("cli"), None);
        let resolved = config.resolve_api_key(Some("APIKEYsecret"));

        assert_eq!(resolved.key, Some("cli"));
        assert_eq!(resolved.source, ApiKeySource::CommandLine);
    }

    #[test]
    fn test_api_key_none() {
        let config = config_with_keys(Some(""), None);
        let resolved = config.resolve_api_key(Some("APIKEY "));

        assert_eq!(resolved.key, None);
        assert_eq!(resolved.source, ApiKeySource::None);
    }
}
