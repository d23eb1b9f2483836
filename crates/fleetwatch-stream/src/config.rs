//! Configuration loading and typed config structures for Fleetwatch.
//!
//! The canonical configuration lives in `fleetwatch-config.yaml`. Every field
//! has a default, so an empty document (or no file at all) yields a working
//! local setup. Store URLs, the application origin, and the port can be
//! overridden from the environment after parsing.

use std::path::Path;
use std::time::Duration;

use fleetwatch_geo::GridOptions;
use serde::Deserialize;

use crate::hub::HubConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value is out of range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level monitor configuration, mirroring `fleetwatch-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MonitorConfig {
    /// HTTP listener and connection gateway.
    #[serde(default)]
    pub server: ServerSection,

    /// Upstream data services.
    #[serde(default)]
    pub stores: StoresConfig,

    /// Tick loop tuning.
    #[serde(default)]
    pub stream: StreamConfig,

    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl MonitorConfig {
    /// Load configuration from a YAML file, then apply environment
    /// overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, then apply environment
    /// overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] or [`ConfigError::Invalid`].
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `PROBE_STORE_URL`, `ALERT_STORE_URL`,
    /// `APP_ORIGIN`, and `FLEETWATCH_PORT`.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("PROBE_STORE_URL") {
            self.stores.probe_url = val;
        }
        if let Some(val) = lookup("ALERT_STORE_URL") {
            self.stores.alert_url = val;
        }
        if let Some(val) = lookup("APP_ORIGIN") {
            self.server.app_origin = Some(val).filter(|v| !v.trim().is_empty());
        }
        if let Some(port) = lookup("FLEETWATCH_PORT").and_then(|v| v.trim().parse().ok()) {
            self.server.port = port;
        }
    }

    /// Reject values the hub cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason: &str| {
            Err(ConfigError::Invalid {
                field,
                reason: reason.to_owned(),
            })
        };

        if !self.server.route_path.starts_with('/') {
            return invalid("server.route_path", "must start with '/'");
        }
        if self.stores.probe_url.trim().is_empty() {
            return invalid("stores.probe_url", "must not be empty");
        }
        if self.stores.alert_url.trim().is_empty() {
            return invalid("stores.alert_url", "must not be empty");
        }

        let stream = &self.stream;
        if stream.tick_interval_ms == 0 {
            return invalid("stream.tick_interval_ms", "must be positive");
        }
        if !(stream.region_threshold_m.is_finite() && stream.region_threshold_m > 0.0) {
            return invalid("stream.region_threshold_m", "must be a positive number");
        }
        if stream.grid_divisions == 0 {
            return invalid("stream.grid_divisions", "must be positive");
        }
        if !(stream.max_sub_cell_deg.is_finite() && stream.max_sub_cell_deg > 0.0) {
            return invalid("stream.max_sub_cell_deg", "must be a positive number");
        }
        if stream.max_concurrent_fetches == 0 {
            return invalid("stream.max_concurrent_fetches", "must be positive");
        }
        if stream.alert_limit == 0 || stream.alert_limit > crate::correlator::MAX_ALERT_LIMIT {
            return invalid("stream.alert_limit", "must be between 1 and 200");
        }
        if stream.client_channel_capacity == 0 {
            return invalid("stream.client_channel_capacity", "must be positive");
        }
        Ok(())
    }
}

/// HTTP listener and connection gateway settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerSection {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path of the `WebSocket` subscription route.
    #[serde(default = "default_route_path")]
    pub route_path: String,

    /// Browser origin allowed to connect besides localhost. `None` admits
    /// every origin.
    #[serde(default)]
    pub app_origin: Option<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            route_path: default_route_path(),
            app_origin: None,
        }
    }
}

/// Base URLs of the upstream data services.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoresConfig {
    /// Probe Store base URL.
    #[serde(default = "default_probe_url")]
    pub probe_url: String,

    /// Alert Store base URL.
    #[serde(default = "default_alert_url")]
    pub alert_url: String,
}

impl Default for StoresConfig {
    fn default() -> Self {
        Self {
            probe_url: default_probe_url(),
            alert_url: default_alert_url(),
        }
    }
}

/// Tick loop tuning.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StreamConfig {
    /// Delay between the end of one tick and the start of the next.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Extents whose shorter edge is below this many meters are fetched
    /// without partitioning.
    #[serde(default = "default_region_threshold_m")]
    pub region_threshold_m: f64,

    /// Target number of cells along the longer edge of a partitioned extent.
    #[serde(default = "default_grid_divisions")]
    pub grid_divisions: u32,

    /// Largest sub-cell fetched in one request, in degrees per axis.
    #[serde(default = "default_max_sub_cell_deg")]
    pub max_sub_cell_deg: f64,

    /// Maximum cell fetches in flight per client.
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Maximum alerts requested per correlation.
    #[serde(default = "default_alert_limit")]
    pub alert_limit: u32,

    /// Frames buffered per client before sends wait.
    #[serde(default = "default_client_channel_capacity")]
    pub client_channel_capacity: usize,
}

impl StreamConfig {
    /// Convert into the hub's runtime configuration.
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            grid: GridOptions {
                threshold_m: self.region_threshold_m,
                divisions: self.grid_divisions,
            },
            max_sub_cell_deg: self.max_sub_cell_deg,
            max_concurrent_fetches: self.max_concurrent_fetches,
            alert_limit: self.alert_limit,
            client_channel_capacity: self.client_channel_capacity,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            region_threshold_m: default_region_threshold_m(),
            grid_divisions: default_grid_divisions(),
            max_sub_cell_deg: default_max_sub_cell_deg(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            alert_limit: default_alert_limit(),
            client_channel_capacity: default_client_channel_capacity(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (required by serde)
// ---------------------------------------------------------------------------

fn default_host() -> String {
    String::from("0.0.0.0")
}

const fn default_port() -> u16 {
    8080
}

fn default_route_path() -> String {
    String::from("/ws/probes")
}

fn default_probe_url() -> String {
    String::from("http://localhost:9001")
}

fn default_alert_url() -> String {
    String::from("http://localhost:9002")
}

const fn default_tick_interval_ms() -> u64 {
    1000
}

const fn default_region_threshold_m() -> f64 {
    fleetwatch_geo::DEFAULT_THRESHOLD_M
}

const fn default_grid_divisions() -> u32 {
    fleetwatch_geo::DEFAULT_GRID_DIVISIONS
}

const fn default_max_sub_cell_deg() -> f64 {
    1.0
}

const fn default_max_concurrent_fetches() -> usize {
    8
}

const fn default_alert_limit() -> u32 {
    crate::correlator::MAX_ALERT_LIMIT
}

const fn default_client_channel_capacity() -> usize {
    64
}

fn default_log_level() -> String {
    String::from("info")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = MonitorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.route_path, "/ws/probes");
        assert_eq!(config.stream.alert_limit, 200);
        assert_eq!(config.stream.max_concurrent_fetches, 8);
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 9090
  route_path: "/stream"
  app_origin: "https://fleet.example.com"

stores:
  probe_url: "http://probes.internal"
  alert_url: "http://alerts.internal"

stream:
  tick_interval_ms: 250
  region_threshold_m: 50000.0
  grid_divisions: 4
  max_sub_cell_deg: 0.5
  max_concurrent_fetches: 2
  alert_limit: 50
  client_channel_capacity: 16

logging:
  level: "debug"
"#;
        let config: MonitorConfig = serde_yml::from_str(yaml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.app_origin.as_deref(), Some("https://fleet.example.com"));
        assert_eq!(config.stores.alert_url, "http://alerts.internal");
        assert_eq!(config.logging.level, "debug");

        let hub = config.stream.hub_config();
        assert_eq!(hub.tick_interval, Duration::from_millis(250));
        assert_eq!(hub.grid.divisions, 4);
        assert_eq!(hub.max_concurrent_fetches, 2);
        assert_eq!(hub.alert_limit, 50);
    }

    #[test]
    fn empty_yaml_uses_defaults() {
        let config: MonitorConfig = serde_yml::from_str("{}").unwrap();
        let defaults = MonitorConfig::default();
        assert_eq!(config, defaults);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = "stream:\n  tick_interval_ms: 500\n";
        let config: MonitorConfig = serde_yml::from_str(yaml).unwrap();
        assert_eq!(config.stream.tick_interval_ms, 500);
        assert_eq!(config.stream.grid_divisions, 8);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn overrides_replace_stores_origin_and_port() {
        let env: BTreeMap<&str, &str> = [
            ("PROBE_STORE_URL", "http://p"),
            ("ALERT_STORE_URL", "http://a"),
            ("APP_ORIGIN", "https://app"),
            ("FLEETWATCH_PORT", "7000"),
        ]
        .into();
        let mut config = MonitorConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| (*v).to_owned()));

        assert_eq!(config.stores.probe_url, "http://p");
        assert_eq!(config.stores.alert_url, "http://a");
        assert_eq!(config.server.app_origin.as_deref(), Some("https://app"));
        assert_eq!(config.server.port, 7000);
    }

    #[test]
    fn unparsable_port_override_is_ignored() {
        let mut config = MonitorConfig::default();
        config.apply_overrides(|key| (key == "FLEETWATCH_PORT").then(|| "eighty".to_owned()));
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut config = MonitorConfig::default();
        config.stream.tick_interval_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "stream.tick_interval_ms", .. })
        ));

        let mut config = MonitorConfig::default();
        config.stream.alert_limit = 500;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "stream.alert_limit", .. })
        ));

        let mut config = MonitorConfig::default();
        config.stream.region_threshold_m = -1.0;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.server.route_path = String::from("ws");
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        assert!(matches!(
            MonitorConfig::parse("stream: [not, a, map]"),
            Err(ConfigError::Yaml { .. })
        ));
    }
}
