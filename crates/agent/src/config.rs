use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

use domain::models::{MAX_RISK_LEVEL, MIN_RISK_LEVEL};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub device: DeviceConfig,
}

/// Status surface (health, upload status, metrics).
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Upload cycle timing.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Delay between cycle completions
    #[serde(default = "default_upload_interval_millis")]
    pub interval_millis: u64,

    /// Inclusive lower bound of riskLevel that triggers an alert
    #[serde(default = "default_high_risk_threshold")]
    pub high_risk_threshold: i32,

    /// Growth factor of the retry delay per consecutive failure
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Upper bound of the retry delay, also used after permanent failures
    #[serde(default = "default_max_backoff_millis")]
    pub max_backoff_millis: u64,

    /// Fraction of the backoff headroom randomized away
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,

    /// How long shutdown waits for timelines to finish
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl UploadConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_millis)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_millis)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            interval_millis: default_upload_interval_millis(),
            high_risk_threshold: default_high_risk_threshold(),
            backoff_multiplier: default_backoff_multiplier(),
            max_backoff_millis: default_max_backoff_millis(),
            jitter_ratio: default_jitter_ratio(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

/// Remote analysis endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// Base URL; requests go to `{base_url}/api/analyze`
    pub base_url: String,

    /// Request timeout in milliseconds
    #[serde(default = "default_analysis_timeout_ms")]
    pub timeout_ms: u64,

    /// Optional API key sent as `X-API-Key`
    #[serde(default)]
    pub api_key: Option<String>,

    /// Number of failures before circuit breaker opens
    #[serde(default = "default_circuit_breaker_failures")]
    pub circuit_breaker_failures: u32,

    /// Seconds to keep circuit breaker open before retry
    #[serde(default = "default_circuit_breaker_reset_secs")]
    pub circuit_breaker_reset_secs: u64,
}

/// Alert delivery. Without a webhook URL and secret alerts are only logged.
#[derive(Debug, Clone, Deserialize)]
pub struct AlertsConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default)]
    pub webhook_secret: Option<String>,

    #[serde(default = "default_webhook_timeout_secs")]
    pub webhook_timeout_secs: u64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            webhook_secret: None,
            webhook_timeout_secs: default_webhook_timeout_secs(),
        }
    }
}

impl AlertsConfig {
    /// Webhook URL and secret, when both are configured.
    pub fn webhook(&self) -> Option<(&str, &str)> {
        match (self.webhook_url.as_deref(), self.webhook_secret.as_deref()) {
            (Some(url), Some(secret)) if !url.is_empty() && !secret.is_empty() => {
                Some((url, secret))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    /// Directory holding one `<device_id>.json` snapshot per device
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            snapshot_dir: default_snapshot_dir(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceConfig {
    /// Devices to monitor. Empty means one identifier generated at startup.
    #[serde(default)]
    pub ids: Vec<String>,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8090
}
fn default_request_timeout() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_upload_interval_millis() -> u64 {
    900_000
}
fn default_high_risk_threshold() -> i32 {
    7
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_max_backoff_millis() -> u64 {
    3_600_000
}
fn default_jitter_ratio() -> f64 {
    0.1
}
fn default_shutdown_timeout_secs() -> u64 {
    10
}
fn default_analysis_timeout_ms() -> u64 {
    30000
}
fn default_circuit_breaker_failures() -> u32 {
    5
}
fn default_circuit_breaker_reset_secs() -> u64 {
    300
}
fn default_webhook_timeout_secs() -> u64 {
    5
}
fn default_snapshot_dir() -> String {
    "data/snapshots".to_string()
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with GP__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("GP")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("device.ids")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Load configuration for testing with custom overrides.
    ///
    /// This method creates a config entirely from defaults and overrides,
    /// without relying on config files (which may not be accessible during tests).
    #[cfg(test)]
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        // Embed defaults directly to avoid file system dependency in tests
        let defaults = r#"
            [server]
            host = "0.0.0.0"
            port = 8090
            request_timeout_secs = 30

            [logging]
            level = "info"
            format = "json"

            [analysis]
            base_url = "http://localhost:5000"
            timeout_ms = 30000
            circuit_breaker_failures = 5
            circuit_breaker_reset_secs = 300

            [upload]
            interval_millis = 900000
            high_risk_threshold = 7
            backoff_multiplier = 2.0
            max_backoff_millis = 3600000
            jitter_ratio = 0.1
            shutdown_timeout_secs = 10

            [collector]
            snapshot_dir = "data/snapshots"
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        // Skip validation in tests to allow partial configs
        Ok(cfg)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.analysis.base_url.trim().is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "GP__ANALYSIS__BASE_URL environment variable must be set".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        let upload = &self.upload;
        if upload.interval_millis == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "upload.interval_millis must be greater than 0".to_string(),
            ));
        }

        if !(MIN_RISK_LEVEL..=MAX_RISK_LEVEL).contains(&upload.high_risk_threshold) {
            return Err(ConfigValidationError::InvalidValue(format!(
                "upload.high_risk_threshold must be between {} and {}",
                MIN_RISK_LEVEL, MAX_RISK_LEVEL
            )));
        }

        if !upload.backoff_multiplier.is_finite() || upload.backoff_multiplier < 1.0 {
            return Err(ConfigValidationError::InvalidValue(
                "upload.backoff_multiplier must be at least 1.0".to_string(),
            ));
        }

        if upload.max_backoff_millis < upload.interval_millis {
            return Err(ConfigValidationError::InvalidValue(
                "upload.max_backoff_millis cannot be lower than upload.interval_millis"
                    .to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&upload.jitter_ratio) {
            return Err(ConfigValidationError::InvalidValue(
                "upload.jitter_ratio must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.analysis.circuit_breaker_failures == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "analysis.circuit_breaker_failures must be greater than 0".to_string(),
            ));
        }

        if self.alerts.webhook_url.is_some() && self.alerts.webhook().is_none() {
            return Err(ConfigValidationError::MissingRequired(
                "alerts.webhook_secret is required when alerts.webhook_url is set".to_string(),
            ));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigValidationError> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| ConfigValidationError::InvalidValue(format!("Invalid socket address: {e}")))
    }
}
