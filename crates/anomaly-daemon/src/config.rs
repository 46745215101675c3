//! Configuration for anomalyd

use anomaly_store::StoreSettings;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Store backend
    #[serde(default)]
    pub store: StoreConfig,

    /// Anomaly lifetime settings
    #[serde(default)]
    pub anomaly: AnomalyConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    pub listen_addr: SocketAddr,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8090)),
            enable_cors: true,
        }
    }
}

/// Store backend configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Process-local store (single instance deployments, development)
    #[default]
    Memory,

    /// Redis-backed store shared by every instance
    Redis {
        /// Connection URL
        url: String,

        /// Prefix for every key the store writes
        #[serde(default = "default_key_prefix")]
        key_prefix: String,

        /// Connection timeout in milliseconds
        #[serde(default = "default_connect_timeout")]
        connect_timeout_ms: u64,

        /// Reconnect attempts
        #[serde(default = "default_retries")]
        retries: usize,
    },
}

/// Anomaly lifetime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyConfig {
    /// Visibility window in milliseconds
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,

    /// Interval between expiry sweeps in seconds, 0 disables the sweeper
    #[serde(default)]
    pub sweep_interval_secs: u64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_ttl_ms(),
            sweep_interval_secs: 0,
        }
    }
}

impl AnomalyConfig {
    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings::with_ttl(Duration::from_millis(self.ttl_ms))
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_key_prefix() -> String {
    anomaly_store::redis::DEFAULT_KEY_PREFIX.to_string()
}

fn default_connect_timeout() -> u64 {
    500
}

fn default_retries() -> usize {
    1
}

fn default_ttl_ms() -> u64 {
    u64::try_from(anomaly_store::DEFAULT_TTL.as_millis()).unwrap_or(u64::MAX)
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration from defaults, an optional file, then `ANOMALY__`
    /// environment variables (e.g. `ANOMALY__STORE__TYPE=redis`).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("ANOMALY")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no store backend can run with.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.anomaly.ttl_ms == 0 {
            return Err(config::ConfigError::Message(
                "anomaly.ttl_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
