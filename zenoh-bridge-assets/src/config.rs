//! Configuration for the asset bridge.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use tracksight_common::{Format, LoggingConfig, ZenohConfig};

/// Environment variable holding the asset API credential (UUID).
pub const ENV_API_KEY: &str = "apikey";

/// Environment variable holding the location scope for fetches.
pub const ENV_LOCATION_ID: &str = "locationid";

/// Environment variable holding the inter-tick wait in seconds.
pub const ENV_SLEEP_DURATION: &str = "sleepdurationoinsec";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid value for environment variable '{name}': {message}")]
    Env { name: &'static str, message: String },
}

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetBridgeConfig {
    /// Zenoh connection settings
    pub zenoh: ZenohConfig,

    /// Asset-tracking settings
    pub tracking: TrackingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Asset-tracking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Base URL of the asset-location API
    pub api_base_url: String,

    /// Key expression prefix (default: "tracksight/assets")
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Output channel name appended to the prefix (default: "assetoutput")
    #[serde(default = "default_output")]
    pub output: String,

    /// Wire format for outbound messages (default: json)
    #[serde(default)]
    pub serialization: Format,

    /// Credential fallback when the environment variable is absent
    #[serde(default)]
    pub api_key: Option<Uuid>,

    /// Location fallback when the environment variable is absent
    #[serde(default)]
    pub location_id: Option<i64>,

    /// Poll interval fallback when the environment variable is absent
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
}

fn default_key_prefix() -> String {
    "tracksight/assets".to_string()
}

fn default_output() -> String {
    "assetoutput".to_string()
}

impl TrackingConfig {
    /// The fixed key asset messages are published to.
    pub fn output_key(&self) -> String {
        format!("{}/{}", self.key_prefix, self.output)
    }

    /// The key bridge status documents are published to.
    pub fn status_key(&self) -> String {
        format!("{}/@/status", self.key_prefix)
    }
}

impl AssetBridgeConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AssetBridgeConfig = json5::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tracking.api_base_url.is_empty() {
            return Err(ConfigError::Validation(
                "api_base_url must not be empty".to_string(),
            ));
        }

        if self.tracking.key_prefix.is_empty() || self.tracking.output.is_empty() {
            return Err(ConfigError::Validation(
                "key_prefix and output must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Immutable runtime settings captured once at startup.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Credential for the asset API.
    pub credential: Uuid,

    /// Location scope for fetches.
    pub location_id: i64,

    /// Inter-tick wait. Zero means busy-poll.
    pub poll_interval: Duration,
}

impl RunConfig {
    /// Capture runtime settings from the process environment.
    ///
    /// The configuration file supplies fallbacks for absent variables;
    /// with neither set, the credential is nil, the location is 0 and the
    /// wait is zero. A present but malformed value is a startup error.
    pub fn from_env(tracking: &TrackingConfig) -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok(), tracking)
    }

    fn from_lookup(
        lookup: impl Fn(&'static str) -> Option<String>,
        tracking: &TrackingConfig,
    ) -> Result<Self, ConfigError> {
        let credential = match non_empty(lookup(ENV_API_KEY)) {
            Some(raw) => raw.parse::<Uuid>().map_err(|e| ConfigError::Env {
                name: ENV_API_KEY,
                message: e.to_string(),
            })?,
            None => tracking.api_key.unwrap_or_else(Uuid::nil),
        };

        let location_id = match non_empty(lookup(ENV_LOCATION_ID)) {
            Some(raw) => raw.parse::<i64>().map_err(|e| ConfigError::Env {
                name: ENV_LOCATION_ID,
                message: e.to_string(),
            })?,
            None => tracking.location_id.unwrap_or(0),
        };

        let interval_secs = match non_empty(lookup(ENV_SLEEP_DURATION)) {
            Some(raw) => raw.parse::<u64>().map_err(|e| ConfigError::Env {
                name: ENV_SLEEP_DURATION,
                message: e.to_string(),
            })?,
            None => tracking.poll_interval_secs.unwrap_or(0),
        };

        Ok(Self {
            credential,
            location_id,
            poll_interval: Duration::from_secs(interval_secs),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
