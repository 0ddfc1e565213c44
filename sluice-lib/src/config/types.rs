use serde::Deserialize;
use std::collections::BTreeMap;

use crate::error::GatewayError;
use crate::limit::{Algorithm, RuleConfig, DEFAULT_MAX_KEYS_PER_RULE};

/// Main configuration structure, loaded from YAML
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Listener and upstream targets
    pub gateway: GatewayConfig,
    /// Rules installed at startup through the admin surface
    /// Keyed by exact request path
    #[serde(default)]
    pub default_rules: BTreeMap<String, RuleSpec>,
    /// Engine resource limits
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Address and port to listen on
    /// Example: "0.0.0.0:8080", "127.0.0.1:8080" or the ":8080" shorthand
    pub listen_addr: String,
    /// Path prefix to upstream origin mapping
    /// Example: "/api/v1" -> "http://127.0.0.1:8081"
    /// The longest matching prefix wins; requests matching no prefix get 404
    #[serde(default)]
    pub targets: BTreeMap<String, String>,
    /// Graceful shutdown grace period in seconds
    /// Default: 30
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

/// One rule as written in the configuration file.
///
/// `window_size` is a human-readable duration ("500ms", "1s", "1m"), the
/// same encoding the admin surface speaks.
#[derive(Debug, Deserialize, Clone)]
pub struct RuleSpec {
    pub algorithm: Algorithm,
    pub window_size: String,
    pub limit: u64,
}

impl RuleSpec {
    /// Parse and validate into the engine's config type.
    pub fn rule_config(&self) -> Result<RuleConfig, GatewayError> {
        let window_size = humantime::parse_duration(&self.window_size).map_err(|e| {
            GatewayError::Config(format!("invalid window_size {:?}: {e}", self.window_size))
        })?;
        let config = RuleConfig { window_size, limit: self.limit };
        config.validate().map_err(|e| GatewayError::Config(e.to_string()))?;
        Ok(config)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    /// Cap on distinct keys tracked per rule; one arbitrary entry is
    /// evicted when a new key would exceed it. 0 disables the cap.
    /// Default: 100000
    #[serde(default = "default_max_keys_per_rule")]
    pub max_keys_per_rule: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self { max_keys_per_rule: default_max_keys_per_rule() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level filter, overridable with RUST_LOG
    /// Default: "info"
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Include the emitting module path in log lines
    /// Default: false
    #[serde(default)]
    pub show_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), show_target: false }
    }
}

fn default_shutdown_grace() -> u64 {
    30
}

fn default_max_keys_per_rule() -> usize {
    DEFAULT_MAX_KEYS_PER_RULE
}

fn default_log_level() -> String {
    "info".to_string()
}
