//! Configuration module for the trading engine.
//!
//! YAML loading, environment variable interpolation and validation for
//! every engine component. Each field has a default, so an absent file or
//! section yields a runnable configuration.
//!
//! # Usage
//!
//! ```rust,ignore
//! use trading_engine::config::{Config, load_config};
//!
//! // Load from $TRADING_ENGINE_CONFIG or config.yaml
//! let config = load_config(None)?;
//!
//! // Load from custom path
//! let config = load_config(Some("custom/config.yaml"))?;
//!
//! println!("step granularity: {:?}", config.matching.granularity);
//! ```

mod banking;
mod matching;
mod messaging;
mod observability;
mod persistence;
mod recovery;
mod saga;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use banking::BankingConfig;
pub use matching::{MatchingConfig, StepGranularity};
pub use messaging::{MessagingConfig, MessagingTransport};
pub use observability::{LoggingConfig, MetricsSettings, ObservabilityConfig};
pub use persistence::PersistenceConfig;
pub use recovery::RecoveryConfig;
pub use saga::SagaConfig;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "TRADING_ENGINE_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Matching engine configuration.
    #[serde(default)]
    pub matching: MatchingConfig,
    /// Banking service configuration.
    #[serde(default)]
    pub banking: BankingConfig,
    /// Message broker configuration.
    #[serde(default)]
    pub messaging: MessagingConfig,
    /// Settlement saga configuration.
    #[serde(default)]
    pub saga: SagaConfig,
    /// Persistence configuration.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Recovery configuration for crash recovery.
    #[serde(default)]
    pub recovery: RecoveryConfig,
    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ============================================
// Configuration Loading
// ============================================

/// Load configuration from a YAML file with environment variable interpolation.
///
/// # Arguments
///
/// * `path` - Optional path to the config file. Defaults to
///   `$TRADING_ENGINE_CONFIG`, then `config.yaml`.
///
/// A missing file yields the default configuration.
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = path.map_or_else(
        || std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string()),
        str::to_string,
    );

    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path, "Config file not found, using defaults");
            let config = Config::default();
            validate_config(&config)?;
            return Ok(config);
        }
        Err(e) => {
            return Err(ConfigError::ReadError { path, source: e });
        }
    };

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string (useful for testing).
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = if interpolated.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml_bw::from_str(&interpolated)?
    };
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax.
#[allow(clippy::expect_used)] // constant pattern
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let mut result = input.to_string();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    for cap in re.captures_iter(input) {
        let Some(full_match) = cap.get(0) else {
            continue;
        };
        let Some(var_match) = cap.get(1) else {
            continue;
        };
        let full_match = full_match.as_str();
        let var_name = var_match.as_str();
        let default_value = cap.get(2).map(|m| m.as_str());

        let value = match std::env::var(var_name) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.map_or_else(String::new, str::to_string),
        };

        result = result.replace(full_match, &value);
    }

    result
}

const fn default_true() -> bool {
    true
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let matching = &config.matching;
    if matching.step_delay_min_ms > matching.step_delay_max_ms {
        return Err(ConfigError::ValidationError(
            "matching.step_delay_min_ms must not exceed step_delay_max_ms".to_string(),
        ));
    }

    let base_url = config.banking.base_url.as_str();
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(ConfigError::ValidationError(
            "banking.base_url must be an http(s) URL".to_string(),
        ));
    }

    if config.banking.token_ttl_secs == 0 {
        return Err(ConfigError::ValidationError(
            "banking.token_ttl_secs must be positive".to_string(),
        ));
    }

    if config.banking.request_timeout_secs == Some(0) {
        return Err(ConfigError::ValidationError(
            "banking.request_timeout_secs must be positive when set".to_string(),
        ));
    }

    if config.messaging.transport == MessagingTransport::Zmq {
        for (key, endpoint) in config.messaging.endpoints() {
            if !["tcp://", "ipc://", "inproc://"].iter().any(|scheme| endpoint.starts_with(scheme)) {
                return Err(ConfigError::ValidationError(format!(
                    "messaging.{key} must be a tcp://, ipc:// or inproc:// endpoint, got {endpoint}"
                )));
            }
        }
    }

    if config.persistence.enabled && config.persistence.snapshot_path.is_none() {
        return Err(ConfigError::ValidationError(
            "persistence.snapshot_path is required when persistence is enabled".to_string(),
        ));
    }

    let format = config.observability.logging.format.as_str();
    if !matches!(format, "json" | "pretty") {
        return Err(ConfigError::ValidationError(format!(
            "observability.logging.format must be json or pretty, got {format}"
        )));
    }

    Ok(())
}
