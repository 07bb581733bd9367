//! Effective configuration with provenance
//!
//! Records the merged configuration plus where each layer came from, so a
//! run can report exactly which settings it used.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

use super::defaults::CoordinatorConfig;
use super::merge::merge_layers;

/// Origin of a configuration layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Cli,
}

/// A contributing layer with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 of the raw file bytes (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Merged configuration, typed settings and provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub created_at: DateTime<Utc>,

    /// The merged configuration object
    pub config: Value,

    /// Contributing layers in precedence order
    pub sources: Vec<ConfigSource>,

    #[serde(skip)]
    pub settings: CoordinatorConfig,
}

impl EffectiveConfig {
    /// Build from built-in defaults, an optional TOML file and CLI overrides
    pub fn build(config_path: Option<&Path>, cli_overrides: Option<Value>) -> Result<Self, ConfigError> {
        let mut layers = vec![CoordinatorConfig::default().to_value()];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        if let Some(path) = config_path {
            let (value, digest) = Self::load_toml_file(path)?;
            layers.push(value);
            sources.push(ConfigSource {
                origin: ConfigOrigin::File,
                path: Some(path.to_string_lossy().to_string()),
                digest: Some(digest),
            });
        }

        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let merged = merge_layers(layers);
        let settings: CoordinatorConfig = serde_json::from_value(merged.clone())
            .map_err(|e| ConfigError::Parse(format!("invalid setting: {}", e)))?;
        Self::validate(&settings)?;

        Ok(Self {
            created_at: Utc::now(),
            config: merged,
            sources,
            settings,
        })
    }

    /// Read a TOML file, returning its value and the digest of its bytes
    fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
        let bytes = fs::read(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        let digest = hex::encode(Sha256::digest(&bytes));

        let contents = String::from_utf8(bytes)
            .map_err(|e| ConfigError::Parse(format!("Invalid UTF-8: {}", e)))?;
        let value: Value = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(format!("TOML parse error: {}", e)))?;

        Ok((value, digest))
    }

    fn validate(settings: &CoordinatorConfig) -> Result<(), ConfigError> {
        const MAX_TIMEOUT_MS: u64 = 600_000;

        for (key, value) in [
            ("rpc.cancel_timeout_ms", settings.rpc.cancel_timeout_ms),
            ("rpc.submit_timeout_ms", settings.rpc.submit_timeout_ms),
            ("settle_wait_ms", settings.settle_wait_ms),
        ] {
            if value == 0 || value > MAX_TIMEOUT_MS {
                return Err(ConfigError::Validation(format!(
                    "{} must be in (0, {}], got {}",
                    key, MAX_TIMEOUT_MS, value
                )));
            }
        }

        if !(1..=100).contains(&settings.max_attempts) {
            return Err(ConfigError::Validation(format!(
                "max_attempts must be in [1, 100], got {}",
                settings.max_attempts
            )));
        }

        if !matches!(
            settings.log_level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(ConfigError::Validation(format!(
                "log_level must be one of trace, debug, info, warn, error, got {:?}",
                settings.log_level
            )));
        }

        Ok(())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Get a config value by dot-separated path
    pub fn get(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(&self.config, |current, part| current.get(part))
    }

    pub fn get_u64(&self, path: &str) -> Option<u64> {
        self.get(path).and_then(|v| v.as_u64())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),
}
