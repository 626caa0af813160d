//! Configuration for the stakehouse service.
//!
//! Settings come from a TOML file, are overridden by `STAKEHOUSE_*`
//! environment variables, and are validated before use.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("failed to save configuration: {0}")]
    SaveFailed(String),

    #[error("invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("missing required field: {0}")]
    MissingRequired(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StakehouseConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub listen_address: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./stakehouse_data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Smallest accepted stake, in cents.
    pub min_stake_cents: u64,
    /// Largest accepted stake, in cents.
    pub max_stake_cents: u64,
    /// Attempts for a resolve-time ledger write before giving up.
    pub ledger_retry_attempts: u32,
    /// Speedrun multiplier tick length in milliseconds.
    pub speedrun_tick_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_stake_cents: 10,
            max_stake_cents: 1_000_000,
            ledger_retry_attempts: 3,
            speedrun_tick_ms: 150,
        }
    }
}

/// Configuration loader with environment variable support.
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables.
    pub fn load(&self) -> Result<StakehouseConfig, ConfigError> {
        let mut config = if let Some(ref path) = self.config_path {
            self.load_from_file(path)?
        } else {
            StakehouseConfig::default()
        };

        self.apply_env_overrides(&mut config)?;
        self.validate(&config)?;

        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> Result<StakehouseConfig, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::LoadFailed(format!("failed to parse TOML: {}", e)))
    }

    fn apply_env_overrides(&self, config: &mut StakehouseConfig) -> Result<(), ConfigError> {
        if let Ok(addr) = env::var("STAKEHOUSE_API_ADDRESS") {
            config.api.listen_address = addr;
        }
        if let Ok(port) = env::var("STAKEHOUSE_API_PORT") {
            config.api.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                field: "STAKEHOUSE_API_PORT".to_string(),
                value: port,
                reason: "invalid port number".to_string(),
            })?;
        }
        if let Ok(data_dir) = env::var("STAKEHOUSE_DATA_DIR") {
            config.storage.data_dir = data_dir;
        }
        if let Ok(max_stake) = env::var("STAKEHOUSE_MAX_STAKE_CENTS") {
            config.engine.max_stake_cents =
                max_stake.parse().map_err(|_| ConfigError::InvalidValue {
                    field: "STAKEHOUSE_MAX_STAKE_CENTS".to_string(),
                    value: max_stake,
                    reason: "invalid amount".to_string(),
                })?;
        }

        Ok(())
    }

    fn validate(&self, config: &StakehouseConfig) -> Result<(), ConfigError> {
        if config.api.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "api.port".to_string(),
                value: "0".to_string(),
                reason: "port cannot be zero".to_string(),
            });
        }

        if config.storage.data_dir.is_empty() {
            return Err(ConfigError::MissingRequired("storage.data_dir".to_string()));
        }

        if config.engine.min_stake_cents == 0 {
            return Err(ConfigError::InvalidValue {
                field: "engine.min_stake_cents".to_string(),
                value: "0".to_string(),
                reason: "minimum stake must be positive".to_string(),
            });
        }

        if config.engine.max_stake_cents < config.engine.min_stake_cents {
            return Err(ConfigError::InvalidValue {
                field: "engine.max_stake_cents".to_string(),
                value: config.engine.max_stake_cents.to_string(),
                reason: "maximum stake below minimum stake".to_string(),
            });
        }

        if config.engine.ledger_retry_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "engine.ledger_retry_attempts".to_string(),
                value: "0".to_string(),
                reason: "at least one attempt is required".to_string(),
            });
        }

        if config.engine.speedrun_tick_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "engine.speedrun_tick_ms".to_string(),
                value: "0".to_string(),
                reason: "tick length must be positive".to_string(),
            });
        }

        Ok(())
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, config: &StakehouseConfig, path: &str) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigError::SaveFailed(format!("failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string)
            .map_err(|e| ConfigError::SaveFailed(format!("failed to write to {}: {}", path, e)))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = StakehouseConfig::default();
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.engine.speedrun_tick_ms, 150);
        assert!(config.engine.max_stake_cents >= config.engine.min_stake_cents);
    }

    #[test]
    fn test_config_validation() {
        let loader = ConfigLoader::new();
        let mut config = StakehouseConfig::default();
        assert!(loader.validate(&config).is_ok());

        config.api.port = 0;
        assert!(loader.validate(&config).is_err());

        config.api.port = 8080;
        config.engine.max_stake_cents = config.engine.min_stake_cents - 1;
        assert!(loader.validate(&config).is_err());
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();

        let original = StakehouseConfig::default();
        let loader = ConfigLoader::new();
        loader.save(&original, path).unwrap();

        let loaded = ConfigLoader::new().with_path(path).load().unwrap();
        assert_eq!(loaded.api.port, original.api.port);
        assert_eq!(loaded.engine.max_stake_cents, original.engine.max_stake_cents);
    }
}
