//! Main configuration module for Provenet
//!
//! This module implements the single-config philosophy where all chain
//! settings are defined in one `provenet.toml` file.

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Main configuration struct containing all Provenet settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Chain identity configuration
    #[serde(default)]
    pub chain: ChainConfig,

    /// Proof-of-Contribution consensus parameters
    #[serde(default)]
    pub consensus: ConsensusConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        info!("Loading configuration from {:?}", path);

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content)?;

        debug!("Configuration parsed successfully, validating...");
        config.validate()?;

        info!(
            chain_id = config.chain.chain_id,
            chain_name = %config.chain.chain_name,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Load configuration from a TOML string.
    ///
    /// Useful for testing or when configuration is provided as a string.
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        self.chain.validate()?;
        self.consensus.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Chain identity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Unique chain identifier
    pub chain_id: u64,
    /// Human-readable chain name
    pub chain_name: String,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: 1,
            chain_name: String::from("provenet"),
        }
    }
}

impl ChainConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.chain_id == 0 {
            return Err(ConfigError::InvalidChainId);
        }
        Ok(())
    }
}

/// Proof-of-Contribution consensus parameters.
///
/// These are fixed per network: every node must agree on them for elections
/// and mint accounting to be deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Epoch length in seconds; the validator set is stable within an epoch
    pub epoch_interval: u64,
    /// Slot length in seconds; one block per slot
    pub block_interval: u64,
    /// Upper bound on the elected validator set
    pub max_validator_size: usize,
    /// Candidate-pool floor preserved across kickouts; must stay below
    /// `max_validator_size`
    pub safe_size: usize,
    /// Timestamp of the first sealed block; the first epoch is measured
    /// from here
    pub time_of_first_block: u64,
    /// Contribution awarded for confirming a record, in base units
    pub confirmation_reward: u128,
    /// Contribution awarded for transferring a record, in base units
    pub transfer_reward: u128,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            epoch_interval: 86_400,
            block_interval: 10,
            max_validator_size: 21,
            safe_size: 15,
            time_of_first_block: 0,
            confirmation_reward: 2_000_000_000_000_000_000,
            transfer_reward: 1_000_000_000_000_000_000,
        }
    }
}

impl ConsensusConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.block_interval == 0 {
            return Err(ConfigError::InvalidBlockInterval);
        }
        if self.epoch_interval == 0 || self.epoch_interval % self.block_interval != 0 {
            return Err(ConfigError::InvalidEpochInterval {
                epoch_interval: self.epoch_interval,
                block_interval: self.block_interval,
            });
        }
        if self.max_validator_size == 0 {
            return Err(ConfigError::InvalidMaxValidatorSize);
        }
        if self.safe_size >= self.max_validator_size {
            return Err(ConfigError::SafeSizeTooLarge {
                safe_size: self.safe_size,
                max_validator_size: self.max_validator_size,
            });
        }
        if self.confirmation_reward == 0 {
            return Err(ConfigError::InvalidReward {
                name: "confirmation_reward",
            });
        }
        if self.transfer_reward == 0 {
            return Err(ConfigError::InvalidReward {
                name: "transfer_reward",
            });
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
        }
    }
}

impl LoggingConfig {
    fn validate(&self) -> ConfigResult<()> {
        match self.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(ConfigError::InvalidLogLevel(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.consensus.safe_size < config.consensus.max_validator_size);
    }

    #[test]
    fn test_from_toml() {
        let config = Config::from_toml(
            r#"
            [chain]
            chain_id = 7
            chain_name = "provenet-test"

            [consensus]
            epoch_interval = 3600
            block_interval = 10
            max_validator_size = 5
            safe_size = 3
            time_of_first_block = 0
            confirmation_reward = 2000000000000000000
            transfer_reward = 1000000000000000000

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.chain.chain_id, 7);
        assert_eq!(config.consensus.max_validator_size, 5);
        assert_eq!(config.consensus.safe_size, 3);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("provenet.toml");
        std::fs::write(
            &path,
            r#"
            [chain]
            chain_id = 3
            chain_name = "provenet-dev"
            "#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.chain.chain_id, 3);
        // Missing sections fall back to defaults
        assert_eq!(config.consensus.block_interval, 10);

        let missing = Config::load(&dir.path().join("nowhere.toml"));
        assert!(matches!(missing, Err(ConfigError::FileRead { .. })));
    }

    #[test]
    fn test_safe_size_must_stay_below_cap() {
        let mut config = Config::default();
        config.consensus.safe_size = config.consensus.max_validator_size;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SafeSizeTooLarge { .. })
        ));
    }

    #[test]
    fn test_epoch_interval_must_align() {
        let mut config = Config::default();
        config.consensus.epoch_interval = 86_401;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidEpochInterval { .. })
        ));
    }

    #[test]
    fn test_zero_rewards_rejected() {
        let mut config = Config::default();
        config.consensus.confirmation_reward = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidReward { .. })
        ));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = String::from("verbose");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }
}
