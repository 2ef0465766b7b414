//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during configuration loading and validation
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("Failed to read config file at {path}: {source}")]
    FileRead {
        /// Path that could not be read
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML configuration
    #[error("Failed to parse TOML config: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Invalid chain ID (must be non-zero)
    #[error("Invalid chain ID: chain_id must be non-zero")]
    InvalidChainId,

    /// Block interval must be non-zero
    #[error("Invalid block interval: must be non-zero")]
    InvalidBlockInterval,

    /// Epoch interval must be a multiple of the block interval
    #[error("Invalid epoch interval {epoch_interval}: must be a non-zero multiple of block interval {block_interval}")]
    InvalidEpochInterval {
        /// Configured epoch interval
        epoch_interval: u64,
        /// Configured block interval
        block_interval: u64,
    },

    /// Validator pool upper bound must be non-zero
    #[error("Invalid max validator size: must be non-zero")]
    InvalidMaxValidatorSize,

    /// The safe candidate-pool floor must stay below the validator cap
    #[error("Invalid safe size {safe_size}: must be less than max validator size {max_validator_size}")]
    SafeSizeTooLarge {
        /// Configured safe size
        safe_size: usize,
        /// Configured validator cap
        max_validator_size: usize,
    },

    /// Contribution rewards must be non-zero
    #[error("Invalid {name}: contribution reward must be non-zero")]
    InvalidReward {
        /// Which reward was rejected
        name: &'static str,
    },

    /// Invalid log level
    #[error("Invalid log level: {0}. Valid values: trace, debug, info, warn, error")]
    InvalidLogLevel(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
