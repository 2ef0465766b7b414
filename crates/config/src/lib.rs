//! # Provenet Configuration
//!
//! Single-file TOML configuration for Provenet nodes. All chain settings
//! live in one `provenet.toml`:
//!
//! - `[chain]` - chain identity
//! - `[consensus]` - Proof-of-Contribution constants (epoch and block
//!   intervals, validator pool sizes, contribution rewards)
//! - `[logging]` - log level and format
//!
//! Every section is validated on load; a configuration that would violate a
//! consensus invariant (for example `safe_size >= max_validator_size`) is
//! rejected before the node starts.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;

pub use config::{ChainConfig, Config, ConsensusConfig, LoggingConfig};
pub use error::{ConfigError, ConfigResult};
