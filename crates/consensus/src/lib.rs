//! Provenet Proof-of-Contribution Consensus
//!
//! Validators are elected once per epoch from a candidate pool, weighted by
//! accumulated contribution scores, and rotated deterministically within
//! the epoch to seal blocks.
//!
//! - [`EpochConfig`] - consensus constants (epoch/slot intervals, validator
//!   pool sizes)
//! - [`EpochContext`] - the election machinery: counting contributions,
//!   kicking out under-producing validators, the deterministic shuffle
//! - [`PocEngine`] - block finalize glue and the irreversibility marker
//! - [`PocApi`] - the node-facing query surface over committed headers

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod api;
pub mod engine;
pub mod epoch;

pub use api::{ChainReader, PocApi};
pub use engine::PocEngine;
pub use epoch::{EpochConfig, EpochContext};

use provenet_state::StateError;
use provenet_types::Address;
use thiserror::Error;

/// Errors produced by the consensus engine
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// A queried block is not known to the chain
    #[error("unknown block")]
    UnknownBlock,

    /// Block timestamp does not sit on a block-interval boundary
    #[error("invalid mint block time")]
    InvalidMintBlockTime,

    /// The candidate pool is empty
    #[error("no candidates")]
    NoCandidates,

    /// Not enough candidates to elect a validator set
    #[error("too few candidates: got {got}, need at least {need}")]
    TooFewCandidates {
        /// Candidates available
        got: usize,
        /// The safe pool floor
        need: usize,
    },

    /// Kickout was invoked while no validator list exists
    #[error("no validator could be kicked out")]
    NoValidatorsToKickout,

    /// The validator list is empty where one is required
    #[error("no validators")]
    NoValidators,

    /// A block was sealed by the wrong validator for its slot
    #[error("invalid block validator: expected {expected}, got {got}")]
    InvalidBlockValidator {
        /// Validator the slot belongs to
        expected: Address,
        /// Validator named in the header
        got: Address,
    },

    /// The epoch configuration violates a consensus invariant
    #[error("invalid epoch config: {0}")]
    InvalidEpochConfig(String),

    /// State-layer failure
    #[error(transparent)]
    State(#[from] StateError),
}

/// Result type for consensus operations
pub type Result<T> = std::result::Result<T, ConsensusError>;
