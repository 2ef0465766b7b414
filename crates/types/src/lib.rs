//! # Provenet Types
//!
//! Core type definitions for the Provenet blockchain.
//!
//! This crate provides the fundamental types used throughout Provenet:
//! - [`Address`] - 20-byte account addresses
//! - [`H256`] - 32-byte hashes with Keccak256 support
//! - [`Transaction`] - Proof-of-Contribution transactions
//! - [`Block`] and [`BlockHeader`] - Block structures
//! - [`Receipt`], [`Log`] and [`Bloom`] - Execution results
//! - [`PocContextRoots`] and [`RecordContextRoots`] - Context commitments
//!
//! ## Example
//!
//! ```rust
//! use provenet_types::{Address, H256};
//!
//! // Create an address from hex
//! let addr: Address = "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb1".parse().unwrap();
//! assert!(!addr.is_zero());
//!
//! // Hash some data
//! let hash = H256::keccak256(b"hello world");
//! assert_ne!(hash, H256::NIL);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod address;
pub mod block;
pub mod hash;
pub mod receipt;
pub mod roots;
pub mod transaction;
pub mod uint;

// Re-export main types at crate root
pub use address::Address;
pub use block::{Block, BlockHeader};
pub use hash::{keccak256, keccak512, H256};
pub use receipt::{create_bloom, Bloom, Log, Receipt};
pub use roots::{PocContextRoots, RecordContextRoots};
pub use transaction::{Transaction, TxType};

/// Result type alias for Provenet types operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when working with Provenet types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid hex string
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Invalid length for a fixed-size type
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Invalid address format
    #[error("invalid address format: {0}")]
    InvalidAddress(String),

    /// Invalid hash format
    #[error("invalid hash format: {0}")]
    InvalidHash(String),

    /// Invalid transaction
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    /// RLP decoding error
    #[error("RLP decode error: {0}")]
    RlpDecode(#[from] rlp::DecoderError),
}
