//! Provenet Storage Layer
//!
//! This crate provides the storage infrastructure for the Provenet blockchain:
//!
//! - **KvStore**: byte-addressable persistent map with batched writes,
//!   backed by RocksDB in production and a hash map in tests
//! - **PrefixTrie**: a prefixed Merkle Patricia trie; every named trie in
//!   the node shares one key-value store, disambiguated by a byte prefix
//!   on node keys
//!
//! Trie handles are cheap to clone: the node cache is content-addressed and
//! shared, so a clone is a root hash plus a reference. The consensus
//! contexts use this for their snapshot/revert discipline.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod db;
pub mod trie;

// Re-exports for convenience
pub use db::{Database, DatabaseConfig, KvStore, MemoryDb, TrieWriter, WriteBatch};
pub use trie::{PrefixTrie, TrieNode};

use provenet_types::H256;
use thiserror::Error;

/// Empty trie root (Keccak256 of the RLP encoded empty string).
///
/// A sentinel: tries report this root while they hold no entries.
pub const EMPTY_ROOT: H256 = H256::new([
    0x56, 0xe8, 0x1f, 0x17, 0x1b, 0xcc, 0x55, 0xa6, 0xff, 0x83, 0x45, 0xe6, 0x92, 0xc0, 0xf8,
    0x6e, 0x5b, 0x48, 0xe0, 0x1b, 0x99, 0x6c, 0xad, 0xc0, 0x01, 0x62, 0x2f, 0xb5, 0xe3, 0x63,
    0xb4, 0x21,
]);

/// Storage error types
#[derive(Error, Debug)]
pub enum StorageError {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Key not found
    #[error("Key not found: {0}")]
    NotFound(String),

    /// A trie node referenced by hash is neither cached nor persisted
    #[error("Missing trie node: {0}")]
    MissingNode(H256),

    /// Trie error
    #[error("Trie error: {0}")]
    Trie(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Checks whether this error is a missing-node miss, which some callers
    /// treat as "entry already absent".
    pub fn is_missing_node(&self) -> bool {
        matches!(self, StorageError::MissingNode(_))
    }
}

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;
    use provenet_types::keccak256;

    #[test]
    fn test_empty_root_constant() {
        // EMPTY_ROOT = keccak256(rlp(""))
        let computed = keccak256(&[0x80]);
        assert_eq!(computed, EMPTY_ROOT);
    }

    #[test]
    fn test_missing_node_classification() {
        assert!(StorageError::MissingNode(H256::NIL).is_missing_node());
        assert!(!StorageError::Database(String::from("boom")).is_missing_node());
    }
}
