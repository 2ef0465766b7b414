//! Provenet State Layer
//!
//! The dual state model: two journaled Merkle-Patricia stores plus the
//! consensus context bundles.
//!
//! - [`AccountState`] - accounts keyed by 20-byte address (nonce, balance,
//!   contribution, owned records, per-account storage)
//! - [`RecordState`] - data records keyed by 32-byte record hash (origin,
//!   owner, transaction history, status)
//! - [`PocContext`] - the five Proof-of-Contribution tries (epoch,
//!   contribution, candidate, latest-tx, mint-count)
//! - [`RecordContext`] - the three record lifecycle audit tries
//!
//! Both state stores record an undo entry in a per-transaction journal
//! before every mutation. `snapshot()` captures the journal length;
//! `revert_to_snapshot` replays entries in reverse, undoing exactly the
//! mutations made since. `finalise` flushes dirty objects into the trie and
//! invalidates all outstanding snapshots.
//!
//! None of these types are internally thread-safe: block processing is
//! single-threaded per chain head. A coarse mutex only guards `copy()` so
//! the RPC layer can take consistent snapshots concurrently.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod account;
pub mod account_state;
pub mod context;
mod journal;
pub mod record;
pub mod record_state;

pub use account::AccountData;
pub use account_state::AccountState;
pub use context::{AccountContribution, AccountLatestTx, PocContext, RecordContext};
pub use record::RecordData;
pub use record_state::RecordState;

use provenet_storage::StorageError;
use thiserror::Error;

/// Errors produced by the state layer
#[derive(Debug, Error)]
pub enum StateError {
    /// Underlying storage failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A stored value failed to decode
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Revert target does not name a live snapshot
    #[error("snapshot {0} cannot be reverted")]
    UnknownSnapshot(usize),

    /// A database read failed earlier; the error was memoized and is
    /// surfaced at commit
    #[error("deferred database read error: {0}")]
    DeferredRead(String),

    /// The epoch trie holds no validator list
    #[error("validator list missing from epoch trie")]
    MissingValidatorList,
}

/// Result type for state operations
pub type Result<T> = std::result::Result<T, StateError>;
