//! Per-transaction undo journals.
//!
//! Every mutation records the prior value before the change is applied.
//! `revert_to_snapshot` replays entries in reverse, so each variant carries
//! exactly the data needed to reverse its single mutation.

use alloy_primitives::U256;
use provenet_types::{Address, H256};

use crate::account::AccountObject;
use crate::record::RecordObject;

/// Undo entries for the account state.
#[derive(Debug, Clone)]
pub(crate) enum AccountEntry {
    /// A fresh object was created; undo drops it from the live set
    CreateObject { address: Address },
    /// An existing object was overwritten; undo reinstates it
    ResetObject {
        address: Address,
        prev: Box<AccountObject>,
    },
    /// Balance changed
    BalanceChange { address: Address, prev: U256 },
    /// Nonce changed
    NonceChange { address: Address, prev: u64 },
    /// Contribution changed
    ContributionChange { address: Address, prev: U256 },
    /// The owned-records set changed
    RecordsChange { address: Address, prev: Vec<H256> },
    /// A storage slot changed
    StorageChange {
        address: Address,
        key: H256,
        prev: H256,
    },
    /// A log was appended; undo drops the tail
    AddLog { tx_hash: H256 },
    /// A preimage was recorded; undo forgets it
    AddPreimage { hash: H256 },
}

/// Undo entries for the record state.
#[derive(Debug, Clone)]
pub(crate) enum RecordEntry {
    /// A fresh record object was created; undo drops it from the live set
    CreateObject { hash: H256 },
    /// An existing record object was overwritten; undo reinstates it
    ResetObject {
        hash: H256,
        prev: Box<RecordObject>,
    },
    /// Origin changed
    OriginChange { hash: H256, prev: Address },
    /// Owner changed
    OwnerChange { hash: H256, prev: Address },
    /// Status changed
    StatusChange { hash: H256, prev: u8 },
    /// The transaction history changed
    TxsChange { hash: H256, prev: Vec<H256> },
    /// A storage slot changed
    StorageChange { hash: H256, key: H256, prev: H256 },
}

/// A snapshot marker: the id handed to callers and the journal length it
/// corresponds to.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Revision {
    pub id: usize,
    pub journal_len: usize,
}
