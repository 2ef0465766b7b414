//! Account objects and their canonical leaf encoding.

use alloy_primitives::U256;
use provenet_storage::{KvStore, PrefixTrie, TrieWriter, EMPTY_ROOT};
use provenet_types::uint::{append_u256, u256_at};
use provenet_types::H256;
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use std::collections::HashMap;
use std::sync::Arc;

use crate::Result;

/// Prefix shared by every per-object storage trie; nodes are
/// content-addressed, so sharing one namespace is safe.
pub(crate) const STORAGE_PREFIX: &[u8] = b"storage-";

/// The persisted account record.
///
/// Canonical leaf encoding: RLP of
/// `{nonce, balance, contribution, records[], storageRoot, codeHash}`.
/// The code fields are retained for layout compatibility; the core
/// transaction types never populate them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountData {
    /// Monotonic counter of sent transactions
    pub nonce: u64,
    /// Transferable balance
    pub balance: U256,
    /// Accumulated Proof-of-Contribution weight
    pub contribution: U256,
    /// Record hashes owned by this account
    pub records: Vec<H256>,
    /// Root of the per-account storage trie
    pub storage_root: H256,
    /// Legacy code hash, unused by the core transaction types
    pub code_hash: H256,
}

impl Default for AccountData {
    fn default() -> Self {
        Self {
            nonce: 0,
            balance: U256::ZERO,
            contribution: U256::ZERO,
            records: Vec::new(),
            storage_root: EMPTY_ROOT,
            code_hash: H256::NIL,
        }
    }
}

impl AccountData {
    /// An account is empty when it has no nonce, no balance, no
    /// contribution and owns no records.
    pub fn is_empty(&self) -> bool {
        self.nonce == 0
            && self.balance.is_zero()
            && self.contribution.is_zero()
            && self.records.is_empty()
    }
}

impl Encodable for AccountData {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(6);
        s.append(&self.nonce);
        append_u256(s, &self.balance);
        append_u256(s, &self.contribution);
        s.begin_list(self.records.len());
        for record in &self.records {
            s.append(record);
        }
        s.append(&self.storage_root);
        s.append(&self.code_hash);
    }
}

impl Decodable for AccountData {
    fn decode(rlp: &Rlp<'_>) -> std::result::Result<Self, DecoderError> {
        if rlp.item_count()? != 6 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Self {
            nonce: rlp.val_at(0)?,
            balance: u256_at(rlp, 1)?,
            contribution: u256_at(rlp, 2)?,
            records: rlp.list_at(3)?,
            storage_root: rlp.val_at(4)?,
            code_hash: rlp.val_at(5)?,
        })
    }
}

/// A live account undergoing mutation.
///
/// Storage reads go through a two-tier cache: `cached` is read-through,
/// `dirty` holds pending writes that `update_trie` flushes into the
/// object's storage trie.
#[derive(Debug, Clone)]
pub(crate) struct AccountObject {
    pub(crate) data: AccountData,
    storage_trie: Option<PrefixTrie>,
    cached_storage: HashMap<H256, H256>,
    dirty_storage: HashMap<H256, H256>,
    /// First database read error, surfaced at commit
    pub(crate) db_err: Option<String>,
    /// Set once the object has been removed from the trie
    pub(crate) deleted: bool,
}

impl AccountObject {
    pub(crate) fn new(data: AccountData) -> Self {
        Self {
            data,
            storage_trie: None,
            cached_storage: HashMap::new(),
            dirty_storage: HashMap::new(),
            db_err: None,
            deleted: false,
        }
    }

    /// Remembers the first error it is called with.
    pub(crate) fn set_error(&mut self, err: impl ToString) {
        if self.db_err.is_none() {
            self.db_err = Some(err.to_string());
        }
    }

    fn storage_trie(&mut self, db: &Arc<dyn KvStore>) -> &mut PrefixTrie {
        let root = self.data.storage_root;
        self.storage_trie
            .get_or_insert_with(|| PrefixTrie::open(STORAGE_PREFIX, root, Arc::clone(db)))
    }

    /// Reads a storage slot through the cache.
    pub(crate) fn storage_value(&mut self, db: &Arc<dyn KvStore>, key: &H256) -> H256 {
        if let Some(value) = self.cached_storage.get(key) {
            return *value;
        }
        let result = self.storage_trie(db).try_get(key.as_bytes());
        let value = match result {
            Ok(Some(encoded)) => decode_storage_value(&encoded).unwrap_or_else(|e| {
                self.set_error(e);
                H256::NIL
            }),
            Ok(None) => H256::NIL,
            Err(e) => {
                self.set_error(e);
                H256::NIL
            }
        };
        if !value.is_nil() {
            self.cached_storage.insert(*key, value);
        }
        value
    }

    /// Writes a storage slot into the caches; the trie is updated lazily.
    pub(crate) fn set_storage_value(&mut self, key: H256, value: H256) {
        self.cached_storage.insert(key, value);
        self.dirty_storage.insert(key, value);
    }

    /// Flushes pending storage writes into the storage trie. Values are
    /// RLP encoded with leading zeros trimmed; nil values delete the slot.
    pub(crate) fn update_trie(&mut self, db: &Arc<dyn KvStore>) {
        if self.dirty_storage.is_empty() {
            return;
        }
        let pending: Vec<(H256, H256)> = self.dirty_storage.drain().collect();
        let trie = self.storage_trie(db);
        let mut first_err: Option<String> = None;
        for (key, value) in pending {
            let result = if value.is_nil() {
                trie.try_delete(key.as_bytes())
            } else {
                trie.try_update(key.as_bytes(), &encode_storage_value(&value))
            };
            if let Err(e) = result {
                if first_err.is_none() {
                    first_err = Some(e.to_string());
                }
            }
        }
        if let Some(err) = first_err {
            self.set_error(err);
        }
    }

    /// Flushes storage and refreshes the cached storage root.
    pub(crate) fn update_root(&mut self, db: &Arc<dyn KvStore>) {
        self.update_trie(db);
        if let Some(trie) = &self.storage_trie {
            self.data.storage_root = trie.root_hash();
        }
    }

    /// Commits the storage trie through the writer and refreshes the root.
    pub(crate) fn commit_storage(
        &mut self,
        db: &Arc<dyn KvStore>,
        writer: &mut dyn TrieWriter,
    ) -> Result<()> {
        self.update_trie(db);
        if let Some(trie) = &self.storage_trie {
            let root = trie.commit_to(writer)?;
            self.data.storage_root = root;
        }
        Ok(())
    }
}

fn encode_storage_value(value: &H256) -> Vec<u8> {
    let trimmed: Vec<u8> = value
        .as_bytes()
        .iter()
        .skip_while(|b| **b == 0)
        .copied()
        .collect();
    let mut s = RlpStream::new();
    s.encoder().encode_value(&trimmed);
    s.out().to_vec()
}

fn decode_storage_value(encoded: &[u8]) -> std::result::Result<H256, DecoderError> {
    let rlp = Rlp::new(encoded);
    let bytes: Vec<u8> = rlp.as_val()?;
    if bytes.len() > 32 {
        return Err(DecoderError::RlpIsTooBig);
    }
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(H256::new(out))
}
