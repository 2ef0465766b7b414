//! Record objects and their canonical leaf encoding.

use provenet_storage::{KvStore, PrefixTrie, TrieWriter, EMPTY_ROOT};
use provenet_types::{Address, H256};
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use std::collections::HashMap;
use std::sync::Arc;

use crate::account::STORAGE_PREFIX;
use crate::Result;

/// A record is transferable while its status is zero; nonzero values are
/// reserved for locked states.
pub const RECORD_STATUS_TRANSFERABLE: u8 = 0;

/// The persisted record.
///
/// Canonical leaf encoding: RLP of
/// `{origin, owner, txs[], status, storageRoot}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordData {
    /// Address that first confirmed (created) the record
    pub origin: Address,
    /// Address currently owning the record
    pub owner: Address,
    /// Transaction hashes that touched this record, in order
    pub txs: Vec<H256>,
    /// Lifecycle status; zero means transferable
    pub status: u8,
    /// Root of the per-record storage trie
    pub storage_root: H256,
}

impl Default for RecordData {
    fn default() -> Self {
        Self {
            origin: Address::ZERO,
            owner: Address::ZERO,
            txs: Vec::new(),
            status: RECORD_STATUS_TRANSFERABLE,
            storage_root: EMPTY_ROOT,
        }
    }
}

impl Encodable for RecordData {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(5);
        s.append(&self.origin);
        s.append(&self.owner);
        s.begin_list(self.txs.len());
        for tx in &self.txs {
            s.append(tx);
        }
        s.append(&self.status);
        s.append(&self.storage_root);
    }
}

impl Decodable for RecordData {
    fn decode(rlp: &Rlp<'_>) -> std::result::Result<Self, DecoderError> {
        if rlp.item_count()? != 5 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Self {
            origin: rlp.val_at(0)?,
            owner: rlp.val_at(1)?,
            txs: rlp.list_at(2)?,
            status: rlp.val_at(3)?,
            storage_root: rlp.val_at(4)?,
        })
    }
}

/// A live record undergoing mutation.
///
/// Records are never deleted; once confirmed, a record hash stays in the
/// trie for the lifetime of the chain.
#[derive(Debug, Clone)]
pub(crate) struct RecordObject {
    pub(crate) data: RecordData,
    storage_trie: Option<PrefixTrie>,
    cached_storage: HashMap<H256, H256>,
    dirty_storage: HashMap<H256, H256>,
    pub(crate) db_err: Option<String>,
}

impl RecordObject {
    pub(crate) fn new(data: RecordData) -> Self {
        Self {
            data,
            storage_trie: None,
            cached_storage: HashMap::new(),
            dirty_storage: HashMap::new(),
            db_err: None,
        }
    }

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
            Ok(Some(encoded)) => H256::from_slice(&encoded).unwrap_or_else(|e| {
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

    pub(crate) fn set_storage_value(&mut self, key: H256, value: H256) {
        self.cached_storage.insert(key, value);
        self.dirty_storage.insert(key, value);
    }

    pub(crate) fn update_root(&mut self, db: &Arc<dyn KvStore>) {
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
                trie.try_update(key.as_bytes(), value.as_bytes())
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
        if let Some(trie) = &self.storage_trie {
            self.data.storage_root = trie.root_hash();
        }
    }

    pub(crate) fn commit_storage(
        &mut self,
        db: &Arc<dyn KvStore>,
        writer: &mut dyn TrieWriter,
    ) -> Result<()> {
        self.update_root(db);
        if let Some(trie) = &self.storage_trie {
            let root = trie.commit_to(writer)?;
            self.data.storage_root = root;
        }
        Ok(())
    }
}
