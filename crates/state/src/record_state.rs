//! The journaled record state store.
//!
//! An MPT keyed by 32-byte record hash holding [`RecordData`] leaves.
//! Mirrors the account store's shape: journaled mutations, snapshot/revert,
//! finalise, intermediate root and commit. Records are created by
//! confirmation transactions and never deleted.

use parking_lot::Mutex;
use provenet_storage::{KvStore, PrefixTrie, TrieWriter};
use provenet_types::{Address, H256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{trace, warn};

use crate::journal::{RecordEntry, Revision};
use crate::record::{RecordData, RecordObject};
use crate::{Result, StateError};

/// Key prefix of the record trie in the shared key-value store.
const RECORD_PREFIX: &[u8] = b"record-";

/// The journaled record state.
pub struct RecordState {
    db: Arc<dyn KvStore>,
    trie: PrefixTrie,

    objects: HashMap<H256, RecordObject>,
    dirty: HashSet<H256>,

    db_err: Option<String>,

    journal: Vec<RecordEntry>,
    revisions: Vec<Revision>,
    next_revision_id: usize,

    copy_lock: Arc<Mutex<()>>,
}

impl RecordState {
    /// Opens the record state at the given root.
    pub fn new(root: H256, db: Arc<dyn KvStore>) -> Self {
        let trie = PrefixTrie::open(RECORD_PREFIX, root, Arc::clone(&db));
        Self {
            db,
            trie,
            objects: HashMap::new(),
            dirty: HashSet::new(),
            db_err: None,
            journal: Vec::new(),
            revisions: Vec::new(),
            next_revision_id: 0,
            copy_lock: Arc::new(Mutex::new(())),
        }
    }

    fn set_error(&mut self, err: impl ToString) {
        if self.db_err.is_none() {
            self.db_err = Some(err.to_string());
        }
    }

    fn load_object(&mut self, hash: &H256) -> bool {
        if self.objects.contains_key(hash) {
            return true;
        }
        match self.trie.try_get(hash.as_bytes()) {
            Ok(Some(encoded)) => match rlp::decode::<RecordData>(&encoded) {
                Ok(data) => {
                    self.objects.insert(*hash, RecordObject::new(data));
                    true
                }
                Err(e) => {
                    warn!(record = %hash, error = %e, "Failed to decode record");
                    false
                }
            },
            Ok(None) => false,
            Err(e) => {
                self.set_error(e);
                false
            }
        }
    }

    /// Reports whether a record with this hash exists.
    pub fn exist(&mut self, hash: &H256) -> bool {
        self.load_object(hash)
    }

    /// Explicitly creates a record object, overwriting any existing one.
    ///
    /// When a record already exists its origin is carried over to the new
    /// object.
    pub fn create_record(&mut self, hash: H256) {
        let prev = if self.load_object(&hash) {
            self.objects.get(&hash).cloned()
        } else {
            None
        };
        let mut fresh = RecordObject::new(RecordData::default());
        match prev {
            Some(prev) => {
                fresh.data.origin = prev.data.origin;
                self.journal.push(RecordEntry::ResetObject {
                    hash,
                    prev: Box::new(prev),
                });
            }
            None => self.journal.push(RecordEntry::CreateObject { hash }),
        }
        self.objects.insert(hash, fresh);
        self.dirty.insert(hash);
        trace!(record = %hash, "Created record");
    }

    /// Returns the record's current data, if it exists.
    pub fn get_record(&mut self, hash: &H256) -> Option<RecordData> {
        if self.load_object(hash) {
            self.objects.get(hash).map(|obj| obj.data.clone())
        } else {
            None
        }
    }

    /// Returns the record's origin, the zero address if absent.
    pub fn get_origin(&mut self, hash: &H256) -> Address {
        self.get_record(hash)
            .map(|data| data.origin)
            .unwrap_or(Address::ZERO)
    }

    /// Returns the record's owner, the zero address if absent.
    pub fn get_owner(&mut self, hash: &H256) -> Address {
        self.get_record(hash)
            .map(|data| data.owner)
            .unwrap_or(Address::ZERO)
    }

    /// Returns the record's status, `None` if the record does not exist.
    pub fn get_status(&mut self, hash: &H256) -> Option<u8> {
        self.get_record(hash).map(|data| data.status)
    }

    /// Returns the record's transaction history.
    pub fn get_txs(&mut self, hash: &H256) -> Vec<H256> {
        self.get_record(hash).map(|data| data.txs).unwrap_or_default()
    }

    /// Sets the record's origin.
    pub fn set_origin(&mut self, hash: H256, origin: Address) {
        if !self.load_object(&hash) {
            return;
        }
        if let Some(obj) = self.objects.get_mut(&hash) {
            self.journal.push(RecordEntry::OriginChange {
                hash,
                prev: obj.data.origin,
            });
            obj.data.origin = origin;
            self.dirty.insert(hash);
        }
    }

    /// Sets the record's owner.
    pub fn set_owner(&mut self, hash: H256, owner: Address) {
        if !self.load_object(&hash) {
            return;
        }
        if let Some(obj) = self.objects.get_mut(&hash) {
            self.journal.push(RecordEntry::OwnerChange {
                hash,
                prev: obj.data.owner,
            });
            obj.data.owner = owner;
            self.dirty.insert(hash);
        }
    }

    /// Sets the record's status.
    pub fn set_status(&mut self, hash: H256, status: u8) {
        if !self.load_object(&hash) {
            return;
        }
        if let Some(obj) = self.objects.get_mut(&hash) {
            self.journal.push(RecordEntry::StatusChange {
                hash,
                prev: obj.data.status,
            });
            obj.data.status = status;
            self.dirty.insert(hash);
        }
    }

    /// Replaces the record's transaction history.
    pub fn set_txs(&mut self, hash: H256, txs: Vec<H256>) {
        if !self.load_object(&hash) {
            return;
        }
        if let Some(obj) = self.objects.get_mut(&hash) {
            self.journal.push(RecordEntry::TxsChange {
                hash,
                prev: obj.data.txs.clone(),
            });
            obj.data.txs = txs;
            self.dirty.insert(hash);
        }
    }

    /// Appends a transaction hash to the record's history. The history is
    /// append-only for the record's lifetime.
    pub fn add_tx_hash(&mut self, hash: H256, tx_hash: H256) {
        if !self.load_object(&hash) {
            return;
        }
        if let Some(obj) = self.objects.get_mut(&hash) {
            self.journal.push(RecordEntry::TxsChange {
                hash,
                prev: obj.data.txs.clone(),
            });
            obj.data.txs.push(tx_hash);
            self.dirty.insert(hash);
        }
    }

    /// Reads a per-record storage slot.
    pub fn get_storage(&mut self, hash: &H256, key: &H256) -> H256 {
        if !self.load_object(hash) {
            return H256::NIL;
        }
        match self.objects.get_mut(hash) {
            Some(obj) => obj.storage_value(&self.db, key),
            None => H256::NIL,
        }
    }

    /// Writes a per-record storage slot.
    pub fn set_storage(&mut self, hash: H256, key: H256, value: H256) {
        if !self.load_object(&hash) {
            return;
        }
        if let Some(obj) = self.objects.get_mut(&hash) {
            let prev = obj.storage_value(&self.db, &key);
            self.journal.push(RecordEntry::StorageChange { hash, key, prev });
            obj.set_storage_value(key, value);
            self.dirty.insert(hash);
        }
    }

    /// Returns an identifier for the current revision of the state.
    pub fn snapshot(&mut self) -> usize {
        let id = self.next_revision_id;
        self.next_revision_id += 1;
        self.revisions.push(Revision {
            id,
            journal_len: self.journal.len(),
        });
        id
    }

    /// Reverts all state changes made since the given revision.
    pub fn revert_to_snapshot(&mut self, id: usize) -> Result<()> {
        let idx = self.revisions.partition_point(|r| r.id < id);
        if idx == self.revisions.len() || self.revisions[idx].id != id {
            return Err(StateError::UnknownSnapshot(id));
        }
        let target = self.revisions[idx].journal_len;

        while self.journal.len() > target {
            if let Some(entry) = self.journal.pop() {
                self.undo(entry);
            }
        }
        self.revisions.truncate(idx);
        Ok(())
    }

    fn undo(&mut self, entry: RecordEntry) {
        match entry {
            RecordEntry::CreateObject { hash } => {
                self.objects.remove(&hash);
                self.dirty.remove(&hash);
            }
            RecordEntry::ResetObject { hash, prev } => {
                self.objects.insert(hash, *prev);
            }
            RecordEntry::OriginChange { hash, prev } => {
                if let Some(obj) = self.objects.get_mut(&hash) {
                    obj.data.origin = prev;
                }
            }
            RecordEntry::OwnerChange { hash, prev } => {
                if let Some(obj) = self.objects.get_mut(&hash) {
                    obj.data.owner = prev;
                }
            }
            RecordEntry::StatusChange { hash, prev } => {
                if let Some(obj) = self.objects.get_mut(&hash) {
                    obj.data.status = prev;
                }
            }
            RecordEntry::TxsChange { hash, prev } => {
                if let Some(obj) = self.objects.get_mut(&hash) {
                    obj.data.txs = prev;
                }
            }
            RecordEntry::StorageChange { hash, key, prev } => {
                if let Some(obj) = self.objects.get_mut(&hash) {
                    obj.set_storage_value(key, prev);
                }
            }
        }
    }

    /// Flushes dirty records into the trie and clears the journal.
    ///
    /// Records are never deleted, so the `delete_empty` convention of the
    /// account store does not apply here.
    pub fn finalise(&mut self) {
        let hashes: Vec<H256> = self.dirty.iter().copied().collect();
        for hash in hashes {
            let Some(obj) = self.objects.get_mut(&hash) else {
                continue;
            };
            obj.update_root(&self.db);
            let encoded = rlp::encode(&obj.data);
            if let Err(e) = self.trie.try_update(hash.as_bytes(), &encoded) {
                if self.db_err.is_none() {
                    self.db_err = Some(e.to_string());
                }
            }
        }
        self.clear_journal();
    }

    /// Computes the current root hash of the record trie, finalising first.
    pub fn intermediate_root(&mut self) -> H256 {
        self.finalise();
        self.trie.root_hash()
    }

    /// Writes the record state through the given writer and returns the
    /// new root. Memoized database read errors are surfaced here.
    pub fn commit_to(&mut self, writer: &mut dyn TrieWriter) -> Result<H256> {
        if let Some(err) = self.db_err.take() {
            return Err(StateError::DeferredRead(err));
        }

        let hashes: Vec<H256> = self.dirty.iter().copied().collect();
        for hash in hashes {
            let Some(obj) = self.objects.get_mut(&hash) else {
                continue;
            };
            if let Some(err) = obj.db_err.take() {
                return Err(StateError::DeferredRead(err));
            }
            obj.commit_storage(&self.db, writer)?;
            let encoded = rlp::encode(&obj.data);
            self.trie.try_update(hash.as_bytes(), &encoded)?;
        }
        self.dirty.clear();

        let root = self.trie.commit_to(writer)?;
        self.clear_journal();
        Ok(root)
    }

    fn clear_journal(&mut self) {
        self.journal.clear();
        self.revisions.clear();
    }

    /// Creates an independent copy carrying the dirty objects. Guarded by
    /// a coarse mutex so the RPC layer can copy while a block is being
    /// processed.
    pub fn copy(&self) -> RecordState {
        let _guard = self.copy_lock.lock();

        let mut objects = HashMap::with_capacity(self.dirty.len());
        for hash in &self.dirty {
            if let Some(obj) = self.objects.get(hash) {
                objects.insert(*hash, obj.clone());
            }
        }

        RecordState {
            db: Arc::clone(&self.db),
            trie: self.trie.clone(),
            objects,
            dirty: self.dirty.clone(),
            db_err: None,
            journal: Vec::new(),
            revisions: Vec::new(),
            next_revision_id: 0,
            copy_lock: Arc::new(Mutex::new(())),
        }
    }
}

impl std::fmt::Debug for RecordState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordState")
            .field("root", &self.trie.root_hash())
            .field("live_objects", &self.objects.len())
            .field("dirty", &self.dirty.len())
            .field("journal_len", &self.journal.len())
            .finish()
    }
}
