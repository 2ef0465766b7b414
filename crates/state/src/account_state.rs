//! The journaled account state store.
//!
//! An MPT keyed by 20-byte address holding [`AccountData`] leaves. Every
//! mutation records an undo entry before it is applied, which is the
//! backbone of `snapshot`/`revert_to_snapshot`. `finalise` flushes dirty
//! objects into the trie and invalidates outstanding snapshots; snapshots
//! never span a finalise.

use alloy_primitives::U256;
use parking_lot::Mutex;
use provenet_storage::{KvStore, PrefixTrie, TrieWriter};
use provenet_types::{Address, Log, H256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{trace, warn};

use crate::account::{AccountData, AccountObject};
use crate::journal::{AccountEntry, Revision};
use crate::{Result, StateError};

/// Key prefix of the account trie in the shared key-value store.
const ACCOUNT_PREFIX: &[u8] = b"account-";

/// The journaled account state.
pub struct AccountState {
    db: Arc<dyn KvStore>,
    trie: PrefixTrie,

    /// Live objects, modified while processing a state transition
    objects: HashMap<Address, AccountObject>,
    dirty: HashSet<Address>,

    /// First database read error, surfaced at commit
    db_err: Option<String>,

    /// Journal of state modifications, the backbone of snapshot/revert
    journal: Vec<AccountEntry>,
    revisions: Vec<Revision>,
    next_revision_id: usize,

    thash: H256,
    bhash: H256,
    tx_index: u32,
    logs: HashMap<H256, Vec<Log>>,
    log_size: u32,
    preimages: HashMap<H256, Vec<u8>>,

    copy_lock: Arc<Mutex<()>>,
}

impl AccountState {
    /// Opens the account state at the given root.
    pub fn new(root: H256, db: Arc<dyn KvStore>) -> Self {
        let trie = PrefixTrie::open(ACCOUNT_PREFIX, root, Arc::clone(&db));
        Self {
            db,
            trie,
            objects: HashMap::new(),
            dirty: HashSet::new(),
            db_err: None,
            journal: Vec::new(),
            revisions: Vec::new(),
            next_revision_id: 0,
            thash: H256::NIL,
            bhash: H256::NIL,
            tx_index: 0,
            logs: HashMap::new(),
            log_size: 0,
            preimages: HashMap::new(),
            copy_lock: Arc::new(Mutex::new(())),
        }
    }

    fn set_error(&mut self, err: impl ToString) {
        if self.db_err.is_none() {
            self.db_err = Some(err.to_string());
        }
    }

    /// Loads the object into the live set; returns whether it exists.
    fn load_object(&mut self, address: &Address) -> bool {
        if let Some(obj) = self.objects.get(address) {
            return !obj.deleted;
        }
        match self.trie.try_get(address.as_bytes()) {
            Ok(Some(encoded)) => match rlp::decode::<AccountData>(&encoded) {
                Ok(data) => {
                    self.objects.insert(*address, AccountObject::new(data));
                    true
                }
                Err(e) => {
                    warn!(address = %address, error = %e, "Failed to decode account");
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

    /// Reports whether the account exists.
    pub fn exist(&mut self, address: &Address) -> bool {
        self.load_object(address)
    }

    /// Reports whether the account is nonexistent or empty.
    pub fn is_empty_account(&mut self, address: &Address) -> bool {
        if !self.load_object(address) {
            return true;
        }
        self.objects
            .get(address)
            .map(|obj| obj.data.is_empty())
            .unwrap_or(true)
    }

    /// Explicitly creates an account, overwriting any existing object.
    pub fn create_account(&mut self, address: Address) {
        let prev = if self.load_object(&address) {
            self.objects.get(&address).cloned()
        } else {
            None
        };
        match prev {
            Some(prev) => self.journal.push(AccountEntry::ResetObject {
                address,
                prev: Box::new(prev),
            }),
            None => self.journal.push(AccountEntry::CreateObject { address }),
        }
        self.objects.insert(address, AccountObject::new(AccountData::default()));
        self.dirty.insert(address);
        trace!(address = %address, "Created account");
    }

    /// Ensures the account exists, creating it lazily on first reference.
    fn ensure_object(&mut self, address: Address) {
        if !self.load_object(&address) {
            self.create_account(address);
        }
    }

    /// Returns the account's current data, if it exists.
    pub fn get_account(&mut self, address: &Address) -> Option<AccountData> {
        if self.load_object(address) {
            self.objects.get(address).map(|obj| obj.data.clone())
        } else {
            None
        }
    }

    /// Returns the account balance, zero for absent accounts.
    pub fn get_balance(&mut self, address: &Address) -> U256 {
        self.get_account(address)
            .map(|data| data.balance)
            .unwrap_or(U256::ZERO)
    }

    /// Sets the account balance.
    pub fn set_balance(&mut self, address: Address, balance: U256) {
        self.ensure_object(address);
        if let Some(obj) = self.objects.get_mut(&address) {
            self.journal.push(AccountEntry::BalanceChange {
                address,
                prev: obj.data.balance,
            });
            obj.data.balance = balance;
            self.dirty.insert(address);
        }
    }

    /// Adds to the account balance.
    pub fn add_balance(&mut self, address: Address, amount: U256) {
        let balance = self.get_balance(&address);
        self.set_balance(address, balance.saturating_add(amount));
    }

    /// Subtracts from the account balance. Callers check funds first; the
    /// subtraction saturates at zero.
    pub fn sub_balance(&mut self, address: Address, amount: U256) {
        let balance = self.get_balance(&address);
        self.set_balance(address, balance.saturating_sub(amount));
    }

    /// Returns the account nonce, zero for absent accounts.
    pub fn get_nonce(&mut self, address: &Address) -> u64 {
        self.get_account(address).map(|data| data.nonce).unwrap_or(0)
    }

    /// Sets the account nonce.
    pub fn set_nonce(&mut self, address: Address, nonce: u64) {
        self.ensure_object(address);
        if let Some(obj) = self.objects.get_mut(&address) {
            self.journal.push(AccountEntry::NonceChange {
                address,
                prev: obj.data.nonce,
            });
            obj.data.nonce = nonce;
            self.dirty.insert(address);
        }
    }

    /// Returns the accumulated contribution, zero for absent accounts.
    pub fn get_contribution(&mut self, address: &Address) -> U256 {
        self.get_account(address)
            .map(|data| data.contribution)
            .unwrap_or(U256::ZERO)
    }

    /// Sets the contribution score.
    pub fn set_contribution(&mut self, address: Address, contribution: U256) {
        self.ensure_object(address);
        if let Some(obj) = self.objects.get_mut(&address) {
            self.journal.push(AccountEntry::ContributionChange {
                address,
                prev: obj.data.contribution,
            });
            obj.data.contribution = contribution;
            self.dirty.insert(address);
        }
    }

    /// Adds to the contribution score.
    pub fn add_contribution(&mut self, address: Address, amount: U256) {
        let contribution = self.get_contribution(&address);
        self.set_contribution(address, contribution.saturating_add(amount));
    }

    /// Returns the record hashes owned by the account.
    pub fn get_records(&mut self, address: &Address) -> Vec<H256> {
        self.get_account(address)
            .map(|data| data.records)
            .unwrap_or_default()
    }

    /// Appends a record hash to the account's owned set.
    pub fn add_record(&mut self, address: Address, record: H256) {
        self.ensure_object(address);
        if let Some(obj) = self.objects.get_mut(&address) {
            self.journal.push(AccountEntry::RecordsChange {
                address,
                prev: obj.data.records.clone(),
            });
            obj.data.records.push(record);
            self.dirty.insert(address);
        }
    }

    /// Removes a record hash from the account's owned set.
    pub fn remove_record(&mut self, address: Address, record: H256) {
        self.ensure_object(address);
        if let Some(obj) = self.objects.get_mut(&address) {
            self.journal.push(AccountEntry::RecordsChange {
                address,
                prev: obj.data.records.clone(),
            });
            obj.data.records.retain(|r| *r != record);
            self.dirty.insert(address);
        }
    }

    /// Reads a per-account storage slot.
    pub fn get_storage(&mut self, address: &Address, key: &H256) -> H256 {
        if !self.load_object(address) {
            return H256::NIL;
        }
        match self.objects.get_mut(address) {
            Some(obj) => obj.storage_value(&self.db, key),
            None => H256::NIL,
        }
    }

    /// Writes a per-account storage slot.
    pub fn set_storage(&mut self, address: Address, key: H256, value: H256) {
        self.ensure_object(address);
        if let Some(obj) = self.objects.get_mut(&address) {
            let prev = obj.storage_value(&self.db, &key);
            self.journal.push(AccountEntry::StorageChange {
                address,
                key,
                prev,
            });
            obj.set_storage_value(key, value);
            self.dirty.insert(address);
        }
    }

    /// Sets the current transaction hash, block hash and index used when
    /// logs are recorded.
    pub fn prepare(&mut self, thash: H256, bhash: H256, tx_index: u32) {
        self.thash = thash;
        self.bhash = bhash;
        self.tx_index = tx_index;
    }

    /// Records a log against the current transaction.
    pub fn add_log(&mut self, mut log: Log) {
        self.journal.push(AccountEntry::AddLog { tx_hash: self.thash });

        log.tx_hash = self.thash;
        log.block_hash = self.bhash;
        log.tx_index = self.tx_index;
        log.index = self.log_size;
        self.logs.entry(self.thash).or_default().push(log);
        self.log_size += 1;
    }

    /// Returns the logs recorded for a transaction.
    pub fn get_logs(&self, tx_hash: &H256) -> Vec<Log> {
        self.logs.get(tx_hash).cloned().unwrap_or_default()
    }

    /// Returns every recorded log in emission order.
    pub fn logs(&self) -> Vec<Log> {
        let mut all: Vec<Log> = self.logs.values().flatten().cloned().collect();
        all.sort_by_key(|log| log.index);
        all
    }

    /// Records a hash preimage observed during execution.
    pub fn add_preimage(&mut self, hash: H256, preimage: Vec<u8>) {
        if !self.preimages.contains_key(&hash) {
            self.journal.push(AccountEntry::AddPreimage { hash });
            self.preimages.insert(hash, preimage);
        }
    }

    /// Returns the recorded preimages.
    pub fn preimages(&self) -> &HashMap<H256, Vec<u8>> {
        &self.preimages
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

    fn undo(&mut self, entry: AccountEntry) {
        match entry {
            AccountEntry::CreateObject { address } => {
                self.objects.remove(&address);
                self.dirty.remove(&address);
            }
            AccountEntry::ResetObject { address, prev } => {
                self.objects.insert(address, *prev);
            }
            AccountEntry::BalanceChange { address, prev } => {
                if let Some(obj) = self.objects.get_mut(&address) {
                    obj.data.balance = prev;
                }
            }
            AccountEntry::NonceChange { address, prev } => {
                if let Some(obj) = self.objects.get_mut(&address) {
                    obj.data.nonce = prev;
                }
            }
            AccountEntry::ContributionChange { address, prev } => {
                if let Some(obj) = self.objects.get_mut(&address) {
                    obj.data.contribution = prev;
                }
            }
            AccountEntry::RecordsChange { address, prev } => {
                if let Some(obj) = self.objects.get_mut(&address) {
                    obj.data.records = prev;
                }
            }
            AccountEntry::StorageChange { address, key, prev } => {
                if let Some(obj) = self.objects.get_mut(&address) {
                    obj.set_storage_value(key, prev);
                }
            }
            AccountEntry::AddLog { tx_hash } => {
                if let Some(logs) = self.logs.get_mut(&tx_hash) {
                    logs.pop();
                    if logs.is_empty() {
                        self.logs.remove(&tx_hash);
                    }
                }
                self.log_size = self.log_size.saturating_sub(1);
            }
            AccountEntry::AddPreimage { hash } => {
                self.preimages.remove(&hash);
            }
        }
    }

    /// Flushes dirty objects into the trie. Empty accounts are deleted when
    /// `delete_empty` is set. The journal is cleared: snapshots do not span
    /// a finalise.
    pub fn finalise(&mut self, delete_empty: bool) {
        let addresses: Vec<Address> = self.dirty.iter().copied().collect();
        for address in addresses {
            let Some(obj) = self.objects.get_mut(&address) else {
                continue;
            };
            if obj.deleted {
                continue;
            }
            if delete_empty && obj.data.is_empty() {
                obj.deleted = true;
                if let Err(e) = self.trie.try_delete(address.as_bytes()) {
                    if self.db_err.is_none() {
                        self.db_err = Some(e.to_string());
                    }
                }
            } else {
                obj.update_root(&self.db);
                let encoded = rlp::encode(&obj.data);
                if let Err(e) = self.trie.try_update(address.as_bytes(), &encoded) {
                    if self.db_err.is_none() {
                        self.db_err = Some(e.to_string());
                    }
                }
            }
        }
        self.clear_journal();
    }

    /// Computes the current root hash of the state trie, finalising first.
    ///
    /// Called between transactions to obtain the root that goes into the
    /// transaction receipt.
    pub fn intermediate_root(&mut self, delete_empty: bool) -> H256 {
        self.finalise(delete_empty);
        self.trie.root_hash()
    }

    /// Writes the state through the given writer and returns the new root.
    ///
    /// Any database read error memoized on the store or its objects is
    /// surfaced here.
    pub fn commit_to(&mut self, writer: &mut dyn TrieWriter, delete_empty: bool) -> Result<H256> {
        if let Some(err) = self.db_err.take() {
            return Err(StateError::DeferredRead(err));
        }

        let addresses: Vec<Address> = self.dirty.iter().copied().collect();
        for address in addresses {
            let Some(obj) = self.objects.get_mut(&address) else {
                continue;
            };
            if let Some(err) = obj.db_err.take() {
                return Err(StateError::DeferredRead(err));
            }
            if obj.deleted || (delete_empty && obj.data.is_empty()) {
                obj.deleted = true;
                self.trie.try_delete(address.as_bytes())?;
            } else {
                obj.commit_storage(&self.db, writer)?;
                let encoded = rlp::encode(&obj.data);
                self.trie.try_update(address.as_bytes(), &encoded)?;
            }
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

    /// Creates an independent copy carrying the dirty objects, logs and
    /// preimages. Snapshots of the copied state cannot be applied to the
    /// copy. Guarded by a coarse mutex so the RPC layer can copy while a
    /// block is being processed.
    pub fn copy(&self) -> AccountState {
        let _guard = self.copy_lock.lock();

        let mut objects = HashMap::with_capacity(self.dirty.len());
        for address in &self.dirty {
            if let Some(obj) = self.objects.get(address) {
                objects.insert(*address, obj.clone());
            }
        }

        AccountState {
            db: Arc::clone(&self.db),
            trie: self.trie.clone(),
            objects,
            dirty: self.dirty.clone(),
            db_err: None,
            journal: Vec::new(),
            revisions: Vec::new(),
            next_revision_id: 0,
            thash: H256::NIL,
            bhash: H256::NIL,
            tx_index: 0,
            logs: self.logs.clone(),
            log_size: self.log_size,
            preimages: self.preimages.clone(),
            copy_lock: Arc::new(Mutex::new(())),
        }
    }
}

impl std::fmt::Debug for AccountState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountState")
            .field("root", &self.trie.root_hash())
            .field("live_objects", &self.objects.len())
            .field("dirty", &self.dirty.len())
            .field("journal_len", &self.journal.len())
            .finish()
    }
}
