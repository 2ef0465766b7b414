//! Consensus context bundles.
//!
//! [`PocContext`] groups the five Proof-of-Contribution tries;
//! [`RecordContext`] groups the three record lifecycle audit tries. Each
//! trie is independently rooted and the bundles commit as the Keccak256 of
//! the RLP-encoded roots in a fixed, consensus-critical order.
//!
//! Snapshots are wholesale handle replacement: trie handles share their
//! node caches, so a snapshot is a set of root hashes plus references.

use alloy_primitives::U256;
use parking_lot::Mutex;
use provenet_storage::{KvStore, PrefixTrie, TrieWriter};
use provenet_types::uint::{append_u256, u256_at};
use provenet_types::{Address, PocContextRoots, RecordContextRoots, H256};
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::{Result, StateError};

const EPOCH_PREFIX: &[u8] = b"epoch-";
const CONTRIBUTION_PREFIX: &[u8] = b"contributionTrie-";
const LATEST_TX_PREFIX: &[u8] = b"latestTx-";
const CANDIDATE_PREFIX: &[u8] = b"candidate-";
const MINT_CNT_PREFIX: &[u8] = b"mintCnt-";

const CONFIRMATION_PREFIX: &[u8] = b"confirmation-";
const AUTHORIZATION_PREFIX: &[u8] = b"authorization-";
const TRANSFER_PREFIX: &[u8] = b"transfer-";

/// Key under which the epoch trie stores the validator list.
const VALIDATOR_KEY: &[u8] = b"validator";
/// Key under which the contribution trie stores the election snapshot.
const CONTRIBUTION_KEY: &[u8] = b"contribution";

/// A candidate address paired with its contribution score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountContribution {
    /// The candidate account
    pub account: Address,
    /// Its accumulated contribution at election time
    pub contribution: U256,
}

impl Encodable for AccountContribution {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2);
        s.append(&self.account);
        append_u256(s, &self.contribution);
    }
}

impl Decodable for AccountContribution {
    fn decode(rlp: &Rlp<'_>) -> std::result::Result<Self, DecoderError> {
        if rlp.item_count()? != 2 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Self {
            account: rlp.val_at(0)?,
            contribution: u256_at(rlp, 1)?,
        })
    }
}

/// The last record transaction seen from an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountLatestTx {
    /// The account the transaction was sent from
    pub account: Address,
    /// Hash of that transaction
    pub tx_hash: H256,
    /// Block timestamp at which it was recorded
    pub record_time: U256,
}

impl Encodable for AccountLatestTx {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(3);
        s.append(&self.account);
        s.append(&self.tx_hash);
        append_u256(s, &self.record_time);
    }
}

impl Decodable for AccountLatestTx {
    fn decode(rlp: &Rlp<'_>) -> std::result::Result<Self, DecoderError> {
        if rlp.item_count()? != 3 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Self {
            account: rlp.val_at(0)?,
            tx_hash: rlp.val_at(1)?,
            record_time: u256_at(rlp, 2)?,
        })
    }
}

/// The bundle of five Proof-of-Contribution tries.
pub struct PocContext {
    epoch_trie: PrefixTrie,
    contribution_trie: PrefixTrie,
    candidate_trie: PrefixTrie,
    latest_tx_trie: PrefixTrie,
    mint_cnt_trie: PrefixTrie,

    db: Arc<dyn KvStore>,
    copy_lock: Arc<Mutex<()>>,
}

impl PocContext {
    /// Creates a fresh context with empty tries.
    pub fn new(db: Arc<dyn KvStore>) -> Self {
        Self::from_roots(&PocContextRoots::default(), db)
    }

    /// Re-opens a context from committed per-trie roots.
    pub fn from_roots(roots: &PocContextRoots, db: Arc<dyn KvStore>) -> Self {
        Self {
            epoch_trie: PrefixTrie::open(EPOCH_PREFIX, roots.epoch, Arc::clone(&db)),
            contribution_trie: PrefixTrie::open(
                CONTRIBUTION_PREFIX,
                roots.contribution,
                Arc::clone(&db),
            ),
            candidate_trie: PrefixTrie::open(CANDIDATE_PREFIX, roots.candidate, Arc::clone(&db)),
            latest_tx_trie: PrefixTrie::open(LATEST_TX_PREFIX, roots.latest_tx, Arc::clone(&db)),
            mint_cnt_trie: PrefixTrie::open(MINT_CNT_PREFIX, roots.mint_cnt, Arc::clone(&db)),
            db,
            copy_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Creates a logical copy: shared node caches, independent roots.
    /// Guarded by a coarse mutex for concurrent RPC snapshots.
    pub fn copy(&self) -> PocContext {
        let _guard = self.copy_lock.lock();
        PocContext {
            epoch_trie: self.epoch_trie.clone(),
            contribution_trie: self.contribution_trie.clone(),
            candidate_trie: self.candidate_trie.clone(),
            latest_tx_trie: self.latest_tx_trie.clone(),
            mint_cnt_trie: self.mint_cnt_trie.clone(),
            db: Arc::clone(&self.db),
            copy_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Takes a snapshot of the current trie handles.
    pub fn snapshot(&self) -> PocContext {
        self.copy()
    }

    /// Replaces the trie handles wholesale with the snapshot's.
    pub fn revert_to_snapshot(&mut self, snapshot: &PocContext) {
        self.epoch_trie = snapshot.epoch_trie.clone();
        self.contribution_trie = snapshot.contribution_trie.clone();
        self.candidate_trie = snapshot.candidate_trie.clone();
        self.latest_tx_trie = snapshot.latest_tx_trie.clone();
        self.mint_cnt_trie = snapshot.mint_cnt_trie.clone();
    }

    /// Returns the current per-trie roots.
    pub fn roots(&self) -> PocContextRoots {
        PocContextRoots {
            epoch: self.epoch_trie.root_hash(),
            contribution: self.contribution_trie.root_hash(),
            candidate: self.candidate_trie.root_hash(),
            latest_tx: self.latest_tx_trie.root_hash(),
            mint_cnt: self.mint_cnt_trie.root_hash(),
        }
    }

    /// Returns the combined context commitment.
    pub fn root(&self) -> H256 {
        self.roots().root()
    }

    /// Commits all five tries through the writer.
    pub fn commit_to(&self, writer: &mut dyn TrieWriter) -> Result<PocContextRoots> {
        let roots = PocContextRoots {
            epoch: self.epoch_trie.commit_to(writer)?,
            contribution: self.contribution_trie.commit_to(writer)?,
            candidate: self.candidate_trie.commit_to(writer)?,
            latest_tx: self.latest_tx_trie.commit_to(writer)?,
            mint_cnt: self.mint_cnt_trie.commit_to(writer)?,
        };
        debug!(root = %roots.root(), "Committed PoC context");
        Ok(roots)
    }

    /// Returns the backing store handle.
    pub fn db(&self) -> Arc<dyn KvStore> {
        Arc::clone(&self.db)
    }

    /// Registers an address in the candidate pool. Registering twice is
    /// idempotent: the trie keys on the address itself.
    pub fn become_candidate(&mut self, candidate: Address) -> Result<()> {
        self.candidate_trie
            .try_update(candidate.as_bytes(), candidate.as_bytes())?;
        info!(candidate = %candidate, "Become candidate");
        Ok(())
    }

    /// Removes an address from the candidate pool. A missing trie node is
    /// tolerated and treated as "already absent"; any other storage error
    /// propagates.
    pub fn kickout_candidate(&mut self, candidate: Address) -> Result<()> {
        match self.candidate_trie.try_delete(candidate.as_bytes()) {
            Ok(()) => {}
            Err(e) if e.is_missing_node() => {}
            Err(e) => return Err(e.into()),
        }
        info!(candidate = %candidate, "Kickout candidate");
        Ok(())
    }

    /// Reports whether an address is in the candidate pool.
    pub fn is_candidate(&self, candidate: &Address) -> Result<bool> {
        Ok(self.candidate_trie.try_get(candidate.as_bytes())?.is_some())
    }

    /// Returns every candidate address, in ascending address order.
    pub fn get_candidates(&self) -> Result<Vec<Address>> {
        let mut candidates = Vec::new();
        for (_, value) in self.candidate_trie.iter()? {
            let address = Address::from_slice(&value)
                .map_err(|e| StateError::Encoding(e.to_string()))?;
            candidates.push(address);
        }
        Ok(candidates)
    }

    /// Returns the validator list for the current epoch.
    pub fn get_validators(&self) -> Result<Vec<Address>> {
        let encoded = self
            .epoch_trie
            .try_get(VALIDATOR_KEY)?
            .ok_or(StateError::MissingValidatorList)?;
        let rlp = Rlp::new(&encoded);
        rlp.as_list()
            .map_err(|e| StateError::Encoding(format!("failed to decode validators: {e}")))
    }

    /// Replaces the validator list for the current epoch.
    pub fn set_validators(&mut self, validators: &[Address]) -> Result<()> {
        let mut s = RlpStream::new_list(validators.len());
        for validator in validators {
            s.append(validator);
        }
        self.epoch_trie.try_update(VALIDATOR_KEY, &s.out())?;
        Ok(())
    }

    /// Discards the epoch trie, replacing it with a fresh empty one.
    ///
    /// Elections rewrite the validator list wholesale; starting from an
    /// empty trie keeps the epoch root a function of the new list alone.
    pub fn reset_epoch_trie(&mut self) {
        self.epoch_trie = PrefixTrie::new(EPOCH_PREFIX, Arc::clone(&self.db));
    }

    /// Returns the contribution snapshot used for the most recent election.
    pub fn get_contributions(&self) -> Result<Vec<AccountContribution>> {
        let encoded = self
            .contribution_trie
            .try_get(CONTRIBUTION_KEY)?
            .ok_or_else(|| StateError::Encoding("contribution snapshot missing".into()))?;
        let rlp = Rlp::new(&encoded);
        rlp.as_list()
            .map_err(|e| StateError::Encoding(format!("failed to decode contributions: {e}")))
    }

    /// Replaces the contribution snapshot.
    pub fn set_contributions(&mut self, contributions: &[AccountContribution]) -> Result<()> {
        let mut s = RlpStream::new_list(contributions.len());
        for contribution in contributions {
            s.append(contribution);
        }
        self.contribution_trie.try_update(CONTRIBUTION_KEY, &s.out())?;
        Ok(())
    }

    /// Returns the last recorded transaction for an account.
    pub fn get_latest_tx(&self, account: &Address) -> Result<Option<AccountLatestTx>> {
        match self.latest_tx_trie.try_get(account.as_bytes())? {
            Some(encoded) => {
                let latest = rlp::decode(&encoded)
                    .map_err(|e| StateError::Encoding(format!("failed to decode latest tx: {e}")))?;
                Ok(Some(latest))
            }
            None => Ok(None),
        }
    }

    /// Records the last seen transaction for an account.
    pub fn set_latest_tx(&mut self, latest: &AccountLatestTx) -> Result<()> {
        let encoded = rlp::encode(latest);
        self.latest_tx_trie
            .try_update(latest.account.as_bytes(), &encoded)?;
        Ok(())
    }

    /// Reads the number of blocks a validator sealed in an epoch, zero if
    /// no counter exists.
    pub fn mint_cnt(&self, epoch: u64, validator: &Address) -> Result<u64> {
        match self.mint_cnt_trie.try_get(&mint_cnt_key(epoch, validator))? {
            Some(bytes) if bytes.len() == 8 => {
                let mut arr = [0u8; 8];
                arr.copy_from_slice(&bytes);
                Ok(u64::from_be_bytes(arr))
            }
            Some(_) => Err(StateError::Encoding("malformed mint counter".into())),
            None => Ok(0),
        }
    }

    /// Writes a validator's sealed-block counter for an epoch.
    pub fn set_mint_cnt(&mut self, epoch: u64, validator: &Address, count: u64) -> Result<()> {
        self.mint_cnt_trie
            .try_update(&mint_cnt_key(epoch, validator), &count.to_be_bytes())?;
        Ok(())
    }

    /// Reports whether any validator sealed a block in the given epoch.
    pub fn has_mint_entries(&self, epoch: u64) -> Result<bool> {
        Ok(self.mint_cnt_trie.has_key_prefix(&epoch.to_be_bytes())?)
    }
}

impl std::fmt::Debug for PocContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PocContext")
            .field("root", &self.root())
            .finish()
    }
}

/// MintCnt key: bigEndian64(epoch) ‖ validator address bytes.
fn mint_cnt_key(epoch: u64, validator: &Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + 20);
    key.extend_from_slice(&epoch.to_be_bytes());
    key.extend_from_slice(validator.as_bytes());
    key
}

/// The bundle of three record lifecycle audit tries.
///
/// These are append-only logs indexing past confirmation, authorization
/// and transfer operations; the authoritative per-record data lives in the
/// record state.
pub struct RecordContext {
    confirmation_trie: PrefixTrie,
    authorization_trie: PrefixTrie,
    transfer_trie: PrefixTrie,

    db: Arc<dyn KvStore>,
    copy_lock: Arc<Mutex<()>>,
}

impl RecordContext {
    /// Creates a fresh context with empty tries.
    pub fn new(db: Arc<dyn KvStore>) -> Self {
        Self::from_roots(&RecordContextRoots::default(), db)
    }

    /// Re-opens a context from committed per-trie roots.
    pub fn from_roots(roots: &RecordContextRoots, db: Arc<dyn KvStore>) -> Self {
        Self {
            confirmation_trie: PrefixTrie::open(
                CONFIRMATION_PREFIX,
                roots.confirmation,
                Arc::clone(&db),
            ),
            authorization_trie: PrefixTrie::open(
                AUTHORIZATION_PREFIX,
                roots.authorization,
                Arc::clone(&db),
            ),
            transfer_trie: PrefixTrie::open(TRANSFER_PREFIX, roots.transfer, Arc::clone(&db)),
            db,
            copy_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Creates a logical copy: shared node caches, independent roots.
    pub fn copy(&self) -> RecordContext {
        let _guard = self.copy_lock.lock();
        RecordContext {
            confirmation_trie: self.confirmation_trie.clone(),
            authorization_trie: self.authorization_trie.clone(),
            transfer_trie: self.transfer_trie.clone(),
            db: Arc::clone(&self.db),
            copy_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Takes a snapshot of the current trie handles.
    pub fn snapshot(&self) -> RecordContext {
        self.copy()
    }

    /// Replaces the trie handles wholesale with the snapshot's.
    pub fn revert_to_snapshot(&mut self, snapshot: &RecordContext) {
        self.confirmation_trie = snapshot.confirmation_trie.clone();
        self.authorization_trie = snapshot.authorization_trie.clone();
        self.transfer_trie = snapshot.transfer_trie.clone();
    }

    /// Returns the current per-trie roots.
    pub fn roots(&self) -> RecordContextRoots {
        RecordContextRoots {
            confirmation: self.confirmation_trie.root_hash(),
            authorization: self.authorization_trie.root_hash(),
            transfer: self.transfer_trie.root_hash(),
        }
    }

    /// Returns the combined context commitment.
    pub fn root(&self) -> H256 {
        self.roots().root()
    }

    /// Commits all three tries through the writer.
    pub fn commit_to(&self, writer: &mut dyn TrieWriter) -> Result<RecordContextRoots> {
        let roots = RecordContextRoots {
            confirmation: self.confirmation_trie.commit_to(writer)?,
            authorization: self.authorization_trie.commit_to(writer)?,
            transfer: self.transfer_trie.commit_to(writer)?,
        };
        debug!(root = %roots.root(), "Committed record context");
        Ok(roots)
    }

    /// Returns the backing store handle.
    pub fn db(&self) -> Arc<dyn KvStore> {
        Arc::clone(&self.db)
    }

    /// Logs a record confirmation: the record hash maps to the confirming
    /// transaction.
    pub fn confirm_record(&mut self, record: H256, tx_hash: H256) -> Result<()> {
        self.confirmation_trie
            .try_update(record.as_bytes(), tx_hash.as_bytes())?;
        debug!(record = %record, "Confirm record");
        Ok(())
    }

    /// Logs a record authorization.
    pub fn authorize_record(&mut self, record: H256, tx_hash: H256) -> Result<()> {
        self.authorization_trie
            .try_update(&audit_key(&record, &tx_hash), tx_hash.as_bytes())?;
        debug!(record = %record, "Authorize record");
        Ok(())
    }

    /// Logs a record transfer. Keyed by record hash and transaction hash so
    /// successive transfers of one record stay in the log.
    pub fn transfer_record(&mut self, record: H256, tx_hash: H256) -> Result<()> {
        self.transfer_trie
            .try_update(&audit_key(&record, &tx_hash), tx_hash.as_bytes())?;
        debug!(record = %record, "Transfer record");
        Ok(())
    }

    /// Returns the hash of the transaction that confirmed a record, if the
    /// record was confirmed.
    pub fn confirmation_of(&self, record: &H256) -> Result<Option<H256>> {
        match self.confirmation_trie.try_get(record.as_bytes())? {
            Some(bytes) => H256::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StateError::Encoding(e.to_string())),
            None => Ok(None),
        }
    }

    /// Returns the transfer log entries for a record, oldest key first.
    pub fn transfers_of(&self, record: &H256) -> Result<Vec<H256>> {
        let mut transfers = Vec::new();
        for (_, value) in self.transfer_trie.iter_prefix(record.as_bytes())? {
            let tx = H256::from_slice(&value).map_err(|e| StateError::Encoding(e.to_string()))?;
            transfers.push(tx);
        }
        Ok(transfers)
    }
}

impl std::fmt::Debug for RecordContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordContext")
            .field("root", &self.root())
            .finish()
    }
}

/// Audit log key: record hash ‖ transaction hash.
fn audit_key(record: &H256, tx_hash: &H256) -> Vec<u8> {
    let mut key = Vec::with_capacity(64);
    key.extend_from_slice(record.as_bytes());
    key.extend_from_slice(tx_hash.as_bytes());
    key
}
