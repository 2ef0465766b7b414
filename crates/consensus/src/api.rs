//! Node-facing query surface.
//!
//! Queries answer against committed headers: a header carries the per-trie
//! roots of its PoC context, so any historical validator list, candidate
//! pool or contribution snapshot can be re-opened read-only from the
//! key-value store. The wire encoding around these calls lives outside the
//! consensus core.

use provenet_state::{AccountContribution, AccountLatestTx, PocContext};
use provenet_storage::KvStore;
use provenet_types::{Address, BlockHeader, H256};
use std::sync::Arc;

use crate::engine::PocEngine;
use crate::{ConsensusError, Result};

/// Read access to the canonical chain.
pub trait ChainReader {
    /// Returns the current chain head.
    fn current_header(&self) -> Option<BlockHeader>;
    /// Returns the canonical header at a height.
    fn header_by_number(&self, number: u64) -> Option<BlockHeader>;
    /// Returns the header with the given hash.
    fn header_by_hash(&self, hash: &H256) -> Option<BlockHeader>;
}

/// The Proof-of-Contribution query API.
pub struct PocApi<'a, C: ChainReader> {
    chain: &'a C,
    engine: &'a mut PocEngine,
    db: Arc<dyn KvStore>,
}

impl<'a, C: ChainReader> PocApi<'a, C> {
    /// Creates the API over a chain reader and the engine's store.
    pub fn new(chain: &'a C, engine: &'a mut PocEngine, db: Arc<dyn KvStore>) -> Self {
        Self { chain, engine, db }
    }

    fn header_at(&self, number: Option<u64>) -> Result<BlockHeader> {
        let header = match number {
            Some(number) => self.chain.header_by_number(number),
            None => self.chain.current_header(),
        };
        header.ok_or(ConsensusError::UnknownBlock)
    }

    fn context_at(&self, number: Option<u64>) -> Result<PocContext> {
        let header = self.header_at(number)?;
        Ok(PocContext::from_roots(&header.poc_roots, Arc::clone(&self.db)))
    }

    /// Returns the validator list at the given block, latest if `None`.
    pub fn get_validators(&self, number: Option<u64>) -> Result<Vec<Address>> {
        Ok(self.context_at(number)?.get_validators()?)
    }

    /// Returns the candidate pool at the given block, latest if `None`.
    pub fn get_candidates(&self, number: Option<u64>) -> Result<Vec<Address>> {
        Ok(self.context_at(number)?.get_candidates()?)
    }

    /// Returns the contribution snapshot of the most recent election as of
    /// the given block, latest if `None`.
    pub fn get_contributions(&self, number: Option<u64>) -> Result<Vec<AccountContribution>> {
        Ok(self.context_at(number)?.get_contributions()?)
    }

    /// Returns the last record transaction seen from an account.
    pub fn get_latest_tx(&self, account: &Address) -> Result<Option<AccountLatestTx>> {
        Ok(self.context_at(None)?.get_latest_tx(account)?)
    }

    /// Returns the height of the newest irreversible block.
    pub fn get_confirmed_block_number(&mut self) -> Result<u64> {
        self.engine.confirmed_block_number(self.chain)
    }
}
