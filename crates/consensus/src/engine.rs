//! The Proof-of-Contribution engine glue.
//!
//! Sits between block processing and the epoch machinery: verifies that a
//! block was sealed by the validator owning its slot, drives mint-count
//! accounting and elections at finalize, and tracks the irreversibility
//! marker (the newest block sealed by a two-thirds quorum of distinct
//! validators within one epoch).

use provenet_types::{Address, BlockHeader};
use std::collections::HashSet;
use tracing::{debug, trace};

use crate::api::ChainReader;
use crate::epoch::{EpochConfig, EpochContext};
use crate::{ConsensusError, Result};

/// The Proof-of-Contribution engine.
pub struct PocEngine {
    config: EpochConfig,
    confirmed_header: Option<BlockHeader>,
}

impl PocEngine {
    /// Creates an engine over the given consensus constants.
    pub fn new(config: EpochConfig) -> Self {
        Self {
            config,
            confirmed_header: None,
        }
    }

    /// Returns the consensus constants.
    pub fn config(&self) -> &EpochConfig {
        &self.config
    }

    /// Distinct validators required to make a block irreversible.
    fn consensus_size(&self) -> usize {
        self.config.max_validator_size * 2 / 3 + 1
    }

    /// Checks that the header's validator owns the slot at its timestamp.
    pub fn verify_seal(&self, ec: &EpochContext<'_>, header: &BlockHeader) -> Result<()> {
        let expected = ec.lookup_validator(header.timestamp)?;
        if expected != header.validator {
            return Err(ConsensusError::InvalidBlockValidator {
                expected,
                got: header.validator,
            });
        }
        Ok(())
    }

    /// Applies the consensus-side effects of a sealed block: mint-count
    /// accounting for the sealing validator, then an election if this
    /// block crosses an epoch boundary.
    ///
    /// Block rewards are outside the consensus core and are not applied
    /// here.
    pub fn finalize(
        &self,
        genesis: &BlockHeader,
        parent: &BlockHeader,
        header: &BlockHeader,
        ec: &mut EpochContext<'_>,
    ) -> Result<()> {
        ec.update_mint_cnt(parent.timestamp, header.timestamp, header.validator)?;
        ec.try_elect(genesis, parent)?;
        trace!(height = header.height, "Finalized block");
        Ok(())
    }

    /// Returns the height of the newest irreversible block.
    pub fn confirmed_block_number(&mut self, chain: &dyn ChainReader) -> Result<u64> {
        self.update_confirmed_block(chain)?;
        self.confirmed_header
            .as_ref()
            .map(|h| h.height)
            .ok_or(ConsensusError::UnknownBlock)
    }

    /// Walks back from the chain head looking for a block sealed after a
    /// two-thirds quorum of distinct validators within one epoch.
    fn update_confirmed_block(&mut self, chain: &dyn ChainReader) -> Result<()> {
        let mut cur = chain.current_header().ok_or(ConsensusError::UnknownBlock)?;
        let floor = self.confirmed_header.as_ref().map(|h| h.height).unwrap_or(0);
        let consensus_size = self.consensus_size();

        let mut epoch: Option<u64> = None;
        let mut validators: HashSet<Address> = HashSet::new();

        while cur.height > floor {
            let cur_epoch = self.config.epoch_of(cur.timestamp);
            if epoch != Some(cur_epoch) {
                epoch = Some(cur_epoch);
                validators.clear();
            }

            // Not enough blocks left above the floor to reach quorum
            if cur.height - floor < (consensus_size - validators.len()) as u64 {
                break;
            }

            validators.insert(cur.validator);
            if validators.len() >= consensus_size {
                debug!(height = cur.height, "Confirmed block");
                self.confirmed_header = Some(cur);
                return Ok(());
            }

            cur = chain
                .header_by_hash(&cur.parent_hash)
                .ok_or(ConsensusError::UnknownBlock)?;
        }

        if self.confirmed_header.is_none() {
            self.confirmed_header = chain.header_by_number(0);
        }
        Ok(())
    }
}
