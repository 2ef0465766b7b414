//! Epoch machinery: contribution counting, kickout, validator lookup and
//! the per-epoch election.
//!
//! Time is discretized into epochs of `epoch_interval` seconds, each split
//! into slots of `block_interval` seconds with one block per slot. The
//! validator set is rewritten wholesale at epoch boundaries by
//! [`EpochContext::try_elect`]; within an epoch, [`EpochContext::lookup_validator`]
//! rotates through the elected list deterministically.

use alloy_primitives::U256;
use provenet_config::ConsensusConfig;
use provenet_state::{AccountContribution, AccountState, PocContext};
use provenet_types::{keccak512, Address, BlockHeader};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{ConsensusError, Result};

/// Consensus constants, fixed per network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochConfig {
    /// Epoch length in seconds
    pub epoch_interval: u64,
    /// Slot length in seconds
    pub block_interval: u64,
    /// Upper bound on the elected validator set
    pub max_validator_size: usize,
    /// Candidate-pool floor preserved across kickouts
    pub safe_size: usize,
    /// Timestamp of the first sealed block
    pub time_of_first_block: u64,
}

impl EpochConfig {
    /// Creates a validated configuration.
    pub fn new(
        epoch_interval: u64,
        block_interval: u64,
        max_validator_size: usize,
        safe_size: usize,
        time_of_first_block: u64,
    ) -> Result<Self> {
        if block_interval == 0 || epoch_interval == 0 || epoch_interval % block_interval != 0 {
            return Err(ConsensusError::InvalidEpochConfig(format!(
                "epoch interval {epoch_interval} must be a nonzero multiple of block interval {block_interval}"
            )));
        }
        if max_validator_size == 0 {
            return Err(ConsensusError::InvalidEpochConfig(
                "max validator size must be nonzero".into(),
            ));
        }
        if safe_size >= max_validator_size {
            return Err(ConsensusError::InvalidEpochConfig(format!(
                "safe size {safe_size} must be less than max validator size {max_validator_size}"
            )));
        }
        Ok(Self {
            epoch_interval,
            block_interval,
            max_validator_size,
            safe_size,
            time_of_first_block,
        })
    }

    /// The epoch containing a timestamp.
    #[inline]
    pub fn epoch_of(&self, time: u64) -> u64 {
        time / self.epoch_interval
    }

    /// The slot within the epoch containing a timestamp.
    #[inline]
    pub fn slot_of(&self, time: u64) -> u64 {
        (time % self.epoch_interval) / self.block_interval
    }
}

impl Default for EpochConfig {
    fn default() -> Self {
        Self {
            epoch_interval: 86_400,
            block_interval: 10,
            max_validator_size: 21,
            safe_size: 15,
            time_of_first_block: 0,
        }
    }
}

impl From<&ConsensusConfig> for EpochConfig {
    fn from(config: &ConsensusConfig) -> Self {
        Self {
            epoch_interval: config.epoch_interval,
            block_interval: config.block_interval,
            max_validator_size: config.max_validator_size,
            safe_size: config.safe_size,
            time_of_first_block: config.time_of_first_block,
        }
    }
}

/// An address paired with its election or kickout weight.
#[derive(Debug, Clone)]
struct WeightedAddress {
    address: Address,
    weight: U256,
}

/// Sorts by weight descending, ties broken by ascending address.
fn sort_weighted(entries: &mut [WeightedAddress]) {
    entries.sort_by(|a, b| {
        b.weight
            .cmp(&a.weight)
            .then_with(|| a.address.cmp(&b.address))
    });
}

/// The election machinery, operating on the PoC context and account state
/// at a given block timestamp.
pub struct EpochContext<'a> {
    /// Timestamp of the block being processed
    pub timestamp: u64,
    /// Consensus constants
    pub config: &'a EpochConfig,
    /// The PoC context being mutated
    pub poc: &'a mut PocContext,
    /// The account state contributions are read from
    pub accounts: &'a mut AccountState,
}

impl<'a> EpochContext<'a> {
    /// Collects `(candidate, contribution)` pairs from the candidate trie.
    ///
    /// Fails with [`ConsensusError::NoCandidates`] when the pool is empty.
    pub fn count_contributions(&mut self) -> Result<Vec<AccountContribution>> {
        let candidates = self.poc.get_candidates()?;
        if candidates.is_empty() {
            return Err(ConsensusError::NoCandidates);
        }
        let mut contributions = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            contributions.push(AccountContribution {
                account: candidate,
                contribution: self.accounts.get_contribution(&candidate),
            });
        }
        Ok(contributions)
    }

    /// Removes under-producing validators from the candidate pool.
    ///
    /// A validator whose sealed-block count for `prev_epoch` fell below half
    /// its fair share is a kickout candidate. Kickouts proceed from the
    /// highest count down (ties by ascending address) and stop before the
    /// candidate pool would shrink below `safe_size`.
    pub fn kickout_validator(&mut self, prev_epoch: u64) -> Result<()> {
        let validators = self.poc.get_validators()?;
        if validators.is_empty() {
            return Err(ConsensusError::NoValidatorsToKickout);
        }

        // The first epoch may be shorter than epoch_interval when the first
        // block was not aligned with an epoch boundary; measure it from the
        // first block time so its validators are not kicked unfairly.
        let mut epoch_duration = self.config.epoch_interval;
        let elapsed = self
            .timestamp
            .saturating_sub(self.config.time_of_first_block);
        if elapsed < self.config.epoch_interval {
            epoch_duration = elapsed;
        }

        let threshold = epoch_duration
            / self.config.block_interval
            / self.config.max_validator_size as u64
            / 2;

        let mut need_kickout = Vec::new();
        for validator in validators {
            let cnt = self.poc.mint_cnt(prev_epoch, &validator)?;
            if cnt < threshold {
                need_kickout.push(WeightedAddress {
                    address: validator,
                    weight: U256::from(cnt),
                });
            }
        }
        if need_kickout.is_empty() {
            return Ok(());
        }
        sort_weighted(&mut need_kickout);

        let candidate_total = self.poc.get_candidates()?.len();
        let mut candidate_count =
            candidate_total.min(need_kickout.len() + self.config.safe_size);

        for (kicked, entry) in need_kickout.iter().enumerate() {
            // The candidate pool never shrinks below safe_size
            if candidate_count <= self.config.safe_size {
                info!(
                    prev_epoch,
                    candidate_count,
                    remaining = need_kickout.len() - kicked,
                    "No more candidates can be kicked out"
                );
                return Ok(());
            }

            self.poc.kickout_candidate(entry.address)?;
            candidate_count -= 1;
            info!(
                prev_epoch,
                candidate = %entry.address,
                mint_cnt = %entry.weight,
                "Kicked out candidate"
            );
        }
        Ok(())
    }

    /// Returns the validator whose slot contains the timestamp `now`.
    pub fn lookup_validator(&self, now: u64) -> Result<Address> {
        let mut offset = now % self.config.epoch_interval;
        if offset % self.config.block_interval != 0 {
            return Err(ConsensusError::InvalidMintBlockTime);
        }
        offset /= self.config.block_interval;

        let validators = self.poc.get_validators()?;
        if validators.is_empty() {
            return Err(ConsensusError::NoValidators);
        }
        let index = (offset % validators.len() as u64) as usize;
        Ok(validators[index])
    }

    /// Runs the election for every epoch boundary crossed between the
    /// parent block and the block being processed.
    ///
    /// For each missed epoch: kick out under-producers (unless coming from
    /// the genesis epoch or no blocks were sealed), collect contributions,
    /// rank candidates by contribution, truncate to the validator cap and
    /// shuffle deterministically from the parent hash.
    pub fn try_elect(&mut self, genesis: &BlockHeader, parent: &BlockHeader) -> Result<()> {
        let genesis_epoch = self.config.epoch_of(genesis.timestamp);
        let mut prev_epoch = self.config.epoch_of(parent.timestamp);
        let current_epoch = self.config.epoch_of(self.timestamp);

        let prev_epoch_is_genesis = prev_epoch == genesis_epoch;
        if prev_epoch_is_genesis && prev_epoch < current_epoch {
            prev_epoch = current_epoch - 1;
        }

        for i in prev_epoch..current_epoch {
            // The first real epoch does not kick out, nor does an epoch in
            // which nobody sealed a block
            if !prev_epoch_is_genesis && self.poc.has_mint_entries(prev_epoch)? {
                self.kickout_validator(prev_epoch)?;
            }

            let contributions = self.count_contributions()?;
            let mut candidates: Vec<WeightedAddress> = contributions
                .iter()
                .map(|c| WeightedAddress {
                    address: c.account,
                    weight: c.contribution,
                })
                .collect();
            if candidates.len() < self.config.safe_size {
                return Err(ConsensusError::TooFewCandidates {
                    got: candidates.len(),
                    need: self.config.safe_size,
                });
            }
            sort_weighted(&mut candidates);
            candidates.truncate(self.config.max_validator_size);

            // Deterministic shuffle: the seed depends only on the parent
            // hash and the epoch index
            let digest = keccak512(parent.hash().as_bytes());
            let seed_bytes: [u8; 4] = [digest[0], digest[1], digest[2], digest[3]];
            let seed = u32::from_le_bytes(seed_bytes) as u64 + i;
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            for idx in (1..candidates.len()).rev() {
                let j = rng.gen_range(0..=idx);
                candidates.swap(idx, j);
            }

            let validators: Vec<Address> = candidates.iter().map(|c| c.address).collect();

            self.poc.reset_epoch_trie();
            self.poc.set_validators(&validators)?;
            self.poc.set_contributions(&contributions)?;
            info!(prev_epoch = i, next_epoch = i + 1, "Come to new epoch");
        }
        Ok(())
    }

    /// Updates the sealed-block counter for the validator of the block
    /// being processed.
    ///
    /// Key: `bigEndian64(epoch) ‖ validator`; value: 8-byte big-endian
    /// count. A fresh epoch starts the counter at one.
    pub fn update_mint_cnt(
        &mut self,
        parent_time: u64,
        current_time: u64,
        validator: Address,
    ) -> Result<()> {
        let parent_epoch = self.config.epoch_of(parent_time);
        let new_epoch = self.config.epoch_of(current_time);

        let mut cnt = 1u64;
        if parent_epoch == new_epoch {
            cnt = self.poc.mint_cnt(parent_epoch, &validator)? + 1;
        }
        self.poc.set_mint_cnt(new_epoch, &validator, cnt)?;
        debug!(epoch = new_epoch, validator = %validator, cnt, "Updated mint count");
        Ok(())
    }
}
