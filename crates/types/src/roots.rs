//! Per-trie root commitments for the consensus contexts.
//!
//! The PoC and record contexts are bundles of independently rooted tries.
//! A block header carries the individual roots, and the combined commitment
//! is the Keccak256 of the RLP encodings of those roots in a fixed order.
//! That order is consensus-critical and must not change:
//!
//! - PoC context: epoch, contribution, candidate, latestTx, mintCnt
//! - Record context: confirmation, authorization, transfer

use crate::H256;
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use serde::{Deserialize, Serialize};

/// Root hashes of the five PoC context tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PocContextRoots {
    /// Root of the epoch trie (current validator list)
    #[serde(rename = "epochRoot")]
    pub epoch: H256,
    /// Root of the contribution snapshot trie
    #[serde(rename = "contributionRoot")]
    pub contribution: H256,
    /// Root of the candidate membership trie
    #[serde(rename = "candidateRoot")]
    pub candidate: H256,
    /// Root of the latest-transaction trie
    #[serde(rename = "latestTxRoot")]
    pub latest_tx: H256,
    /// Root of the mint-count trie
    #[serde(rename = "mintCntRoot")]
    pub mint_cnt: H256,
}

impl PocContextRoots {
    /// Computes the combined commitment over the five roots.
    pub fn root(&self) -> H256 {
        combine(&[
            self.epoch,
            self.contribution,
            self.candidate,
            self.latest_tx,
            self.mint_cnt,
        ])
    }
}

impl Encodable for PocContextRoots {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(5);
        s.append(&self.epoch);
        s.append(&self.contribution);
        s.append(&self.candidate);
        s.append(&self.latest_tx);
        s.append(&self.mint_cnt);
    }
}

impl Decodable for PocContextRoots {
    fn decode(rlp: &Rlp<'_>) -> std::result::Result<Self, DecoderError> {
        if rlp.item_count()? != 5 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Self {
            epoch: rlp.val_at(0)?,
            contribution: rlp.val_at(1)?,
            candidate: rlp.val_at(2)?,
            latest_tx: rlp.val_at(3)?,
            mint_cnt: rlp.val_at(4)?,
        })
    }
}

/// Root hashes of the three record context tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecordContextRoots {
    /// Root of the confirmation audit trie
    #[serde(rename = "confirmationRoot")]
    pub confirmation: H256,
    /// Root of the authorization audit trie
    #[serde(rename = "authorizationRoot")]
    pub authorization: H256,
    /// Root of the transfer audit trie
    #[serde(rename = "transferRoot")]
    pub transfer: H256,
}

impl RecordContextRoots {
    /// Computes the combined commitment over the three roots.
    pub fn root(&self) -> H256 {
        combine(&[self.confirmation, self.authorization, self.transfer])
    }
}

impl Encodable for RecordContextRoots {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(3);
        s.append(&self.confirmation);
        s.append(&self.authorization);
        s.append(&self.transfer);
    }
}

impl Decodable for RecordContextRoots {
    fn decode(rlp: &Rlp<'_>) -> std::result::Result<Self, DecoderError> {
        if rlp.item_count()? != 3 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Self {
            confirmation: rlp.val_at(0)?,
            authorization: rlp.val_at(1)?,
            transfer: rlp.val_at(2)?,
        })
    }
}

/// Keccak256 over the concatenated RLP encodings of the given roots.
fn combine(roots: &[H256]) -> H256 {
    let encoded: Vec<Vec<u8>> = roots.iter().map(|r| rlp::encode(r).to_vec()).collect();
    let slices: Vec<&[u8]> = encoded.iter().map(|e| e.as_slice()).collect();
    H256::keccak256_concat(&slices)
}
