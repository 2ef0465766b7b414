//! Transaction receipts, logs and the log bloom filter.
//!
//! A receipt commits to the post-transaction account and record state roots,
//! the failure flag, and the logs emitted while applying the transaction.
//! The 2048-bit bloom summarizes log addresses and topics so that clients
//! can skip blocks that cannot contain a match.

use crate::{Address, H256};
use bytes::Bytes;
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of the log bloom filter in bytes (2048 bits).
pub const BLOOM_SIZE: usize = 256;

/// A log entry emitted during transaction execution.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Log {
    /// Address of the account that emitted the log
    pub address: Address,
    /// Indexed topics
    pub topics: Vec<H256>,
    /// Opaque payload
    pub data: Vec<u8>,
    /// Hash of the transaction that emitted the log
    #[serde(default)]
    pub tx_hash: H256,
    /// Hash of the block containing the transaction
    #[serde(default)]
    pub block_hash: H256,
    /// Index of the transaction within the block
    #[serde(default)]
    pub tx_index: u32,
    /// Index of the log within the block
    #[serde(default)]
    pub index: u32,
}

impl Log {
    /// Creates a log with the consensus fields set; positional metadata is
    /// filled in by the state store when the log is recorded.
    pub fn new(address: Address, topics: Vec<H256>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            address,
            topics,
            data: data.into(),
            ..Default::default()
        }
    }
}

impl Encodable for Log {
    fn rlp_append(&self, s: &mut RlpStream) {
        // Only the consensus fields participate in the encoding.
        s.begin_list(3);
        s.append(&self.address);
        s.begin_list(self.topics.len());
        for topic in &self.topics {
            s.append(topic);
        }
        s.append(&self.data.as_slice());
    }
}

impl Decodable for Log {
    fn decode(rlp: &Rlp<'_>) -> std::result::Result<Self, DecoderError> {
        if rlp.item_count()? != 3 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Self {
            address: rlp.val_at(0)?,
            topics: rlp.list_at(1)?,
            data: rlp.val_at(2)?,
            ..Default::default()
        })
    }
}

/// A 2048-bit bloom filter over log addresses and topics.
///
/// Each item sets three bits derived from the first six bytes of its
/// Keccak256 hash, the classic three-index construction.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Bloom([u8; BLOOM_SIZE]);

impl Bloom {
    /// The empty bloom filter.
    pub const EMPTY: Self = Self([0u8; BLOOM_SIZE]);

    /// Creates a bloom from raw bytes.
    pub const fn new(bytes: [u8; BLOOM_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the filter as a byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Checks whether no bits are set.
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Adds an item to the filter.
    pub fn accrue(&mut self, item: &[u8]) {
        let hash = crate::keccak256(item);
        let h = hash.as_bytes();
        for i in 0..3 {
            let bit = ((h[i * 2] as usize) << 8 | h[i * 2 + 1] as usize) % (BLOOM_SIZE * 8);
            self.0[BLOOM_SIZE - 1 - bit / 8] |= 1 << (bit % 8);
        }
    }

    /// Adds a log's address and topics to the filter.
    pub fn accrue_log(&mut self, log: &Log) {
        self.accrue(log.address.as_bytes());
        for topic in &log.topics {
            self.accrue(topic.as_bytes());
        }
    }

    /// Probabilistically checks whether an item is in the filter.
    pub fn contains(&self, item: &[u8]) -> bool {
        let hash = crate::keccak256(item);
        let h = hash.as_bytes();
        for i in 0..3 {
            let bit = ((h[i * 2] as usize) << 8 | h[i * 2 + 1] as usize) % (BLOOM_SIZE * 8);
            if self.0[BLOOM_SIZE - 1 - bit / 8] & (1 << (bit % 8)) == 0 {
                return false;
            }
        }
        true
    }

    /// Merges another bloom into this one.
    pub fn accrue_bloom(&mut self, other: &Bloom) {
        for (a, b) in self.0.iter_mut().zip(other.0.iter()) {
            *a |= b;
        }
    }
}

impl Default for Bloom {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for Bloom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bloom(0x{})", hex::encode(self.0))
    }
}

impl Serialize for Bloom {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(self.0)))
    }
}

impl<'de> Deserialize<'de> for Bloom {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let s = s.strip_prefix("0x").unwrap_or(&s);
        let bytes = hex::decode(s).map_err(serde::de::Error::custom)?;
        if bytes.len() != BLOOM_SIZE {
            return Err(serde::de::Error::custom("invalid bloom length"));
        }
        let mut arr = [0u8; BLOOM_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl Encodable for Bloom {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.encoder().encode_value(&self.0);
    }
}

impl Decodable for Bloom {
    fn decode(rlp: &Rlp<'_>) -> std::result::Result<Self, DecoderError> {
        let bytes: Vec<u8> = rlp.as_val()?;
        if bytes.len() != BLOOM_SIZE {
            return Err(DecoderError::RlpInvalidLength);
        }
        let mut arr = [0u8; BLOOM_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

/// A transaction receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Account state root after applying the transaction
    pub post_state: H256,
    /// Record state root after applying the transaction
    pub post_record_state: H256,
    /// Whether the transaction failed (state was rolled back)
    pub failed: bool,
    /// Hash of the transaction
    pub tx_hash: H256,
    /// Logs emitted while applying the transaction
    pub logs: Vec<Log>,
    /// Bloom filter over the logs
    pub bloom: Bloom,
}

impl Receipt {
    /// Creates a receipt with its bloom derived from the logs.
    pub fn new(
        post_state: H256,
        post_record_state: H256,
        failed: bool,
        tx_hash: H256,
        logs: Vec<Log>,
    ) -> Self {
        let mut bloom = Bloom::EMPTY;
        for log in &logs {
            bloom.accrue_log(log);
        }
        Self {
            post_state,
            post_record_state,
            failed,
            tx_hash,
            logs,
            bloom,
        }
    }

    /// RLP encodes the receipt.
    pub fn rlp_bytes(&self) -> Bytes {
        rlp::encode(self).freeze()
    }
}

impl Encodable for Receipt {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(6);
        s.append(&self.post_state);
        s.append(&self.post_record_state);
        s.append(&(self.failed as u8));
        s.append(&self.tx_hash);
        s.begin_list(self.logs.len());
        for log in &self.logs {
            s.append(log);
        }
        s.append(&self.bloom);
    }
}

impl Decodable for Receipt {
    fn decode(rlp: &Rlp<'_>) -> std::result::Result<Self, DecoderError> {
        if rlp.item_count()? != 6 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        let failed: u8 = rlp.val_at(2)?;
        Ok(Self {
            post_state: rlp.val_at(0)?,
            post_record_state: rlp.val_at(1)?,
            failed: failed != 0,
            tx_hash: rlp.val_at(3)?,
            logs: rlp.list_at(4)?,
            bloom: rlp.val_at(5)?,
        })
    }
}

/// Computes the union bloom over a slice of receipts.
pub fn create_bloom(receipts: &[Receipt]) -> Bloom {
    let mut bloom = Bloom::EMPTY;
    for receipt in receipts {
        bloom.accrue_bloom(&receipt.bloom);
    }
    bloom
}
