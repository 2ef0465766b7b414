//! Block and BlockHeader types for Provenet.
//!
//! The header commits to all three state stores: the account state root,
//! the record state root, and the per-trie roots of the PoC and record
//! contexts. Together with the transactions and receipts roots this makes
//! a block's effects fully verifiable from its header.

use crate::{Address, Error, PocContextRoots, RecordContextRoots, Result, Transaction, H256};
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use serde::{Deserialize, Serialize};

/// A block header containing all metadata about a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Chain identifier (prevents cross-chain replay)
    pub chain_id: u64,
    /// Block height (0-indexed, genesis is height 0)
    pub height: u64,
    /// Unix timestamp in seconds; must sit on a block-interval boundary
    pub timestamp: u64,
    /// Hash of the parent block (NIL for genesis)
    pub parent_hash: H256,
    /// Merkle root of the transactions in this block
    pub transactions_root: H256,
    /// Root of the account state after executing this block
    pub state_root: H256,
    /// Root of the record state after executing this block
    pub record_root: H256,
    /// Merkle root of the transaction receipts
    pub receipts_root: H256,
    /// Per-trie roots of the PoC context
    pub poc_roots: PocContextRoots,
    /// Per-trie roots of the record context
    pub record_ctx_roots: RecordContextRoots,
    /// Address of the validator that sealed this block
    pub validator: Address,
}

impl Default for BlockHeader {
    fn default() -> Self {
        Self {
            chain_id: 1,
            height: 0,
            timestamp: 0,
            parent_hash: H256::NIL,
            transactions_root: H256::NIL,
            state_root: H256::NIL,
            record_root: H256::NIL,
            receipts_root: H256::NIL,
            poc_roots: PocContextRoots::default(),
            record_ctx_roots: RecordContextRoots::default(),
            validator: Address::ZERO,
        }
    }
}

impl BlockHeader {
    /// Creates a new block header.
    pub fn new(
        chain_id: u64,
        height: u64,
        timestamp: u64,
        parent_hash: H256,
        validator: Address,
    ) -> Self {
        Self {
            chain_id,
            height,
            timestamp,
            parent_hash,
            validator,
            ..Default::default()
        }
    }

    /// Computes the hash of this block header.
    ///
    /// The hash is the Keccak256 of the RLP-encoded header.
    pub fn hash(&self) -> H256 {
        H256::keccak256(&rlp::encode(self))
    }

    /// Decodes a header from RLP bytes.
    pub fn rlp_decode(data: &[u8]) -> Result<Self> {
        rlp::decode(data).map_err(Error::RlpDecode)
    }

    /// Validates the header against basic structural rules.
    pub fn validate_basic(&self) -> Result<()> {
        if self.height > 0 && self.parent_hash.is_nil() {
            return Err(Error::InvalidTransaction(
                "non-genesis block must have parent hash".into(),
            ));
        }
        if self.height > 0 && self.validator.is_zero() {
            return Err(Error::InvalidTransaction(
                "non-genesis block must name its validator".into(),
            ));
        }
        Ok(())
    }
}

impl Encodable for BlockHeader {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(11);
        s.append(&self.chain_id);
        s.append(&self.height);
        s.append(&self.timestamp);
        s.append(&self.parent_hash);
        s.append(&self.transactions_root);
        s.append(&self.state_root);
        s.append(&self.record_root);
        s.append(&self.receipts_root);
        s.append(&self.poc_roots);
        s.append(&self.record_ctx_roots);
        s.append(&self.validator);
    }
}

impl Decodable for BlockHeader {
    fn decode(rlp: &Rlp<'_>) -> std::result::Result<Self, DecoderError> {
        if rlp.item_count()? != 11 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Self {
            chain_id: rlp.val_at(0)?,
            height: rlp.val_at(1)?,
            timestamp: rlp.val_at(2)?,
            parent_hash: rlp.val_at(3)?,
            transactions_root: rlp.val_at(4)?,
            state_root: rlp.val_at(5)?,
            record_root: rlp.val_at(6)?,
            receipts_root: rlp.val_at(7)?,
            poc_roots: rlp.val_at(8)?,
            record_ctx_roots: rlp.val_at(9)?,
            validator: rlp.val_at(10)?,
        })
    }
}

/// A complete block: header plus ordered transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// The block header
    pub header: BlockHeader,
    /// Transactions in execution order
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Creates a block from a header and transactions.
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        Self {
            header,
            transactions,
        }
    }

    /// Returns the block hash (the header hash).
    pub fn hash(&self) -> H256 {
        self.header.hash()
    }

    /// Returns the block height.
    pub fn height(&self) -> u64 {
        self.header.height
    }
}

impl Encodable for Block {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2);
        s.append(&self.header);
        s.begin_list(self.transactions.len());
        for tx in &self.transactions {
            s.append(tx);
        }
    }
}

impl Decodable for Block {
    fn decode(rlp: &Rlp<'_>) -> std::result::Result<Self, DecoderError> {
        if rlp.item_count()? != 2 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Self {
            header: rlp.val_at(0)?,
            transactions: rlp.list_at(1)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uint::U256;

    fn sample_header() -> BlockHeader {
        BlockHeader {
            chain_id: 1,
            height: 42,
            timestamp: 86_400,
            parent_hash: H256::keccak256(b"parent"),
            validator: Address::from([0x07; 20]),
            state_root: H256::keccak256(b"state"),
            record_root: H256::keccak256(b"record"),
            ..Default::default()
        }
    }

    #[test]
    fn test_header_hash_deterministic() {
        let header = sample_header();
        assert_eq!(header.hash(), header.hash());

        let mut other = header.clone();
        other.timestamp += 10;
        assert_ne!(header.hash(), other.hash());
    }

    #[test]
    fn test_header_rlp_roundtrip() {
        let header = sample_header();
        let encoded = rlp::encode(&header);
        let decoded = BlockHeader::rlp_decode(&encoded).unwrap();
        assert_eq!(header, decoded);
        assert_eq!(header.hash(), decoded.hash());
    }

    #[test]
    fn test_block_rlp_roundtrip() {
        let tx = Transaction::transfer(
            1,
            0,
            Address::from([0x11; 20]),
            Address::from([0x22; 20]),
            U256::from(5u64),
        );
        let block = Block::new(sample_header(), vec![tx]);
        let encoded = rlp::encode(&block);
        let decoded: Block = rlp::decode(&encoded).unwrap();
        assert_eq!(block, decoded);
    }

    #[test]
    fn test_validate_basic() {
        let header = sample_header();
        assert!(header.validate_basic().is_ok());

        let mut orphan = header.clone();
        orphan.parent_hash = H256::NIL;
        assert!(orphan.validate_basic().is_err());

        let mut unsealed = header;
        unsealed.validator = Address::ZERO;
        assert!(unsealed.validate_basic().is_err());
    }
}
