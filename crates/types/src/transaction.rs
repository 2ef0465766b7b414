//! Proof-of-Contribution transaction types.
//!
//! This module provides transaction-related types for Provenet:
//! - [`Transaction`] - The core transaction structure
//! - [`TxType`] - The closed set of transaction types
//!
//! Provenet has no virtual machine; the six transaction types below are the
//! entire execution surface. Signing and sender recovery happen outside the
//! core, so a transaction carries its sender explicitly.

use crate::uint::{append_u256, u256_at, U256};
use crate::{Address, Error, Result, H256};
use bytes::Bytes;
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use serde::{Deserialize, Serialize};

/// Transaction type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum TxType {
    /// Plain value transfer between accounts
    #[default]
    Binary = 0x00,
    /// Register the sender as a validator candidate
    LoginCandidate = 0x01,
    /// Remove the sender from the candidate pool
    LogoutCandidate = 0x02,
    /// Confirm (create) a globally unique data record
    ConfirmationData = 0x03,
    /// Reserved: grant rights over a record
    AuthorizationData = 0x04,
    /// Transfer ownership of an existing record
    TransferData = 0x05,
}

impl TxType {
    /// Returns the transaction type byte.
    pub const fn as_byte(&self) -> u8 {
        *self as u8
    }

    /// Creates a TxType from a byte.
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0x00 => Ok(Self::Binary),
            0x01 => Ok(Self::LoginCandidate),
            0x02 => Ok(Self::LogoutCandidate),
            0x03 => Ok(Self::ConfirmationData),
            0x04 => Ok(Self::AuthorizationData),
            0x05 => Ok(Self::TransferData),
            _ => Err(Error::InvalidTransaction(format!(
                "unknown transaction type: 0x{:02x}",
                byte
            ))),
        }
    }

    /// Checks whether this type operates on the record state.
    pub fn is_record_type(&self) -> bool {
        matches!(
            self,
            Self::ConfirmationData | Self::AuthorizationData | Self::TransferData
        )
    }

    /// Checks whether this type operates on the candidate pool.
    pub fn is_candidate_type(&self) -> bool {
        matches!(self, Self::LoginCandidate | Self::LogoutCandidate)
    }
}

/// A Provenet transaction.
///
/// # Example
///
/// ```rust
/// use provenet_types::{Address, Transaction};
/// use provenet_types::uint::U256;
///
/// let from = Address::from([0x11; 20]);
/// let to = Address::from([0x22; 20]);
/// let tx = Transaction::transfer(1, 0, from, to, U256::from(5u64));
/// assert!(!tx.hash().is_nil());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction type
    #[serde(default)]
    pub tx_type: TxType,
    /// Chain ID (prevents replay attacks across chains)
    pub chain_id: u64,
    /// Sender nonce (prevents replay attacks)
    pub nonce: u64,
    /// Sender address
    pub from: Address,
    /// Recipient address (None for candidate and confirmation transactions)
    pub to: Option<Address>,
    /// Value to transfer
    pub value: U256,
    /// Opaque payload; for record transactions its RLP hash identifies the record
    #[serde(with = "hex_bytes")]
    pub data: Bytes,
}

impl Default for Transaction {
    fn default() -> Self {
        Self {
            tx_type: TxType::Binary,
            chain_id: 1,
            nonce: 0,
            from: Address::ZERO,
            to: None,
            value: U256::ZERO,
            data: Bytes::new(),
        }
    }
}

impl Transaction {
    /// Creates a plain value transfer.
    pub fn transfer(chain_id: u64, nonce: u64, from: Address, to: Address, value: U256) -> Self {
        Self {
            tx_type: TxType::Binary,
            chain_id,
            nonce,
            from,
            to: Some(to),
            value,
            data: Bytes::new(),
        }
    }

    /// Creates a candidate registration transaction.
    pub fn login_candidate(chain_id: u64, nonce: u64, from: Address) -> Self {
        Self {
            tx_type: TxType::LoginCandidate,
            chain_id,
            nonce,
            from,
            to: None,
            value: U256::ZERO,
            data: Bytes::new(),
        }
    }

    /// Creates a candidate removal transaction.
    pub fn logout_candidate(chain_id: u64, nonce: u64, from: Address) -> Self {
        Self {
            tx_type: TxType::LogoutCandidate,
            chain_id,
            nonce,
            from,
            to: None,
            value: U256::ZERO,
            data: Bytes::new(),
        }
    }

    /// Creates a record confirmation transaction for the given payload.
    pub fn confirm_record(chain_id: u64, nonce: u64, from: Address, data: impl Into<Bytes>) -> Self {
        Self {
            tx_type: TxType::ConfirmationData,
            chain_id,
            nonce,
            from,
            to: None,
            value: U256::ZERO,
            data: data.into(),
        }
    }

    /// Creates a record ownership transfer transaction.
    ///
    /// `data` must be the record's original payload; the record is addressed
    /// by `keccak256(rlp(data))`.
    pub fn transfer_record(
        chain_id: u64,
        nonce: u64,
        from: Address,
        to: Address,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            tx_type: TxType::TransferData,
            chain_id,
            nonce,
            from,
            to: Some(to),
            value: U256::ZERO,
            data: data.into(),
        }
    }

    /// Computes the transaction hash: Keccak256 of the RLP encoding.
    pub fn hash(&self) -> H256 {
        H256::keccak256(&rlp::encode(self))
    }

    /// Derives the record hash addressed by this transaction's payload:
    /// `keccak256(rlp(data))`.
    pub fn record_hash(&self) -> H256 {
        let encoded = rlp::encode(&self.data.as_ref());
        H256::keccak256(&encoded)
    }
}

impl Encodable for Transaction {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(7);
        s.append(&self.tx_type.as_byte());
        s.append(&self.chain_id);
        s.append(&self.nonce);
        s.append(&self.from);
        match &self.to {
            Some(to) => s.append(to),
            None => s.append_empty_data(),
        };
        append_u256(s, &self.value);
        s.append(&self.data.as_ref());
    }
}

impl Decodable for Transaction {
    fn decode(rlp: &Rlp<'_>) -> std::result::Result<Self, DecoderError> {
        if rlp.item_count()? != 7 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        let type_byte: u8 = rlp.val_at(0)?;
        let tx_type =
            TxType::from_byte(type_byte).map_err(|_| DecoderError::Custom("invalid tx type"))?;
        let to_rlp = rlp.at(4)?;
        let to = if to_rlp.is_empty() {
            None
        } else {
            Some(Address::decode(&to_rlp)?)
        };
        let data: Vec<u8> = rlp.val_at(6)?;
        Ok(Self {
            tx_type,
            chain_id: rlp.val_at(1)?,
            nonce: rlp.val_at(2)?,
            from: rlp.val_at(3)?,
            to,
            value: u256_at(rlp, 5)?,
            data: Bytes::from(data),
        })
    }
}

mod hex_bytes {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let s = s.strip_prefix("0x").unwrap_or(&s);
        let bytes = hex::decode(s).map_err(serde::de::Error::custom)?;
        Ok(Bytes::from(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_type_roundtrip() {
        for byte in 0u8..=5 {
            let ty = TxType::from_byte(byte).unwrap();
            assert_eq!(ty.as_byte(), byte);
        }
        assert!(TxType::from_byte(6).is_err());
    }

    #[test]
    fn test_tx_type_families() {
        assert!(TxType::ConfirmationData.is_record_type());
        assert!(TxType::TransferData.is_record_type());
        assert!(TxType::AuthorizationData.is_record_type());
        assert!(!TxType::Binary.is_record_type());

        assert!(TxType::LoginCandidate.is_candidate_type());
        assert!(TxType::LogoutCandidate.is_candidate_type());
        assert!(!TxType::ConfirmationData.is_candidate_type());
    }

    #[test]
    fn test_transfer_rlp_roundtrip() {
        let tx = Transaction::transfer(
            1,
            7,
            Address::from([0x11; 20]),
            Address::from([0x22; 20]),
            U256::from(1000u64),
        );
        let encoded = rlp::encode(&tx);
        let decoded: Transaction = rlp::decode(&encoded).unwrap();
        assert_eq!(tx, decoded);
        assert_eq!(tx.hash(), decoded.hash());
    }

    #[test]
    fn test_candidate_tx_has_no_recipient() {
        let tx = Transaction::login_candidate(1, 0, Address::from([0x33; 20]));
        let encoded = rlp::encode(&tx);
        let decoded: Transaction = rlp::decode(&encoded).unwrap();
        assert_eq!(decoded.to, None);
        assert_eq!(decoded.tx_type, TxType::LoginCandidate);
    }

    #[test]
    fn test_record_hash_depends_only_on_data() {
        let a = Transaction::confirm_record(1, 0, Address::from([0x01; 20]), &b"payload"[..]);
        let b = Transaction::confirm_record(1, 5, Address::from([0x02; 20]), &b"payload"[..]);
        assert_eq!(a.record_hash(), b.record_hash());
        assert_ne!(a.hash(), b.hash());

        let c = Transaction::confirm_record(1, 0, Address::from([0x01; 20]), &b"other"[..]);
        assert_ne!(a.record_hash(), c.record_hash());
    }

    #[test]
    fn test_hash_changes_with_nonce() {
        let mut tx = Transaction::transfer(
            1,
            0,
            Address::from([0x11; 20]),
            Address::from([0x22; 20]),
            U256::from(1u64),
        );
        let h0 = tx.hash();
        tx.nonce = 1;
        assert_ne!(h0, tx.hash());
    }

    #[test]
    fn test_transaction_serde() {
        let tx = Transaction::confirm_record(1, 3, Address::from([0x44; 20]), &b"doc"[..]);
        let json = serde_json::to_string(&tx).unwrap();
        let decoded: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(tx, decoded);
    }
}
