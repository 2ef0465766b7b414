//! RLP helpers for [`U256`] quantities.
//!
//! Balances, contributions and record times are arbitrary-precision
//! unsigned integers. On the wire they are encoded as big-endian byte
//! strings with leading zeros trimmed, the canonical quantity encoding.

pub use alloy_primitives::U256;
use rlp::{DecoderError, Rlp, RlpStream};

/// Appends a `U256` to an RLP stream as a trimmed big-endian byte string.
pub fn append_u256(s: &mut RlpStream, value: &U256) {
    let bytes = value.to_be_bytes_trimmed_vec();
    s.encoder().encode_value(&bytes);
}

/// Decodes a `U256` from an RLP byte string.
///
/// Rejects values longer than 32 bytes and non-canonical encodings with
/// leading zeros.
pub fn decode_u256(rlp: &Rlp<'_>) -> Result<U256, DecoderError> {
    let bytes: Vec<u8> = rlp.as_val()?;
    if bytes.len() > 32 {
        return Err(DecoderError::RlpIsTooBig);
    }
    if bytes.first() == Some(&0) {
        return Err(DecoderError::RlpInvalidIndirection);
    }
    Ok(U256::from_be_slice(&bytes))
}

/// Decodes a `U256` at a list index.
pub fn u256_at(rlp: &Rlp<'_>, index: usize) -> Result<U256, DecoderError> {
    decode_u256(&rlp.at(index)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: U256) {
        let mut s = RlpStream::new();
        append_u256(&mut s, &value);
        let bytes = s.out();
        let decoded = decode_u256(&Rlp::new(&bytes)).unwrap();
        assert_eq!(value, decoded);
    }

    #[test]
    fn test_u256_roundtrip() {
        roundtrip(U256::ZERO);
        roundtrip(U256::from(1u64));
        roundtrip(U256::from(2_000_000_000_000_000_000u128));
        roundtrip(U256::MAX);
    }

    #[test]
    fn test_u256_matches_u64_encoding() {
        // The trimmed big-endian encoding must agree with rlp's native
        // unsigned integer encoding.
        let mut s = RlpStream::new();
        append_u256(&mut s, &U256::from(1024u64));
        let ours = s.out().to_vec();
        let native = rlp::encode(&1024u64).to_vec();
        assert_eq!(ours, native);
    }

    #[test]
    fn test_u256_rejects_leading_zeros() {
        // 0x00 0x01 as a byte string is not a canonical quantity
        let mut s = RlpStream::new();
        s.encoder().encode_value(&[0x00, 0x01]);
        let bytes = s.out();
        assert!(decode_u256(&Rlp::new(&bytes)).is_err());
    }
}
