//! Blind Commitments
//!
//! A bid broadcasts `blind = H(value ‖ nonce)` instead of the value itself.
//! The nonce is derived deterministically from the bidder's address, an
//! account pubkey selected by the bid value, and the name hash, so a wallet
//! that lost its blind records can regenerate every nonce it ever used from
//! key material alone.

use lib_types::{Address, Amount, NameHash};
use serde::{Deserialize, Serialize};

/// The secret a blind commits to. Persisted by the blind store; required at
/// reveal time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlindValue {
    pub value: Amount,
    pub nonce: [u8; 32],
}

/// Pubkey index used for nonce derivation: fold the 64-bit value into 31
/// bits so it always lands in the non-hardened key range.
pub fn nonce_index(value: Amount) -> u32 {
    let hi = (value >> 32) as u32;
    let lo = value as u32;
    (hi ^ lo) & 0x7fff_ffff
}

/// Deterministic reveal nonce: `H(addr_hash ‖ account_pubkey ‖ name_hash)`.
pub fn blind_nonce(address: &Address, account_pubkey: &[u8; 33], name_hash: &NameHash) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(address.hash.as_bytes());
    hasher.update(account_pubkey);
    hasher.update(name_hash.as_bytes());
    hasher.finalize().into()
}

/// The public commitment: `H(value ‖ nonce)`.
pub fn blind_commitment(value: Amount, nonce: &[u8; 32]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&value.to_le_bytes());
    hasher.update(nonce);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::name_hash;
    use lib_types::AddressHash;

    fn addr() -> Address {
        Address::new(0, AddressHash::new([0x51; 32]))
    }

    #[test]
    fn test_nonce_index_is_31_bits() {
        assert_eq!(nonce_index(0), 0);
        assert!(nonce_index(u64::MAX) <= 0x7fff_ffff);
        // hi ^ lo folding: 0x00000001_00000001 folds to zero.
        assert_eq!(nonce_index(0x0000_0001_0000_0001), 0);
    }

    #[test]
    fn test_nonce_is_deterministic() {
        let hash = name_hash("gamma");
        let pubkey = [2u8; 33];
        let a = blind_nonce(&addr(), &pubkey, &hash);
        let b = blind_nonce(&addr(), &pubkey, &hash);
        assert_eq!(a, b);
    }

    #[test]
    fn test_nonce_binds_all_inputs() {
        let hash = name_hash("gamma");
        let pubkey = [2u8; 33];
        let base = blind_nonce(&addr(), &pubkey, &hash);

        let other_addr = Address::new(0, AddressHash::new([0x52; 32]));
        assert_ne!(blind_nonce(&other_addr, &pubkey, &hash), base);
        assert_ne!(blind_nonce(&addr(), &[3u8; 33], &hash), base);
        assert_ne!(blind_nonce(&addr(), &pubkey, &name_hash("delta")), base);
    }

    #[test]
    fn test_commitment_binds_value_and_nonce() {
        let nonce = [7u8; 32];
        let blind = blind_commitment(1_000, &nonce);
        assert_ne!(blind_commitment(1_001, &nonce), blind);
        assert_ne!(blind_commitment(1_000, &[8u8; 32]), blind);
        assert_eq!(blind_commitment(1_000, &nonce), blind);
    }
}
