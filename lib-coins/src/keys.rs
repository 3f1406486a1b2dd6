//! Key Encoding Helpers
//!
//! Key encoding is PROTOCOL for the wallet's own store. These functions
//! define the canonical byte layout for every storage key. Never inline key
//! construction in business logic.
//!
//! Conventions: fixed-width fields only, big-endian integers so keys sort
//! numerically, no delimiters.

use lib_types::OutPoint;

/// Key for the credits tree: [tx_hash: 32][index: 4 BE] → credit_bytes.
///
/// This keeps all outputs of one transaction adjacent for range scans.
#[inline]
pub fn credit_key(outpoint: &OutPoint) -> [u8; 36] {
    outpoint.to_bytes()
}

/// Parse an outpoint back out of a credit key.
#[inline]
pub fn parse_credit_key(key: &[u8]) -> Option<OutPoint> {
    OutPoint::from_bytes(key)
}

/// Key for the blinds tree: the 32-byte blind commitment itself.
#[inline]
pub fn blind_key(blind: &[u8; 32]) -> &[u8; 32] {
    blind
}

/// Key for the names tree: the 32-byte name hash → readable name.
#[inline]
pub fn name_key(hash: &[u8; 32]) -> &[u8; 32] {
    hash
}

/// Key for the pending-transactions tree: the 32-byte txid.
#[inline]
pub fn tx_key(txid: &[u8; 32]) -> &[u8; 32] {
    txid
}

/// Well-known meta keys.
pub mod meta {
    /// Height the wallet last synced through.
    pub const SYNC_HEIGHT: &[u8] = b"sync_height";

    /// Wallet schema version.
    pub const SCHEMA_VERSION: &[u8] = b"schema_version";
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_types::TxHash;

    #[test]
    fn test_credit_key_roundtrip() {
        let outpoint = OutPoint::new(TxHash::new([0xab; 32]), 42);
        let key = credit_key(&outpoint);
        assert_eq!(parse_credit_key(&key), Some(outpoint));
        assert!(parse_credit_key(&key[..35]).is_none());
    }

    #[test]
    fn test_credit_key_orders_outputs() {
        let tx = TxHash::new([1; 32]);
        assert!(credit_key(&OutPoint::new(tx, 1)) < credit_key(&OutPoint::new(tx, 2)));
        assert!(credit_key(&OutPoint::new(tx, 2)) < credit_key(&OutPoint::new(tx, 300)));
    }
}
