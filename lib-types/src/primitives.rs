//! Canonical Primitive Types
//!
//! Rule: no String identifiers in consensus-critical state. Ever.
//!
//! These types are the foundational building blocks for everything the wallet
//! persists or puts on the wire. They are designed to be:
//! - Fixed-size (no dynamic allocation)
//! - Deterministically serializable
//! - Efficient to copy and compare

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// TYPE ALIASES
// ============================================================================

/// Block height in the chain (0-indexed). Covenants embed heights as u32.
pub type BlockHeight = u32;

/// Coin amounts in base units.
pub type Amount = u64;

// ============================================================================
// HASH TYPES
// ============================================================================

macro_rules! hash32 {
    ($name:ident, $label:expr) => {
        #[doc = concat!("32-byte ", $label, ".")]
        #[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize, Default)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            /// Create from raw bytes.
            pub const fn new(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            /// The all-zero hash.
            pub const fn zero() -> Self {
                Self([0u8; 32])
            }

            /// Get the underlying bytes.
            pub const fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Check whether this is the zero hash.
            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; 32]
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), hex::encode(&self.0[..8]))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }
    };
}

hash32!(TxHash, "transaction hash");
hash32!(BlockHash, "block hash");
hash32!(NameHash, "name hash (protocol identifier of a readable name)");
hash32!(AddressHash, "address witness-program hash");

// ============================================================================
// ADDRESS
// ============================================================================

/// A wallet address: witness version plus a fixed-width program hash.
///
/// The version byte travels with the hash in TRANSFER covenants, so the pair
/// is the canonical unit, never the hash alone.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize, Default)]
pub struct Address {
    pub version: u8,
    pub hash: AddressHash,
}

impl Address {
    pub const fn new(version: u8, hash: AddressHash) -> Self {
        Self { version, hash }
    }

    /// The null address (version 0, zero hash). Outputs paying here are
    /// unspendable and rejected by the funder.
    pub const fn null() -> Self {
        Self {
            version: 0,
            hash: AddressHash::zero(),
        }
    }

    pub fn is_null(&self) -> bool {
        self.version == 0 && self.hash.is_zero()
    }

    /// Canonical encoding: version byte followed by the program hash.
    pub fn to_bytes(&self) -> [u8; 33] {
        let mut out = [0u8; 33];
        out[0] = self.version;
        out[1..].copy_from_slice(self.hash.as_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; 33]) -> Self {
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes[1..]);
        Self {
            version: bytes[0],
            hash: AddressHash(hash),
        }
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address(v{}, {})", self.version, hex::encode(&self.hash.0[..8]))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.version, hex::encode(self.hash.0))
    }
}

// ============================================================================
// OUTPOINT
// ============================================================================

/// Reference to a specific output within a transaction.
///
/// This is the canonical way to identify a coin. Never use tx hash alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    /// Transaction containing this output.
    pub tx: TxHash,
    /// Index of the output within the transaction (0-based).
    pub index: u32,
}

impl OutPoint {
    pub const fn new(tx: TxHash, index: u32) -> Self {
        Self { tx, index }
    }

    /// Canonical byte layout: [tx_hash: 32][index: 4 BE] = 36 bytes.
    ///
    /// Big-endian index keeps outputs of one transaction adjacent and sorted
    /// under lexicographic key order.
    pub fn to_bytes(&self) -> [u8; 36] {
        let mut key = [0u8; 36];
        key[..32].copy_from_slice(self.tx.as_bytes());
        key[32..].copy_from_slice(&self.index.to_be_bytes());
        key
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 36 {
            return None;
        }
        let mut tx = [0u8; 32];
        tx.copy_from_slice(&bytes[..32]);
        let index = u32::from_be_bytes([bytes[32], bytes[33], bytes[34], bytes[35]]);
        Some(Self {
            tx: TxHash(tx),
            index,
        })
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx, self.index)
    }
}

// ============================================================================
// TESTS
// ============================================================================
