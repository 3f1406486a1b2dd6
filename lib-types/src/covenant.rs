//! Output Covenants
//!
//! A covenant is typed side-data attached to a transaction output that
//! constrains how the output can be spent. Each covenant type carries a fixed
//! item tuple; the tuple shape is enforced at construction time, so runtime
//! item access is total and typed; there is no indexing into an untyped item list.
//!
//! # Wire format
//!
//! Covenant encoding is PROTOCOL. Layout:
//!
//! ```text
//! [type: u8][item_count: u8]([item_len: u16 LE][item_bytes])*
//! ```
//!
//! Fixed-width items (hashes, epochs, flags) are validated to their exact
//! width on decode, so decode-then-encode is byte-exact.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::primitives::{AddressHash, BlockHeight, NameHash};

/// Largest single covenant item the decoder will accept.
pub const MAX_COVENANT_ITEM: usize = 1024;

/// Error decoding or constructing a covenant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CovenantError {
    #[error("Unknown covenant type: {0}")]
    UnknownType(u8),

    #[error("Wrong item count for {covenant:?}: expected {expected}, got {got}")]
    WrongItemCount {
        covenant: CovenantType,
        expected: u8,
        got: u8,
    },

    #[error("Item {index} has wrong width: expected {expected}, got {got}")]
    WrongItemWidth {
        index: usize,
        expected: usize,
        got: usize,
    },

    #[error("Covenant item exceeds {MAX_COVENANT_ITEM} bytes: {0}")]
    ItemTooLarge(usize),

    #[error("Truncated covenant")]
    Truncated,
}

/// Covenant type discriminants. Values are wire format; never renumber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CovenantType {
    None = 0,
    Claim = 1,
    Open = 2,
    Bid = 3,
    Reveal = 4,
    Redeem = 5,
    Register = 6,
    Update = 7,
    Renew = 8,
    Transfer = 9,
    Finalize = 10,
    Revoke = 11,
}

impl CovenantType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Claim),
            2 => Some(Self::Open),
            3 => Some(Self::Bid),
            4 => Some(Self::Reveal),
            5 => Some(Self::Redeem),
            6 => Some(Self::Register),
            7 => Some(Self::Update),
            8 => Some(Self::Renew),
            9 => Some(Self::Transfer),
            10 => Some(Self::Finalize),
            11 => Some(Self::Revoke),
            _ => None,
        }
    }

    /// Types that hold a name after the auction closed. An owner coin with
    /// one of these covenants may be updated, renewed, or transferred.
    pub fn is_ownership(self) -> bool {
        matches!(
            self,
            Self::Register | Self::Update | Self::Renew | Self::Finalize
        )
    }

    /// Types whose output value is locked to the name machinery rather than
    /// freely spendable.
    pub fn is_name(self) -> bool {
        self != Self::None
    }
}

impl fmt::Display for CovenantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::None => "NONE",
            Self::Claim => "CLAIM",
            Self::Open => "OPEN",
            Self::Bid => "BID",
            Self::Reveal => "REVEAL",
            Self::Redeem => "REDEEM",
            Self::Register => "REGISTER",
            Self::Update => "UPDATE",
            Self::Renew => "RENEW",
            Self::Transfer => "TRANSFER",
            Self::Finalize => "FINALIZE",
            Self::Revoke => "REVOKE",
        };
        f.write_str(label)
    }
}

/// A typed covenant. One variant per wire type; each field is one wire item
/// in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Covenant {
    /// Plain payment output.
    #[default]
    None,
    /// Reserved-name claim. The wallet never constructs these, but must
    /// decode them: a claimed name's owner coin carries one.
    Claim {
        name_hash: NameHash,
        epoch: BlockHeight,
        name: Vec<u8>,
    },
    /// Starts an auction epoch. Value is always zero.
    Open {
        name_hash: NameHash,
        /// Always zero in an OPEN; the epoch starts at the block that
        /// confirms it.
        epoch: BlockHeight,
        name: Vec<u8>,
    },
    /// Blinded bid. The output value is the lockup; the true bid hides
    /// inside `blind`.
    Bid {
        name_hash: NameHash,
        epoch: BlockHeight,
        name: Vec<u8>,
        blind: [u8; 32],
    },
    /// Opens a blind: output value is the actual bid.
    Reveal {
        name_hash: NameHash,
        epoch: BlockHeight,
        nonce: [u8; 32],
    },
    /// Releases a losing reveal's funds.
    Redeem {
        name_hash: NameHash,
        epoch: BlockHeight,
    },
    /// First record after winning: pays the second price, publishes data.
    Register {
        name_hash: NameHash,
        epoch: BlockHeight,
        resource: Vec<u8>,
        renewal_hash: [u8; 32],
    },
    /// Replaces the published resource. Empty resource cancels a transfer.
    Update {
        name_hash: NameHash,
        epoch: BlockHeight,
        resource: Vec<u8>,
    },
    /// Extends the renewal window against a fresh block anchor.
    Renew {
        name_hash: NameHash,
        epoch: BlockHeight,
        renewal_hash: [u8; 32],
    },
    /// Announces an ownership move to a new address.
    Transfer {
        name_hash: NameHash,
        epoch: BlockHeight,
        address_version: u8,
        address_hash: AddressHash,
    },
    /// Completes a transfer after the lockup.
    Finalize {
        name_hash: NameHash,
        epoch: BlockHeight,
        name: Vec<u8>,
        /// Bit 0: weak (claimed without a DNSSEC chain).
        flags: u8,
        claimed: u32,
        renewals: u32,
        renewal_hash: [u8; 32],
    },
    /// Burns the name until the epoch ends.
    Revoke {
        name_hash: NameHash,
        epoch: BlockHeight,
    },
}

impl Covenant {
    pub fn covenant_type(&self) -> CovenantType {
        match self {
            Self::None => CovenantType::None,
            Self::Claim { .. } => CovenantType::Claim,
            Self::Open { .. } => CovenantType::Open,
            Self::Bid { .. } => CovenantType::Bid,
            Self::Reveal { .. } => CovenantType::Reveal,
            Self::Redeem { .. } => CovenantType::Redeem,
            Self::Register { .. } => CovenantType::Register,
            Self::Update { .. } => CovenantType::Update,
            Self::Renew { .. } => CovenantType::Renew,
            Self::Transfer { .. } => CovenantType::Transfer,
            Self::Finalize { .. } => CovenantType::Finalize,
            Self::Revoke { .. } => CovenantType::Revoke,
        }
    }

    /// The name hash this covenant binds, if any.
    pub fn name_hash(&self) -> Option<NameHash> {
        match self {
            Self::None => None,
            Self::Claim { name_hash, .. }
            | Self::Open { name_hash, .. }
            | Self::Bid { name_hash, .. }
            | Self::Reveal { name_hash, .. }
            | Self::Redeem { name_hash, .. }
            | Self::Register { name_hash, .. }
            | Self::Update { name_hash, .. }
            | Self::Renew { name_hash, .. }
            | Self::Transfer { name_hash, .. }
            | Self::Finalize { name_hash, .. }
            | Self::Revoke { name_hash, .. } => Some(*name_hash),
        }
    }

    /// The auction epoch this covenant repeats, if any. Zero on OPEN.
    pub fn epoch(&self) -> Option<BlockHeight> {
        match self {
            Self::None => None,
            Self::Claim { epoch, .. }
            | Self::Open { epoch, .. }
            | Self::Bid { epoch, .. }
            | Self::Reveal { epoch, .. }
            | Self::Redeem { epoch, .. }
            | Self::Register { epoch, .. }
            | Self::Update { epoch, .. }
            | Self::Renew { epoch, .. }
            | Self::Transfer { epoch, .. }
            | Self::Finalize { epoch, .. }
            | Self::Revoke { epoch, .. } => Some(*epoch),
        }
    }

    pub fn is_name(&self) -> bool {
        self.covenant_type().is_name()
    }

    pub fn is_ownership(&self) -> bool {
        self.covenant_type().is_ownership()
    }

    /// An UPDATE with an empty resource reverts a pending transfer.
    pub fn is_cancel(&self) -> bool {
        matches!(self, Self::Update { resource, .. } if resource.is_empty())
    }

    // ------------------------------------------------------------------
    // Wire encoding
    // ------------------------------------------------------------------

    fn items(&self) -> Vec<Vec<u8>> {
        match self {
            Self::None => vec![],
            Self::Claim {
                name_hash,
                epoch,
                name,
            } => vec![
                name_hash.as_bytes().to_vec(),
                epoch.to_le_bytes().to_vec(),
                name.clone(),
            ],
            Self::Open {
                name_hash,
                epoch,
                name,
            } => vec![
                name_hash.as_bytes().to_vec(),
                epoch.to_le_bytes().to_vec(),
                name.clone(),
            ],
            Self::Bid {
                name_hash,
                epoch,
                name,
                blind,
            } => vec![
                name_hash.as_bytes().to_vec(),
                epoch.to_le_bytes().to_vec(),
                name.clone(),
                blind.to_vec(),
            ],
            Self::Reveal {
                name_hash,
                epoch,
                nonce,
            } => vec![
                name_hash.as_bytes().to_vec(),
                epoch.to_le_bytes().to_vec(),
                nonce.to_vec(),
            ],
            Self::Redeem { name_hash, epoch } => vec![
                name_hash.as_bytes().to_vec(),
                epoch.to_le_bytes().to_vec(),
            ],
            Self::Register {
                name_hash,
                epoch,
                resource,
                renewal_hash,
            } => vec![
                name_hash.as_bytes().to_vec(),
                epoch.to_le_bytes().to_vec(),
                resource.clone(),
                renewal_hash.to_vec(),
            ],
            Self::Update {
                name_hash,
                epoch,
                resource,
            } => vec![
                name_hash.as_bytes().to_vec(),
                epoch.to_le_bytes().to_vec(),
                resource.clone(),
            ],
            Self::Renew {
                name_hash,
                epoch,
                renewal_hash,
            } => vec![
                name_hash.as_bytes().to_vec(),
                epoch.to_le_bytes().to_vec(),
                renewal_hash.to_vec(),
            ],
            Self::Transfer {
                name_hash,
                epoch,
                address_version,
                address_hash,
            } => vec![
                name_hash.as_bytes().to_vec(),
                epoch.to_le_bytes().to_vec(),
                vec![*address_version],
                address_hash.as_bytes().to_vec(),
            ],
            Self::Finalize {
                name_hash,
                epoch,
                name,
                flags,
                claimed,
                renewals,
                renewal_hash,
            } => vec![
                name_hash.as_bytes().to_vec(),
                epoch.to_le_bytes().to_vec(),
                name.clone(),
                vec![*flags],
                claimed.to_le_bytes().to_vec(),
                renewals.to_le_bytes().to_vec(),
                renewal_hash.to_vec(),
            ],
            Self::Revoke { name_hash, epoch } => vec![
                name_hash.as_bytes().to_vec(),
                epoch.to_le_bytes().to_vec(),
            ],
        }
    }

    /// Append the canonical encoding to `out`.
    pub fn encode_to(&self, out: &mut Vec<u8>) {
        let items = self.items();
        out.push(self.covenant_type() as u8);
        out.push(items.len() as u8);
        for item in &items {
            debug_assert!(item.len() <= MAX_COVENANT_ITEM);
            out.extend_from_slice(&(item.len() as u16).to_le_bytes());
            out.extend_from_slice(item);
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_to(&mut out);
        out
    }

    /// Size of the canonical encoding in bytes.
    pub fn encoded_len(&self) -> usize {
        2 + self
            .items()
            .iter()
            .map(|item| 2 + item.len())
            .sum::<usize>()
    }

    /// Decode a covenant from `bytes`, returning the covenant and the number
    /// of bytes consumed.
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize), CovenantError> {
        if bytes.len() < 2 {
            return Err(CovenantError::Truncated);
        }
        let type_byte = bytes[0];
        let count = bytes[1];
        let covenant_type =
            CovenantType::from_u8(type_byte).ok_or(CovenantError::UnknownType(type_byte))?;

        let mut items: Vec<Vec<u8>> = Vec::with_capacity(count as usize);
        let mut at = 2usize;
        for _ in 0..count {
            if bytes.len() < at + 2 {
                return Err(CovenantError::Truncated);
            }
            let len = u16::from_le_bytes([bytes[at], bytes[at + 1]]) as usize;
            at += 2;
            if len > MAX_COVENANT_ITEM {
                return Err(CovenantError::ItemTooLarge(len));
            }
            if bytes.len() < at + len {
                return Err(CovenantError::Truncated);
            }
            items.push(bytes[at..at + len].to_vec());
            at += len;
        }

        let covenant = Self::from_items(covenant_type, items)?;
        Ok((covenant, at))
    }

    fn from_items(
        covenant_type: CovenantType,
        items: Vec<Vec<u8>>,
    ) -> Result<Self, CovenantError> {
        let expect = |n: u8| -> Result<(), CovenantError> {
            if items.len() != n as usize {
                return Err(CovenantError::WrongItemCount {
                    covenant: covenant_type,
                    expected: n,
                    got: items.len() as u8,
                });
            }
            Ok(())
        };

        fn fixed<const N: usize>(index: usize, item: &[u8]) -> Result<[u8; N], CovenantError> {
            if item.len() != N {
                return Err(CovenantError::WrongItemWidth {
                    index,
                    expected: N,
                    got: item.len(),
                });
            }
            let mut out = [0u8; N];
            out.copy_from_slice(item);
            Ok(out)
        }

        let covenant = match covenant_type {
            CovenantType::None => {
                expect(0)?;
                Self::None
            }
            CovenantType::Claim => {
                expect(3)?;
                Self::Claim {
                    name_hash: NameHash(fixed::<32>(0, &items[0])?),
                    epoch: u32::from_le_bytes(fixed::<4>(1, &items[1])?),
                    name: items[2].clone(),
                }
            }
            CovenantType::Open => {
                expect(3)?;
                Self::Open {
                    name_hash: NameHash(fixed::<32>(0, &items[0])?),
                    epoch: u32::from_le_bytes(fixed::<4>(1, &items[1])?),
                    name: items[2].clone(),
                }
            }
            CovenantType::Bid => {
                expect(4)?;
                Self::Bid {
                    name_hash: NameHash(fixed::<32>(0, &items[0])?),
                    epoch: u32::from_le_bytes(fixed::<4>(1, &items[1])?),
                    name: items[2].clone(),
                    blind: fixed::<32>(3, &items[3])?,
                }
            }
            CovenantType::Reveal => {
                expect(3)?;
                Self::Reveal {
                    name_hash: NameHash(fixed::<32>(0, &items[0])?),
                    epoch: u32::from_le_bytes(fixed::<4>(1, &items[1])?),
                    nonce: fixed::<32>(2, &items[2])?,
                }
            }
            CovenantType::Redeem => {
                expect(2)?;
                Self::Redeem {
                    name_hash: NameHash(fixed::<32>(0, &items[0])?),
                    epoch: u32::from_le_bytes(fixed::<4>(1, &items[1])?),
                }
            }
            CovenantType::Register => {
                expect(4)?;
                Self::Register {
                    name_hash: NameHash(fixed::<32>(0, &items[0])?),
                    epoch: u32::from_le_bytes(fixed::<4>(1, &items[1])?),
                    resource: items[2].clone(),
                    renewal_hash: fixed::<32>(3, &items[3])?,
                }
            }
            CovenantType::Update => {
                expect(3)?;
                Self::Update {
                    name_hash: NameHash(fixed::<32>(0, &items[0])?),
                    epoch: u32::from_le_bytes(fixed::<4>(1, &items[1])?),
                    resource: items[2].clone(),
                }
            }
            CovenantType::Renew => {
                expect(3)?;
                Self::Renew {
                    name_hash: NameHash(fixed::<32>(0, &items[0])?),
                    epoch: u32::from_le_bytes(fixed::<4>(1, &items[1])?),
                    renewal_hash: fixed::<32>(2, &items[2])?,
                }
            }
            CovenantType::Transfer => {
                expect(4)?;
                Self::Transfer {
                    name_hash: NameHash(fixed::<32>(0, &items[0])?),
                    epoch: u32::from_le_bytes(fixed::<4>(1, &items[1])?),
                    address_version: fixed::<1>(2, &items[2])?[0],
                    address_hash: AddressHash(fixed::<32>(3, &items[3])?),
                }
            }
            CovenantType::Finalize => {
                expect(7)?;
                Self::Finalize {
                    name_hash: NameHash(fixed::<32>(0, &items[0])?),
                    epoch: u32::from_le_bytes(fixed::<4>(1, &items[1])?),
                    name: items[2].clone(),
                    flags: fixed::<1>(3, &items[3])?[0],
                    claimed: u32::from_le_bytes(fixed::<4>(4, &items[4])?),
                    renewals: u32::from_le_bytes(fixed::<4>(5, &items[5])?),
                    renewal_hash: fixed::<32>(6, &items[6])?,
                }
            }
            CovenantType::Revoke => {
                expect(2)?;
                Self::Revoke {
                    name_hash: NameHash(fixed::<32>(0, &items[0])?),
                    epoch: u32::from_le_bytes(fixed::<4>(1, &items[1])?),
                }
            }
        };

        Ok(covenant)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_covenants() -> Vec<Covenant> {
        let name_hash = NameHash::new([0xaa; 32]);
        vec![
            Covenant::None,
            Covenant::Open {
                name_hash,
                epoch: 0,
                name: b"alice".to_vec(),
            },
            Covenant::Bid {
                name_hash,
                epoch: 120,
                name: b"alice".to_vec(),
                blind: [0x0b; 32],
            },
            Covenant::Reveal {
                name_hash,
                epoch: 120,
                nonce: [0x0c; 32],
            },
            Covenant::Redeem {
                name_hash,
                epoch: 120,
            },
            Covenant::Register {
                name_hash,
                epoch: 120,
                resource: vec![1, 2, 3, 4],
                renewal_hash: [0x0d; 32],
            },
            Covenant::Update {
                name_hash,
                epoch: 120,
                resource: vec![],
            },
            Covenant::Renew {
                name_hash,
                epoch: 120,
                renewal_hash: [0x0e; 32],
            },
            Covenant::Transfer {
                name_hash,
                epoch: 120,
                address_version: 0,
                address_hash: AddressHash::new([0x0f; 32]),
            },
            Covenant::Finalize {
                name_hash,
                epoch: 120,
                name: b"alice".to_vec(),
                flags: 1,
                claimed: 0,
                renewals: 3,
                renewal_hash: [0x10; 32],
            },
            Covenant::Revoke {
                name_hash,
                epoch: 120,
            },
        ]
    }

    #[test]
    fn test_encode_decode_roundtrip_is_byte_exact() {
        for covenant in sample_covenants() {
            let bytes = covenant.encode();
            let (decoded, consumed) = Covenant::decode(&bytes).unwrap();
            assert_eq!(consumed, bytes.len());
            assert_eq!(decoded, covenant);
            // Re-encoding must reproduce the original bytes exactly.
            assert_eq!(decoded.encode(), bytes);
        }
    }

    #[test]
    fn test_encoded_len_matches() {
        for covenant in sample_covenants() {
            assert_eq!(covenant.encode().len(), covenant.encoded_len());
        }
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        assert_eq!(
            Covenant::decode(&[99, 0]),
            Err(CovenantError::UnknownType(99))
        );
    }

    #[test]
    fn test_decode_rejects_truncation() {
        let bytes = Covenant::Redeem {
            name_hash: NameHash::new([1; 32]),
            epoch: 5,
        }
        .encode();
        for cut in 0..bytes.len() {
            assert!(Covenant::decode(&bytes[..cut]).is_err(), "cut at {}", cut);
        }
    }

    #[test]
    fn test_decode_rejects_wrong_width() {
        // REDEEM with a 31-byte name hash item.
        let mut bytes = vec![CovenantType::Redeem as u8, 2];
        bytes.extend_from_slice(&31u16.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 31]);
        bytes.extend_from_slice(&4u16.to_le_bytes());
        bytes.extend_from_slice(&5u32.to_le_bytes());
        assert!(matches!(
            Covenant::decode(&bytes),
            Err(CovenantError::WrongItemWidth { index: 0, .. })
        ));
    }

    #[test]
    fn test_cancel_is_empty_update() {
        let cancel = Covenant::Update {
            name_hash: NameHash::new([2; 32]),
            epoch: 9,
            resource: vec![],
        };
        assert!(cancel.is_cancel());
        let update = Covenant::Update {
            name_hash: NameHash::new([2; 32]),
            epoch: 9,
            resource: vec![1],
        };
        assert!(!update.is_cancel());
    }

    #[test]
    fn test_ownership_predicate() {
        assert!(CovenantType::Register.is_ownership());
        assert!(CovenantType::Finalize.is_ownership());
        assert!(!CovenantType::Bid.is_ownership());
        assert!(!CovenantType::Transfer.is_ownership());
    }
}
