//! Transaction Wire Types
//!
//! Inputs, outputs and the transaction container, with the canonical
//! encoding the txid commits to. Witness data is carried on inputs but is
//! excluded from the txid preimage, so signing never changes a transaction's
//! identity.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

use crate::covenant::{Covenant, CovenantError};
use crate::primitives::{Address, Amount, OutPoint, TxHash};

/// Default input sequence (no relative locktime).
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// Witness weight estimate per input (signature + pubkey push), used by fee
/// estimation before signatures exist.
pub const INPUT_WITNESS_BYTES: usize = 110;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxError {
    #[error("Truncated transaction")]
    Truncated,

    #[error("Trailing bytes after transaction")]
    TrailingBytes,

    #[error(transparent)]
    Covenant(#[from] CovenantError),
}

/// A transaction input: the coin being spent plus its witness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    pub prevout: OutPoint,
    pub sequence: u32,
    /// Witness stack, filled by the signer. Not part of the txid.
    pub witness: Vec<Vec<u8>>,
}

impl Input {
    pub fn new(prevout: OutPoint) -> Self {
        Self {
            prevout,
            sequence: SEQUENCE_FINAL,
            witness: Vec::new(),
        }
    }
}

/// A transaction output: value, destination, and covenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub value: Amount,
    pub address: Address,
    pub covenant: Covenant,
}

impl Output {
    pub fn new(value: Amount, address: Address, covenant: Covenant) -> Self {
        Self {
            value,
            address,
            covenant,
        }
    }

    /// Plain payment output.
    pub fn pay(value: Amount, address: Address) -> Self {
        Self::new(value, address, Covenant::None)
    }

    /// Size of the canonical encoding in bytes.
    pub fn encoded_len(&self) -> usize {
        8 + 33 + self.covenant.encoded_len()
    }

    fn encode_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.value.to_le_bytes());
        out.extend_from_slice(&self.address.to_bytes());
        self.covenant.encode_to(out);
    }

    /// Canonical ordering for output sorting: value, then address bytes,
    /// then covenant bytes.
    fn sort_key(&self) -> (Amount, [u8; 33], Vec<u8>) {
        (self.value, self.address.to_bytes(), self.covenant.encode())
    }
}

/// A transaction template or final transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    pub locktime: u32,
}

impl Default for Transaction {
    fn default() -> Self {
        Self {
            version: 0,
            inputs: Vec::new(),
            outputs: Vec::new(),
            locktime: 0,
        }
    }
}

impl Transaction {
    /// Canonical encoding the txid commits to. Witness data is excluded.
    ///
    /// Layout:
    /// ```text
    /// [version: u32 LE]
    /// [input_count: u16 LE]([prevout: 36][sequence: u32 LE])*
    /// [output_count: u16 LE]([value: u64 LE][address: 33][covenant])*
    /// [locktime: u32 LE]
    /// ```
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.base_size());
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&(self.inputs.len() as u16).to_le_bytes());
        for input in &self.inputs {
            out.extend_from_slice(&input.prevout.to_bytes());
            out.extend_from_slice(&input.sequence.to_le_bytes());
        }
        out.extend_from_slice(&(self.outputs.len() as u16).to_le_bytes());
        for output in &self.outputs {
            output.encode_to(&mut out);
        }
        out.extend_from_slice(&self.locktime.to_le_bytes());
        out
    }

    /// Transaction id: hash of the canonical (witness-free) encoding.
    pub fn txid(&self) -> TxHash {
        TxHash(blake3::hash(&self.encode()).into())
    }

    /// Decode a transaction from its canonical encoding. Witnesses come
    /// back empty, exactly as they were encoded.
    pub fn decode(bytes: &[u8]) -> Result<Self, TxError> {
        let mut at = 0usize;

        fn take<'a>(bytes: &'a [u8], at: &mut usize, n: usize) -> Result<&'a [u8], TxError> {
            if bytes.len() < *at + n {
                return Err(TxError::Truncated);
            }
            let slice = &bytes[*at..*at + n];
            *at += n;
            Ok(slice)
        }

        let version = u32::from_le_bytes(take(bytes, &mut at, 4)?.try_into().unwrap());

        let input_count = u16::from_le_bytes(take(bytes, &mut at, 2)?.try_into().unwrap());
        let mut inputs = Vec::with_capacity(input_count as usize);
        for _ in 0..input_count {
            let prevout =
                OutPoint::from_bytes(take(bytes, &mut at, 36)?).ok_or(TxError::Truncated)?;
            let sequence = u32::from_le_bytes(take(bytes, &mut at, 4)?.try_into().unwrap());
            inputs.push(Input {
                prevout,
                sequence,
                witness: Vec::new(),
            });
        }

        let output_count = u16::from_le_bytes(take(bytes, &mut at, 2)?.try_into().unwrap());
        let mut outputs = Vec::with_capacity(output_count as usize);
        for _ in 0..output_count {
            let value = u64::from_le_bytes(take(bytes, &mut at, 8)?.try_into().unwrap());
            let address =
                Address::from_bytes(take(bytes, &mut at, 33)?.try_into().unwrap());
            let (covenant, consumed) = Covenant::decode(&bytes[at..])?;
            at += consumed;
            outputs.push(Output {
                value,
                address,
                covenant,
            });
        }

        let locktime = u32::from_le_bytes(take(bytes, &mut at, 4)?.try_into().unwrap());
        if at != bytes.len() {
            return Err(TxError::TrailingBytes);
        }

        Ok(Self {
            version,
            inputs,
            outputs,
            locktime,
        })
    }

    /// Witness-free size in bytes.
    pub fn base_size(&self) -> usize {
        4 + 2
            + self.inputs.len() * (36 + 4)
            + 2
            + self.outputs.iter().map(Output::encoded_len).sum::<usize>()
            + 4
    }

    /// Actual or estimated witness bytes. Unsigned inputs are costed at the
    /// single-signature estimate so fees can be computed before signing.
    pub fn witness_size(&self) -> usize {
        self.inputs
            .iter()
            .map(|input| {
                if input.witness.is_empty() {
                    INPUT_WITNESS_BYTES
                } else {
                    1 + input
                        .witness
                        .iter()
                        .map(|item| 1 + item.len())
                        .sum::<usize>()
                }
            })
            .sum()
    }

    /// Consensus weight: base bytes count four times, witness bytes once.
    pub fn weight(&self) -> usize {
        self.base_size() * 4 + self.witness_size()
    }

    /// Virtual size in bytes, rounded up.
    pub fn virtual_size(&self) -> usize {
        (self.weight() + 3) / 4
    }

    /// Signature-operation count. One sigop per input under the wallet's
    /// single-key witness programs.
    pub fn sigops(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_value(&self) -> Amount {
        self.outputs.iter().map(|o| o.value).sum()
    }

    /// Sort inputs and outputs into the canonical deterministic order
    /// (lexicographic prevouts; outputs by value, address, covenant).
    pub fn sort_members(&mut self) {
        self.inputs
            .sort_by(|a, b| match a.prevout.tx.0.cmp(&b.prevout.tx.0) {
                Ordering::Equal => a.prevout.index.cmp(&b.prevout.index),
                other => other,
            });
        self.outputs.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    }
}

// ============================================================================
// TESTS
// ============================================================================
