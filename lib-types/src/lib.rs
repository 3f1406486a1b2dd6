//! Canonical types for the naming-chain wallet.
//! Stable, behavior-free where possible; encoding is protocol.

pub mod covenant;
pub mod primitives;
pub mod transaction;

pub use covenant::{Covenant, CovenantError, CovenantType};
pub use primitives::{
    Address, AddressHash, Amount, BlockHash, BlockHeight, NameHash, OutPoint, TxHash,
};
pub use transaction::{Input, Output, Transaction, TxError};
