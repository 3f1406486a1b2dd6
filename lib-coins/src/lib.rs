//! Coin Inventory
//!
//! Wallet-owned unspent outputs (credits), the persistent store they live
//! in, and the in-memory index used for O(1) lookup and account filtering
//! during fund selection.
//!
//! All index mutation goes through [`CachedBatch`]: intended changes are
//! recorded against both the store batch and the index, and the index only
//! applies them after the store write succeeds. A failed persistent write
//! leaves the in-memory view untouched.

pub mod credit;
pub mod index;
pub mod keys;
pub mod store;

pub use credit::{Coin, Credit};
pub use index::{CachedBatch, CoinIndex};
pub use store::{BatchOp, SledWalletStore, StoreBatch, StoreError, Tree, WalletStore};
