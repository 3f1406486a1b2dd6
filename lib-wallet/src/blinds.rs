//! Blind Store
//!
//! Persistent mapping from a blind commitment to the `(value, nonce)` pair
//! it commits to. A BID cannot be revealed without its record; the entry is
//! exclusively owned by the bidder that wrote it.
//!
//! Writes ride on the same atomic batch as the credits they accompany, so a
//! failed store write loses neither or both.

use std::sync::Arc;

use lib_coins::{keys, CachedBatch, StoreBatch, Tree, WalletStore};
use lib_rules::BlindValue;

use crate::errors::WalletError;

pub struct BlindStore {
    store: Arc<dyn WalletStore>,
}

impl BlindStore {
    pub fn new(store: Arc<dyn WalletStore>) -> Self {
        Self { store }
    }

    /// Resolve a blind to its value and nonce.
    pub fn get(&self, blind: &[u8; 32]) -> Result<Option<BlindValue>, WalletError> {
        let Some(bytes) = self.store.get(Tree::Blinds, keys::blind_key(blind))? else {
            return Ok(None);
        };
        let value = bincode::deserialize(&bytes)
            .map_err(|e| WalletError::Internal(format!("corrupt blind record: {e}")))?;
        Ok(Some(value))
    }

    pub fn has(&self, blind: &[u8; 32]) -> Result<bool, WalletError> {
        Ok(self.store.get(Tree::Blinds, keys::blind_key(blind))?.is_some())
    }

    /// Record a blind on a batch that also carries the bid's bookkeeping.
    pub fn put(batch: &mut CachedBatch, blind: &[u8; 32], value: &BlindValue) {
        Self::put_on(batch.store_mut(), blind, value);
    }

    /// Record a blind on a bare store batch.
    pub fn put_on(batch: &mut StoreBatch, blind: &[u8; 32], value: &BlindValue) {
        let bytes = bincode::serialize(value).expect("blind value serializes");
        batch.put(Tree::Blinds, keys::blind_key(blind).to_vec(), bytes);
    }
}
