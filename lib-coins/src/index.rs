//! Coin Index
//!
//! In-memory index over persisted credits: primary map keyed by
//! (tx hash, output index), secondary index by account. Populated by a full
//! scan at wallet open; kept consistent with disk by [`CachedBatch`].
//!
//! The batch records intended index mutations alongside the store batch.
//! Commit order is disk first, memory second: if the store write fails, the
//! index is left exactly as it was.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use lib_types::{OutPoint, TxHash};

use crate::credit::Credit;
use crate::keys;
use crate::store::{StoreBatch, StoreError, Tree, WalletStore};

/// Deferred in-memory mutation, applied only after the store commit.
#[derive(Debug, Clone)]
enum IndexOp {
    PutCredit(Box<Credit>),
    DelCredit { outpoint: OutPoint, account: u32 },
}

/// A store batch plus the index mutations that mirror it.
#[derive(Debug, Default)]
pub struct CachedBatch {
    store: StoreBatch,
    ops: Vec<IndexOp>,
}

impl CachedBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a credit insert/update.
    pub fn put_credit(&mut self, credit: &Credit) -> Result<(), StoreError> {
        let key = keys::credit_key(&credit.outpoint());
        let value = bincode::serialize(credit).map_err(|e| StoreError::Corrupt {
            tree: "credits",
            reason: e.to_string(),
        })?;
        self.store.put(Tree::Credits, key.to_vec(), value);
        self.ops.push(IndexOp::PutCredit(Box::new(credit.clone())));
        Ok(())
    }

    /// Record a credit removal.
    pub fn del_credit(&mut self, outpoint: OutPoint, account: u32) {
        let key = keys::credit_key(&outpoint);
        self.store.del(Tree::Credits, key.to_vec());
        self.ops.push(IndexOp::DelCredit { outpoint, account });
    }

    /// Piggy-back arbitrary ops (blind records, meta) on the same atomic
    /// write.
    pub fn store_mut(&mut self) -> &mut StoreBatch {
        &mut self.store
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty() && self.ops.is_empty()
    }
}

/// In-memory credit index.
#[derive(Debug, Default)]
pub struct CoinIndex {
    /// tx hash → output index → credit.
    by_outpoint: HashMap<TxHash, HashMap<u32, Credit>>,
    /// account → tx hash → output indexes.
    by_account: HashMap<u32, HashMap<TxHash, BTreeSet<u32>>>,
}

impl CoinIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate from the store's credit tree. Called once at wallet open.
    pub fn populate(&mut self, store: &dyn WalletStore) -> Result<usize, StoreError> {
        let entries = store.scan(Tree::Credits)?;
        let mut count = 0usize;
        for (key, value) in entries {
            let outpoint = keys::parse_credit_key(&key).ok_or_else(|| StoreError::Corrupt {
                tree: "credits",
                reason: format!("bad key length {}", key.len()),
            })?;
            let credit: Credit =
                bincode::deserialize(&value).map_err(|e| StoreError::Corrupt {
                    tree: "credits",
                    reason: e.to_string(),
                })?;
            if credit.outpoint() != outpoint {
                return Err(StoreError::Corrupt {
                    tree: "credits",
                    reason: format!("key {} does not match record {}", outpoint, credit.outpoint()),
                });
            }
            self.insert(credit);
            count += 1;
        }
        debug!(credits = count, "coin index populated");
        Ok(count)
    }

    /// Commit `batch`: disk first, then memory. A store failure leaves the
    /// index untouched.
    pub fn commit(
        &mut self,
        store: &dyn WalletStore,
        batch: CachedBatch,
    ) -> Result<(), StoreError> {
        store.write(batch.store)?;
        for op in batch.ops {
            match op {
                IndexOp::PutCredit(credit) => self.insert(*credit),
                IndexOp::DelCredit { outpoint, account } => self.remove(outpoint, account),
            }
        }
        Ok(())
    }

    fn insert(&mut self, credit: Credit) {
        let outpoint = credit.outpoint();
        let account = credit.account;
        self.by_account
            .entry(account)
            .or_default()
            .entry(outpoint.tx)
            .or_default()
            .insert(outpoint.index);
        self.by_outpoint
            .entry(outpoint.tx)
            .or_default()
            .insert(outpoint.index, credit);
    }

    fn remove(&mut self, outpoint: OutPoint, account: u32) {
        if let Some(outputs) = self.by_outpoint.get_mut(&outpoint.tx) {
            outputs.remove(&outpoint.index);
            if outputs.is_empty() {
                self.by_outpoint.remove(&outpoint.tx);
            }
        }
        if let Some(txs) = self.by_account.get_mut(&account) {
            if let Some(indexes) = txs.get_mut(&outpoint.tx) {
                indexes.remove(&outpoint.index);
                if indexes.is_empty() {
                    txs.remove(&outpoint.tx);
                }
            }
            if txs.is_empty() {
                self.by_account.remove(&account);
            }
        }
    }

    // ------------------------------------------------------------------
    // Queries. Credits are cloned out; mutation goes through the batch.
    // ------------------------------------------------------------------

    pub fn credit(&self, tx: &TxHash, index: u32) -> Option<Credit> {
        self.by_outpoint.get(tx)?.get(&index).cloned()
    }

    pub fn has_coin(&self, tx: &TxHash, index: u32) -> bool {
        self.by_outpoint
            .get(tx)
            .map(|outputs| outputs.contains_key(&index))
            .unwrap_or(false)
    }

    pub fn has_account_coin(&self, account: u32, tx: &TxHash, index: u32) -> bool {
        self.by_account
            .get(&account)
            .and_then(|txs| txs.get(tx))
            .map(|indexes| indexes.contains(&index))
            .unwrap_or(false)
    }

    /// All credits, optionally restricted to one account.
    pub fn credits(&self, account: Option<u32>) -> Vec<Credit> {
        match account {
            None => self
                .by_outpoint
                .values()
                .flat_map(|outputs| outputs.values().cloned())
                .collect(),
            Some(account) => {
                let Some(txs) = self.by_account.get(&account) else {
                    return Vec::new();
                };
                let mut out = Vec::new();
                for (tx, indexes) in txs {
                    for index in indexes {
                        if let Some(credit) = self.credit(tx, *index) {
                            out.push(credit);
                        }
                    }
                }
                out
            }
        }
    }

    pub fn outpoints(&self, account: Option<u32>) -> Vec<OutPoint> {
        self.credits(account)
            .into_iter()
            .map(|c| c.outpoint())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_outpoint.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_outpoint.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credit::Coin;
    use crate::store::SledWalletStore;
    use lib_types::{Address, AddressHash, Covenant};

    fn credit(tx_byte: u8, index: u32, account: u32) -> Credit {
        Credit::new(
            Coin {
                outpoint: OutPoint::new(TxHash::new([tx_byte; 32]), index),
                value: 1_000 * (index as u64 + 1),
                address: Address::new(0, AddressHash::new([tx_byte; 32])),
                covenant: Covenant::None,
                height: Some(1),
                coinbase: false,
            },
            account,
        )
    }

    fn committed(store: &SledWalletStore, index: &mut CoinIndex, credits: &[Credit]) {
        let mut batch = CachedBatch::new();
        for c in credits {
            batch.put_credit(c).unwrap();
        }
        index.commit(store, batch).unwrap();
    }

    #[test]
    fn test_put_and_query() {
        let store = SledWalletStore::temporary().unwrap();
        let mut index = CoinIndex::new();
        committed(&store, &mut index, &[credit(1, 0, 0), credit(1, 1, 0), credit(2, 0, 7)]);

        assert_eq!(index.len(), 3);
        assert!(index.has_coin(&TxHash::new([1; 32]), 0));
        assert!(index.has_coin(&TxHash::new([1; 32]), 1));
        assert!(!index.has_coin(&TxHash::new([1; 32]), 2));

        assert!(index.has_account_coin(7, &TxHash::new([2; 32]), 0));
        assert!(!index.has_account_coin(0, &TxHash::new([2; 32]), 0));

        assert_eq!(index.credits(Some(0)).len(), 2);
        assert_eq!(index.credits(Some(7)).len(), 1);
        assert_eq!(index.credits(None).len(), 3);
    }

    #[test]
    fn test_del_cleans_secondary_index() {
        let store = SledWalletStore::temporary().unwrap();
        let mut index = CoinIndex::new();
        committed(&store, &mut index, &[credit(1, 0, 3)]);

        let mut batch = CachedBatch::new();
        batch.del_credit(OutPoint::new(TxHash::new([1; 32]), 0), 3);
        index.commit(&store, batch).unwrap();

        assert!(index.is_empty());
        assert!(index.credits(Some(3)).is_empty());
        assert_eq!(store.get(Tree::Credits, &credit_key_of(1, 0)).unwrap(), None);
    }

    fn credit_key_of(tx_byte: u8, index: u32) -> Vec<u8> {
        keys::credit_key(&OutPoint::new(TxHash::new([tx_byte; 32]), index)).to_vec()
    }

    #[test]
    fn test_populate_rebuilds_account_index() {
        let store = SledWalletStore::temporary().unwrap();
        let mut index = CoinIndex::new();
        committed(&store, &mut index, &[credit(1, 0, 0), credit(2, 5, 9)]);

        let mut rebuilt = CoinIndex::new();
        let count = rebuilt.populate(&store).unwrap();
        assert_eq!(count, 2);
        assert!(rebuilt.has_account_coin(9, &TxHash::new([2; 32]), 5));
        assert_eq!(rebuilt.credits(Some(0)).len(), 1);
    }

    #[test]
    fn test_failed_write_leaves_index_untouched() {
        struct FailingStore;
        impl WalletStore for FailingStore {
            fn get(&self, _: Tree, _: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
                Ok(None)
            }
            fn scan(&self, _: Tree) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
                Ok(Vec::new())
            }
            fn write(&self, _: StoreBatch) -> Result<(), StoreError> {
                Err(StoreError::Backend("disk full".into()))
            }
        }

        let mut index = CoinIndex::new();
        let mut batch = CachedBatch::new();
        batch.put_credit(&credit(1, 0, 0)).unwrap();
        assert!(index.commit(&FailingStore, batch).is_err());
        assert!(index.is_empty());
    }

    #[test]
    fn test_spent_update_overwrites() {
        let store = SledWalletStore::temporary().unwrap();
        let mut index = CoinIndex::new();
        let mut c = credit(1, 0, 0);
        committed(&store, &mut index, std::slice::from_ref(&c));

        c.spent = true;
        committed(&store, &mut index, std::slice::from_ref(&c));

        assert_eq!(index.len(), 1);
        assert!(index.credit(&TxHash::new([1; 32]), 0).unwrap().spent);
    }
}
