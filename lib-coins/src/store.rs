//! Wallet Store
//!
//! Atomic batch interface over the wallet's persistent trees, with a sled
//! implementation. The contract is deliberately narrow: point reads, full
//! scans, and atomic multi-tree batch writes. Callers never see sled types.
//!
//! A batch either applies completely or not at all; a failed write must
//! leave both disk and (via [`crate::CachedBatch`]) memory unchanged.

use std::path::Path;

use sled::Transactional;
use thiserror::Error;
use tracing::debug;

/// Named trees in the wallet store. The set is protocol for this wallet's
/// on-disk layout; renaming breaks existing databases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tree {
    /// outpoint → credit
    Credits,
    /// blind commitment → (value, nonce)
    Blinds,
    /// name hash → readable name
    Names,
    /// txid → signed pending transaction (removed on confirmation)
    Txs,
    /// wallet metadata
    Meta,
}

impl Tree {
    const ALL: [Tree; 5] = [
        Tree::Credits,
        Tree::Blinds,
        Tree::Names,
        Tree::Txs,
        Tree::Meta,
    ];

    fn name(self) -> &'static str {
        match self {
            Tree::Credits => "credits",
            Tree::Blinds => "blinds",
            Tree::Names => "names",
            Tree::Txs => "txs",
            Tree::Meta => "meta",
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Corrupt record in tree {tree:?}: {reason}")]
    Corrupt { tree: &'static str, reason: String },
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// A single pending mutation.
#[derive(Debug, Clone)]
pub enum BatchOp {
    Put {
        tree: Tree,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Del {
        tree: Tree,
        key: Vec<u8>,
    },
}

/// Buffered mutations for one atomic write.
#[derive(Debug, Default, Clone)]
pub struct StoreBatch {
    pub(crate) ops: Vec<BatchOp>,
}

impl StoreBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, tree: Tree, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Put {
            tree,
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn del(&mut self, tree: Tree, key: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Del {
            tree,
            key: key.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }
}

/// The persistence contract the wallet engine composes against.
pub trait WalletStore: Send + Sync {
    /// Point read.
    fn get(&self, tree: Tree, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Full scan of one tree, in key order.
    fn scan(&self, tree: Tree) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;

    /// Apply every op in `batch` atomically.
    fn write(&self, batch: StoreBatch) -> Result<(), StoreError>;
}

// ============================================================================
// SLED IMPLEMENTATION
// ============================================================================

/// Sled-backed wallet store. One sled tree per [`Tree`] variant; batches are
/// applied inside a single sled transaction across all trees.
pub struct SledWalletStore {
    _db: sled::Db,
    credits: sled::Tree,
    blinds: sled::Tree,
    names: sled::Tree,
    txs: sled::Tree,
    meta: sled::Tree,
}

impl SledWalletStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// In-memory store for tests: backed by a temporary sled database that
    /// is discarded on drop.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, StoreError> {
        let credits = db.open_tree(Tree::Credits.name())?;
        let blinds = db.open_tree(Tree::Blinds.name())?;
        let names = db.open_tree(Tree::Names.name())?;
        let txs = db.open_tree(Tree::Txs.name())?;
        let meta = db.open_tree(Tree::Meta.name())?;
        Ok(Self {
            _db: db,
            credits,
            blinds,
            names,
            txs,
            meta,
        })
    }

    fn tree(&self, tree: Tree) -> &sled::Tree {
        match tree {
            Tree::Credits => &self.credits,
            Tree::Blinds => &self.blinds,
            Tree::Names => &self.names,
            Tree::Txs => &self.txs,
            Tree::Meta => &self.meta,
        }
    }
}

impl WalletStore for SledWalletStore {
    fn get(&self, tree: Tree, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.tree(tree).get(key)?.map(|v| v.to_vec()))
    }

    fn scan(&self, tree: Tree) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let mut out = Vec::new();
        for entry in self.tree(tree).iter() {
            let (key, value) = entry?;
            out.push((key.to_vec(), value.to_vec()));
        }
        Ok(out)
    }

    fn write(&self, batch: StoreBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        // Group ops into one sled::Batch per tree, then apply them in a
        // single transaction so a crash can't leave a partial write.
        let mut per_tree: Vec<(Tree, sled::Batch)> = Vec::new();
        for op in &batch.ops {
            let (tree, key) = match op {
                BatchOp::Put { tree, key, .. } => (*tree, key),
                BatchOp::Del { tree, key } => (*tree, key),
            };
            let entry = match per_tree.iter_mut().find(|(t, _)| *t == tree) {
                Some((_, b)) => b,
                None => {
                    per_tree.push((tree, sled::Batch::default()));
                    &mut per_tree.last_mut().unwrap().1
                }
            };
            match op {
                BatchOp::Put { value, .. } => entry.insert(key.as_slice(), value.as_slice()),
                BatchOp::Del { .. } => entry.remove(key.as_slice()),
            }
        }

        let trees: Vec<&sled::Tree> = Tree::ALL.iter().map(|t| self.tree(*t)).collect();
        let result: Result<(), sled::transaction::TransactionError> =
            trees.as_slice().transaction(|txs| {
                for (tree, batch) in &per_tree {
                    let pos = Tree::ALL.iter().position(|t| t == tree).unwrap();
                    txs[pos].apply_batch(batch)?;
                }
                Ok(())
            });
        result.map_err(|e| StoreError::Backend(e.to_string()))?;

        debug!(ops = batch.len(), "store batch committed");
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
