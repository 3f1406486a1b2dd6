//! Lock Manager
//!
//! Two advisory locks per wallet, always acquired in the same order:
//!
//! 1. `fund`: held for any coin-selection or transaction-producing path.
//! 2. `write`: held for any mutation of wallet state (index, blinds, meta).
//!
//! When both are needed, fund is taken first, then write; guards drop in
//! reverse. [`LockManager::fund_then_write`] is the only way to obtain both,
//! which pins the order at the type level.
//!
//! A coin can additionally be soft-locked while a producer holds the fund
//! lock, so two overlapping transactions cannot select the same outpoint
//! even before the first is persisted.

use std::collections::HashSet;
use std::sync::Mutex as StdMutex;

use lib_types::OutPoint;
use tokio::sync::{Mutex, MutexGuard};
use tracing::trace;

pub struct LockManager {
    fund: Mutex<()>,
    write: Mutex<()>,
    locked: StdMutex<HashSet<OutPoint>>,
}

/// Held for the duration of a transaction-producing call path.
pub struct FundGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

/// Held for the duration of a state mutation.
pub struct WriteGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            fund: Mutex::new(()),
            write: Mutex::new(()),
            locked: StdMutex::new(HashSet::new()),
        }
    }

    /// Acquire the fund lock alone.
    pub async fn fund(&self) -> FundGuard<'_> {
        let guard = self.fund.lock().await;
        trace!("fund lock acquired");
        FundGuard { _guard: guard }
    }

    /// Acquire the write lock alone. Callers that also need the fund lock
    /// must use [`Self::fund_then_write`] instead of calling both.
    pub async fn write(&self) -> WriteGuard<'_> {
        let guard = self.write.lock().await;
        trace!("write lock acquired");
        WriteGuard { _guard: guard }
    }

    /// Acquire both locks in the canonical order. The write guard is
    /// returned second and dropped first.
    pub async fn fund_then_write(&self) -> (FundGuard<'_>, WriteGuard<'_>) {
        let fund = self.fund().await;
        let write = self.write().await;
        (fund, write)
    }

    /// Take the write lock while the fund lock is already held. Borrowing
    /// the fund guard makes the ordering a compile-time property.
    pub async fn write_within<'a>(&'a self, _fund: &FundGuard<'a>) -> WriteGuard<'a> {
        self.write().await
    }

    // ------------------------------------------------------------------
    // Soft-locked coins
    // ------------------------------------------------------------------

    /// Soft-lock a coin. Returns false if it was already locked.
    pub fn lock_coin(&self, outpoint: OutPoint) -> bool {
        self.locked.lock().expect("lock set poisoned").insert(outpoint)
    }

    pub fn unlock_coin(&self, outpoint: &OutPoint) -> bool {
        self.locked.lock().expect("lock set poisoned").remove(outpoint)
    }

    pub fn is_coin_locked(&self, outpoint: &OutPoint) -> bool {
        self.locked.lock().expect("lock set poisoned").contains(outpoint)
    }

    /// Snapshot of the soft-locked set, for selection filtering.
    pub fn locked_coins(&self) -> HashSet<OutPoint> {
        self.locked.lock().expect("lock set poisoned").clone()
    }

    pub fn unlock_all(&self) {
        self.locked.lock().expect("lock set poisoned").clear();
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
