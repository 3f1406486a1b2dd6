//! Idempotency Cache
//!
//! At-most-once request capture keyed by caller-supplied strings. Each
//! action (open, bid, update, transfer, finalize, reveal, finish,
//! send_many) has its own bounded LRU map. Keys are canonical snake_case
//! end to end; there is exactly one spelling.
//!
//! Semantics:
//! - A completed entry is returned immediately with a `from_cache` flag.
//! - Concurrent callers on the same key share a single in-flight
//!   execution: one leader runs the producer, waiters park on a
//!   [`Notify`] and read the installed result.
//! - A failed producer removes its in-flight marker, so later callers
//!   retry. Only successful results are cached.
//!
//! Entries store post-broadcast details (tx hash, output index, covenant
//! type), never builders, so a replayed request can never re-spend coins.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use tokio::sync::Notify;
use tracing::debug;

use lib_types::{CovenantType, TxHash};

use crate::errors::WalletError;

/// One broadcast output a cached request resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedOutput {
    pub name: String,
    pub tx_hash: TxHash,
    pub vout: u32,
    pub covenant: CovenantType,
}

/// Cached value shapes: single-builder actions store one output; list
/// actions (bid/reveal/finish) accumulate outputs under the key.
#[derive(Debug, Clone)]
pub enum CachedValue {
    Single(ProcessedOutput),
    Many(Vec<ProcessedOutput>),
}

#[derive(Clone)]
enum Entry {
    InFlight(Arc<Notify>),
    Done(CachedValue),
}

/// Bounded at-most-once cache for one action.
pub struct ActionCache {
    entries: Mutex<LruCache<String, Entry>>,
}

impl ActionCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity > 0");
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Run `producer` at most once for `key`. Returns the value and whether
    /// it came from the cache.
    pub async fn with_cache<F, Fut>(
        &self,
        key: &str,
        producer: F,
    ) -> Result<(CachedValue, bool), WalletError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedValue, WalletError>>,
    {
        // Claim leadership or join an in-flight execution.
        let leader_notify;
        loop {
            let waiter = {
                let mut entries = self.entries.lock().expect("cache poisoned");
                match entries.get(key) {
                    Some(Entry::Done(value)) => {
                        debug!(key, "idempotency cache hit");
                        return Ok((value.clone(), true));
                    }
                    Some(Entry::InFlight(notify)) => notify.clone(),
                    None => {
                        let notify = Arc::new(Notify::new());
                        entries.put(key.to_string(), Entry::InFlight(notify.clone()));
                        leader_notify = notify;
                        break;
                    }
                }
            };
            // Register interest before re-checking, so a completion that
            // lands between the check and the await cannot be missed.
            let notified = waiter.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let still_in_flight = {
                let mut entries = self.entries.lock().expect("cache poisoned");
                matches!(entries.get(key), Some(Entry::InFlight(_)))
            };
            if still_in_flight {
                notified.await;
            }
        }

        // We are the leader. Run the producer outside the map lock.
        let result = producer().await;

        {
            let mut entries = self.entries.lock().expect("cache poisoned");
            entries.pop(key);
            match &result {
                Ok(value) => {
                    entries.put(key.to_string(), Entry::Done(value.clone()));
                }
                Err(_) => {
                    // Failed: leave no entry so the next caller retries.
                }
            }
        }
        leader_notify.notify_waiters();

        result.map(|value| (value, false))
    }

    /// Merge `outputs` into an existing `Many` entry, or install one.
    /// List-shaped actions keyed by name accumulate across requests.
    pub fn append_many(&self, key: &str, outputs: Vec<ProcessedOutput>) {
        let mut entries = self.entries.lock().expect("cache poisoned");
        match entries.get_mut(key) {
            Some(Entry::Done(CachedValue::Many(existing))) => {
                existing.extend(outputs);
            }
            _ => {
                entries.put(key.to_string(), Entry::Done(CachedValue::Many(outputs)));
            }
        }
    }

    /// Completed value for `key`, if any.
    pub fn get(&self, key: &str) -> Option<CachedValue> {
        let mut entries = self.entries.lock().expect("cache poisoned");
        match entries.get(key) {
            Some(Entry::Done(value)) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries
            .lock()
            .expect("cache poisoned")
            .pop(key)
            .is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().expect("cache poisoned").clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The named action caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheName {
    Open,
    Bid,
    Update,
    Transfer,
    Finalize,
    Reveal,
    Finish,
    SendMany,
}

impl CacheName {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "open" => Some(Self::Open),
            "bid" => Some(Self::Bid),
            "update" => Some(Self::Update),
            "transfer" => Some(Self::Transfer),
            "finalize" => Some(Self::Finalize),
            "reveal" => Some(Self::Reveal),
            "finish" => Some(Self::Finish),
            "send_many" => Some(Self::SendMany),
            _ => None,
        }
    }
}

/// All per-action caches for one wallet.
pub struct IdempotencyCache {
    open: ActionCache,
    bid: ActionCache,
    update: ActionCache,
    transfer: ActionCache,
    finalize: ActionCache,
    reveal: ActionCache,
    finish: ActionCache,
    send_many: ActionCache,
}

impl IdempotencyCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            open: ActionCache::new(capacity),
            bid: ActionCache::new(capacity),
            update: ActionCache::new(capacity),
            transfer: ActionCache::new(capacity),
            finalize: ActionCache::new(capacity),
            reveal: ActionCache::new(capacity),
            finish: ActionCache::new(capacity),
            send_many: ActionCache::new(capacity),
        }
    }

    pub fn cache(&self, name: CacheName) -> &ActionCache {
        match name {
            CacheName::Open => &self.open,
            CacheName::Bid => &self.bid,
            CacheName::Update => &self.update,
            CacheName::Transfer => &self.transfer,
            CacheName::Finalize => &self.finalize,
            CacheName::Reveal => &self.reveal,
            CacheName::Finish => &self.finish,
            CacheName::SendMany => &self.send_many,
        }
    }

    /// Drop a whole named cache.
    pub fn clear(&self, name: CacheName) {
        self.cache(name).clear();
    }

    /// Drop a single entry.
    pub fn clear_key(&self, name: CacheName, key: &str) -> bool {
        self.cache(name).remove(key)
    }
}

// ============================================================================
// TESTS
// ============================================================================
