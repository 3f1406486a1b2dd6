//! Abort Signal
//!
//! Caller-supplied cancellation. The signal is checked once, immediately
//! before broadcast: an aborted call neither mutates the chain nor installs
//! a cache entry. In-flight coin selection is not preempted (it is
//! bounded-time).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
