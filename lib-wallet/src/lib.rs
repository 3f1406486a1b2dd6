//! Wallet Transaction Engine
//!
//! Drives a name through its auction lifecycle (open → bid → reveal →
//! redeem/register → update → renew → transfer → finalize / revoke) and
//! constructs the transactions that implement each transition.
//!
//! The engine owns per-name auction validation, the coin inventory, blind
//! commitment storage, batch construction under a fixed output budget,
//! fund/write serialization, and an at-most-once idempotency cache. The
//! HTTP surface, chain consensus, HD derivation, and signing are external
//! collaborators behind the traits in [`chain`], [`signer`], and
//! [`keyring`].

pub mod abort;
pub mod batch;
pub mod blinds;
pub mod builder;
pub mod cache;
pub mod chain;
pub mod config;
pub mod engine;
pub mod errors;
pub mod funder;
pub mod keyring;
pub mod locks;
pub mod signer;
pub mod wallet;

pub use abort::AbortSignal;
pub use batch::{plan_partial, plan_strict, BatchPlan, RejectedName};
pub use blinds::BlindStore;
pub use builder::TxBuilder;
pub use cache::{ActionCache, CacheName, CachedValue, IdempotencyCache, ProcessedOutput};
pub use chain::{ChainView, NameStatus};
pub use config::{SelectionPolicy, WalletConfig};
pub use engine::{BlindRecord, NameEngine};
pub use errors::{NameError, WalletError};
pub use funder::{rate_fee, FundOptions, FundedTx, Funder};
pub use keyring::KeyRing;
pub use locks::LockManager;
pub use signer::Signer;
pub use wallet::{ActionResult, Balance, BidRequest, CallOptions, NameInfo, Wallet};
