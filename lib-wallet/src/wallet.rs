//! Wallet Dispatcher
//!
//! The caller-facing handle. For each action it: (1) acquires locks,
//! (2) consults the idempotency cache when a key was provided, (3) asks the
//! engine for a builder (or the planner for a packed set), (4) funds,
//! (5) signs, (6) broadcasts, (7) installs the completed record in the
//! cache, (8) releases locks. Partial batch results still broadcast a valid
//! subtransaction and surface per-name errors next to it.
//!
//! Scheduling is single-threaded cooperative within one wallet: every
//! producer path serializes through the fund lock, so two transactions
//! produced by one wallet can never share an input.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use tokio::sync::Mutex;
use tracing::{info, warn};

use lib_coins::{CachedBatch, Coin, CoinIndex, Credit, WalletStore};
use lib_namestate::AuctionPhase;
use lib_rules::{name_hash, NetworkParams};
use lib_types::{
    Address, Amount, BlockHeight, Covenant, CovenantType, OutPoint, Transaction,
};

use crate::abort::AbortSignal;
use crate::batch::{plan_partial, plan_strict, BatchPlan};
use crate::blinds::BlindStore;
use crate::builder::TxBuilder;
use crate::cache::{CacheName, CachedValue, IdempotencyCache, ProcessedOutput};
use crate::chain::{ChainView, NameStatus};
use crate::config::WalletConfig;
use crate::engine::{BlindRecord, NameEngine};
use crate::errors::{NameError, WalletError};
use crate::funder::{FundOptions, FundedTx, Funder};
use crate::keyring::KeyRing;
use crate::locks::{FundGuard, LockManager};
use crate::signer::Signer;

/// Confirmation target used when the caller supplies no fee rate.
const FEE_TARGET_BLOCKS: u32 = 2;

/// How a batch fills the output budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PackPolicy {
    /// Whole names only.
    Strict,
    /// The boundary name contributes a partial share.
    Partial,
}

/// Per-call options shared by every operation.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub account: u32,
    /// Opaque caller-supplied at-most-once key.
    pub idempotency_key: Option<String>,
    pub fund: FundOptions,
    pub abort: Option<AbortSignal>,
}

/// One bid inside a batch request.
#[derive(Debug, Clone)]
pub struct BidRequest {
    pub name: String,
    pub bid: Amount,
    pub lockup: Amount,
}

/// What a completed (or replayed) action resolves to.
#[derive(Debug, Default)]
pub struct ActionResult {
    /// The broadcast transaction. `None` on a pure cache replay.
    pub tx: Option<Transaction>,
    pub outputs: Vec<ProcessedOutput>,
    /// Per-name rejections in batch modes.
    pub errors: Vec<NameError>,
    pub from_cache: bool,
}

/// Spendable/locked balance summary for one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Balance {
    pub confirmed: Amount,
    pub unconfirmed: Amount,
    /// Value held in name covenants (bids, reveals, registered names).
    pub locked_in_names: Amount,
}

/// Caller-facing status of one name, with local annotations.
#[derive(Debug, Clone)]
pub struct NameInfo {
    pub status: NameStatus,
    pub phase: Option<AuctionPhase>,
    pub expired: bool,
}

/// The wallet engine handle. All collaborator dependencies are fields; no
/// request-scoped context objects.
pub struct Wallet<C: ChainView, S: Signer, K: KeyRing> {
    chain: C,
    signer: S,
    keyring: K,
    params: NetworkParams,
    config: WalletConfig,
    store: Arc<dyn WalletStore>,
    blinds: BlindStore,
    index: Mutex<CoinIndex>,
    locks: LockManager,
    caches: IdempotencyCache,
}

impl<C: ChainView, S: Signer, K: KeyRing> Wallet<C, S, K> {
    /// Open the wallet: scan persisted credits into the index.
    pub fn open(
        store: Arc<dyn WalletStore>,
        chain: C,
        signer: S,
        keyring: K,
        params: NetworkParams,
        config: WalletConfig,
    ) -> Result<Self, WalletError> {
        let mut index = CoinIndex::new();
        let count = index.populate(store.as_ref())?;
        info!(credits = count, "wallet opened");
        let cache_capacity = config.cache_capacity;
        Ok(Self {
            chain,
            signer,
            keyring,
            params,
            config,
            blinds: BlindStore::new(store.clone()),
            store,
            index: Mutex::new(index),
            locks: LockManager::new(),
            caches: IdempotencyCache::new(cache_capacity),
        })
    }

    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    // ==================================================================
    // Caller-facing operations: single-name
    // ==================================================================

    /// OPEN: start the auction for `name`.
    pub async fn open_name(
        &self,
        name: &str,
        options: CallOptions,
    ) -> Result<ActionResult, WalletError> {
        let name = name.to_ascii_lowercase();
        let fund = self.locks.fund().await;
        let key = options.idempotency_key.clone();
        self.cached_single(CacheName::Open, key, move || async move {
            let h = self.next_height().await?;
            let ns = self.chain.name_state(&name_hash(&name)).await?;
            let builder = {
                let index = self.index.lock().await;
                self.engine(&index)
                    .open(&name, options.account, h, ns.as_ref())?
            };
            let tx = self.produce(&fund, builder, &options, h, Vec::new()).await?;
            let output = single_output(&tx, &name, CovenantType::Open)?;
            Ok((tx, output))
        })
        .await
    }

    /// BID: place one blinded bid on `name`.
    pub async fn bid(
        &self,
        name: &str,
        bid: Amount,
        lockup: Amount,
        options: CallOptions,
    ) -> Result<ActionResult, WalletError> {
        let name = name.to_ascii_lowercase();
        let fund = self.locks.fund().await;
        let key = options.idempotency_key.clone();
        let result = self
            .cached_many(CacheName::Bid, key.clone(), move || async move {
                let h = self.next_height().await?;
                let ns = self.require_state(&name).await?;
                let (builder, record) = {
                    let index = self.index.lock().await;
                    self.engine(&index)
                        .bid(&name, options.account, h, &ns, bid, lockup, false)?
                };
                let tx = self
                    .produce(&fund, builder, &options, h, vec![record])
                    .await?;
                let output = single_output(&tx, &name, CovenantType::Bid)?;
                Ok((tx, vec![output], Vec::new()))
            })
            .await?;
        self.append_name_outputs(CacheName::Bid, key.as_deref(), &result);
        Ok(result)
    }

    /// REVEAL: open every one of our bids on `name`.
    pub async fn reveal(
        &self,
        name: &str,
        options: CallOptions,
    ) -> Result<ActionResult, WalletError> {
        let name = name.to_ascii_lowercase();
        let fund = self.locks.fund().await;
        let key = options.idempotency_key.clone();
        let result = self
            .cached_many(CacheName::Reveal, key.clone(), move || async move {
                let h = self.next_height().await?;
                let ns = self.require_state(&name).await?;
                let builder = {
                    let index = self.index.lock().await;
                    self.engine(&index).reveal(&name, options.account, h, &ns)?
                };
                let tx = self.produce(&fund, builder, &options, h, Vec::new()).await?;
                let outputs = outputs_of(&tx, &name, CovenantType::Reveal);
                Ok((tx, outputs, Vec::new()))
            })
            .await?;
        self.append_name_outputs(CacheName::Reveal, key.as_deref(), &result);
        Ok(result)
    }

    /// REVEAL_ALL: reveal every owned bid across all names currently in
    /// their reveal period, strict-packed under the output budget.
    pub async fn reveal_all(&self, options: CallOptions) -> Result<ActionResult, WalletError> {
        let fund = self.locks.fund().await;
        let h = self.next_height().await?;

        let names = self.known_names()?;
        let mut domains: Vec<(String, TxBuilder)> = Vec::new();
        let mut errors: Vec<NameError> = Vec::new();
        for name in names {
            match self.reveal_builder(&name, options.account, h).await {
                Ok(builder) => domains.push((name, builder)),
                // Names not in their reveal window are simply skipped.
                Err(WalletError::WrongState { .. }) | Err(WalletError::NotOwned) => {}
                Err(err) => errors.push(NameError::new(name, err)),
            }
        }
        self.produce_packed(&fund, domains, errors, &options, h, CacheName::Reveal)
            .await
    }

    /// REDEEM: free the funds of our losing reveals on `name`.
    pub async fn redeem(
        &self,
        name: &str,
        options: CallOptions,
    ) -> Result<ActionResult, WalletError> {
        let name = name.to_ascii_lowercase();
        let fund = self.locks.fund().await;
        let h = self.next_height().await?;
        let ns = self.require_state(&name).await?;
        let builder = {
            let index = self.index.lock().await;
            self.engine(&index).redeem(&name, options.account, h, &ns)?
        };
        let tx = self.produce(&fund, builder, &options, h, Vec::new()).await?;
        let outputs = outputs_of(&tx, &name, CovenantType::Redeem);
        Ok(ActionResult {
            tx: Some(tx),
            outputs,
            errors: Vec::new(),
            from_cache: false,
        })
    }

    /// REDEEM_ALL: redeem losing reveals across every closed name.
    pub async fn redeem_all(&self, options: CallOptions) -> Result<ActionResult, WalletError> {
        let fund = self.locks.fund().await;
        let h = self.next_height().await?;

        let mut builder = TxBuilder::new(options.account);
        let mut outputs_names: Vec<String> = Vec::new();
        let mut errors: Vec<NameError> = Vec::new();
        for name in self.known_names()? {
            let Some(ns) = self.chain.name_state(&name_hash(&name)).await? else {
                continue;
            };
            let per_name = {
                let index = self.index.lock().await;
                self.engine(&index).redeem(&name, options.account, h, &ns)
            };
            match per_name {
                Ok(b) => {
                    outputs_names.push(name);
                    builder.absorb(b);
                }
                Err(WalletError::WrongState { .. }) | Err(WalletError::NotOwned) => {}
                Err(err) => errors.push(NameError::new(name, err)),
            }
        }
        if builder.outputs.is_empty() {
            return match errors.into_iter().next() {
                Some(first) => Err(first.error),
                None => Err(WalletError::NotOwned),
            };
        }
        let tx = self.produce(&fund, builder, &options, h, Vec::new()).await?;
        let mut outputs = Vec::new();
        for name in outputs_names {
            outputs.extend(outputs_of(&tx, &name, CovenantType::Redeem));
        }
        Ok(ActionResult {
            tx: Some(tx),
            outputs,
            errors,
            from_cache: false,
        })
    }

    /// UPDATE: publish a resource (REGISTERs first if the owner coin is
    /// still the winning reveal).
    pub async fn update(
        &self,
        name: &str,
        resource: Vec<u8>,
        options: CallOptions,
    ) -> Result<ActionResult, WalletError> {
        let name = name.to_ascii_lowercase();
        let fund = self.locks.fund().await;
        let key = options.idempotency_key.clone();
        self.cached_single(CacheName::Update, key, move || async move {
            let h = self.next_height().await?;
            let ns = self.require_state(&name).await?;
            let renewal_hash = self.chain.renewal_block().await?;
            let builder = {
                let index = self.index.lock().await;
                self.engine(&index)
                    .update(&name, options.account, h, &ns, resource, renewal_hash)?
            };
            let tx = self.produce(&fund, builder, &options, h, Vec::new()).await?;
            let output =
                single_output_any(&tx, &name, &[CovenantType::Register, CovenantType::Update])?;
            Ok((tx, output))
        })
        .await
    }

    /// RENEW: extend the renewal window.
    pub async fn renew(
        &self,
        name: &str,
        options: CallOptions,
    ) -> Result<ActionResult, WalletError> {
        let name = name.to_ascii_lowercase();
        let fund = self.locks.fund().await;
        let h = self.next_height().await?;
        let ns = self.require_state(&name).await?;
        let renewal_hash = self.chain.renewal_block().await?;
        let builder = {
            let index = self.index.lock().await;
            self.engine(&index)
                .renew(&name, options.account, h, &ns, renewal_hash)?
        };
        let tx = self.produce(&fund, builder, &options, h, Vec::new()).await?;
        let output = single_output(&tx, &name, CovenantType::Renew)?;
        Ok(ActionResult {
            tx: Some(tx),
            outputs: vec![output],
            errors: Vec::new(),
            from_cache: false,
        })
    }

    /// TRANSFER: announce an ownership move to `to`.
    pub async fn transfer(
        &self,
        name: &str,
        to: Address,
        options: CallOptions,
    ) -> Result<ActionResult, WalletError> {
        let name = name.to_ascii_lowercase();
        let fund = self.locks.fund().await;
        let key = options.idempotency_key.clone();
        self.cached_single(CacheName::Transfer, key, move || async move {
            let h = self.next_height().await?;
            let ns = self.require_state(&name).await?;
            let builder = {
                let index = self.index.lock().await;
                self.engine(&index)
                    .transfer(&name, options.account, h, &ns, to)?
            };
            let tx = self.produce(&fund, builder, &options, h, Vec::new()).await?;
            let output = single_output(&tx, &name, CovenantType::Transfer)?;
            Ok((tx, output))
        })
        .await
    }

    /// CANCEL: revert a pending transfer.
    pub async fn cancel(
        &self,
        name: &str,
        options: CallOptions,
    ) -> Result<ActionResult, WalletError> {
        let name = name.to_ascii_lowercase();
        let fund = self.locks.fund().await;
        let h = self.next_height().await?;
        let ns = self.require_state(&name).await?;
        let builder = {
            let index = self.index.lock().await;
            self.engine(&index).cancel(&name, options.account, h, &ns)?
        };
        let tx = self.produce(&fund, builder, &options, h, Vec::new()).await?;
        let output = single_output(&tx, &name, CovenantType::Update)?;
        Ok(ActionResult {
            tx: Some(tx),
            outputs: vec![output],
            errors: Vec::new(),
            from_cache: false,
        })
    }

    /// FINALIZE: complete a transfer after the lockup.
    pub async fn finalize(
        &self,
        name: &str,
        options: CallOptions,
    ) -> Result<ActionResult, WalletError> {
        let name = name.to_ascii_lowercase();
        let fund = self.locks.fund().await;
        let key = options.idempotency_key.clone();
        self.cached_single(CacheName::Finalize, key, move || async move {
            let h = self.next_height().await?;
            let ns = self.require_state(&name).await?;
            let renewal_hash = self.chain.renewal_block().await?;
            let builder = {
                let index = self.index.lock().await;
                self.engine(&index)
                    .finalize(&name, options.account, h, &ns, renewal_hash)?
            };
            let tx = self.produce(&fund, builder, &options, h, Vec::new()).await?;
            let output = single_output(&tx, &name, CovenantType::Finalize)?;
            Ok((tx, output))
        })
        .await
    }

    /// REVOKE: burn the name until the epoch ends.
    pub async fn revoke(
        &self,
        name: &str,
        options: CallOptions,
    ) -> Result<ActionResult, WalletError> {
        let name = name.to_ascii_lowercase();
        let fund = self.locks.fund().await;
        let h = self.next_height().await?;
        let ns = self.require_state(&name).await?;
        let builder = {
            let index = self.index.lock().await;
            self.engine(&index).revoke(&name, options.account, h, &ns)?
        };
        let tx = self.produce(&fund, builder, &options, h, Vec::new()).await?;
        let output = single_output(&tx, &name, CovenantType::Revoke)?;
        warn!(name = %name, "name revoked");
        Ok(ActionResult {
            tx: Some(tx),
            outputs: vec![output],
            errors: Vec::new(),
            from_cache: false,
        })
    }

    /// FINISH: redeem our losing reveals and register the name if we won,
    /// in one transaction.
    pub async fn finish(
        &self,
        name: &str,
        resource: Vec<u8>,
        options: CallOptions,
    ) -> Result<ActionResult, WalletError> {
        let name = name.to_ascii_lowercase();
        let fund = self.locks.fund().await;
        let key = options.idempotency_key.clone();
        let result = self
            .cached_many(CacheName::Finish, key.clone(), move || async move {
                let h = self.next_height().await?;
                let builder = self
                    .finish_builder(&name, &resource, options.account, h)
                    .await?;
                let tx = self.produce(&fund, builder, &options, h, Vec::new()).await?;
                let mut outputs = outputs_of(&tx, &name, CovenantType::Redeem);
                outputs.extend(outputs_of(&tx, &name, CovenantType::Register));
                Ok((tx, outputs, Vec::new()))
            })
            .await?;
        self.append_name_outputs(CacheName::Finish, key.as_deref(), &result);
        Ok(result)
    }

    /// SEND: one plain payment output.
    pub async fn send(
        &self,
        to: Address,
        value: Amount,
        options: CallOptions,
    ) -> Result<ActionResult, WalletError> {
        self.send_many(vec![(to, value)], options).await
    }

    /// SEND_MANY: plain payments through the same fund/sign/broadcast
    /// pipeline as the name actions.
    pub async fn send_many(
        &self,
        payments: Vec<(Address, Amount)>,
        options: CallOptions,
    ) -> Result<ActionResult, WalletError> {
        if payments.is_empty() {
            return Err(WalletError::MissingField("payments"));
        }
        let fund = self.locks.fund().await;
        let key = options.idempotency_key.clone();
        self.cached_many(CacheName::SendMany, key, move || async move {
            let h = self.next_height().await?;
            let mut builder = TxBuilder::new(options.account);
            for (address, value) in &payments {
                builder.push_output(lib_types::Output::pay(*value, *address));
            }
            let tx = self.produce(&fund, builder, &options, h, Vec::new()).await?;
            let txid = tx.txid();
            let outputs = payments
                .iter()
                .map(|(address, _)| {
                    let vout = tx
                        .outputs
                        .iter()
                        .position(|o| o.address == *address)
                        .unwrap_or_default() as u32;
                    ProcessedOutput {
                        name: String::new(),
                        tx_hash: txid,
                        vout,
                        covenant: CovenantType::None,
                    }
                })
                .collect();
            Ok((tx, outputs, Vec::new()))
        })
        .await
    }

    // ==================================================================
    // Caller-facing operations: batch
    // ==================================================================

    /// Batch OPEN: one OPEN output per name, all in one transaction.
    pub async fn batch_open(
        &self,
        names: &[String],
        options: CallOptions,
    ) -> Result<ActionResult, WalletError> {
        self.check_batch_len(names.len())?;
        let fund = self.locks.fund().await;
        let h = self.next_height().await?;

        let mut builder = TxBuilder::new(options.account);
        let mut opened: Vec<String> = Vec::new();
        let mut errors: Vec<NameError> = Vec::new();
        for raw in names {
            let name = raw.to_ascii_lowercase();
            let ns = self.chain.name_state(&name_hash(&name)).await?;
            let per_name = {
                let index = self.index.lock().await;
                self.engine(&index)
                    .open(&name, options.account, h, ns.as_ref())
            };
            match per_name {
                Ok(b) => {
                    opened.push(name);
                    builder.absorb(b);
                }
                Err(err) if err.is_recoverable_in_batch() => {
                    errors.push(NameError::new(name, err));
                }
                Err(err) => return Err(err),
            }
        }
        if builder.outputs.is_empty() {
            return match errors.into_iter().next() {
                Some(first) => Err(first.error),
                None => Err(WalletError::MissingField("names")),
            };
        }

        let tx = self.produce(&fund, builder, &options, h, Vec::new()).await?;
        let mut outputs = Vec::new();
        for name in opened {
            outputs.extend(outputs_of(&tx, &name, CovenantType::Open));
        }
        Ok(ActionResult {
            tx: Some(tx),
            outputs,
            errors,
            from_cache: false,
        })
    }

    /// Batch BID: many blinded bids in one transaction. The first bid
    /// reuses the account's receive address; every later bid derives a
    /// fresh one so no two commitments can collide.
    pub async fn batch_bid(
        &self,
        bids: &[BidRequest],
        options: CallOptions,
    ) -> Result<ActionResult, WalletError> {
        self.check_batch_len(bids.len())?;
        let fund = self.locks.fund().await;
        let h = self.next_height().await?;

        let mut builder = TxBuilder::new(options.account);
        let mut records: Vec<BlindRecord> = Vec::new();
        let mut placed: Vec<String> = Vec::new();
        let mut errors: Vec<NameError> = Vec::new();
        for (i, request) in bids.iter().enumerate() {
            let name = request.name.to_ascii_lowercase();
            let Some(ns) = self.chain.name_state(&name_hash(&name)).await? else {
                errors.push(NameError::new(name, WalletError::NameNotFound));
                continue;
            };
            let per_name = {
                let index = self.index.lock().await;
                self.engine(&index).bid(
                    &name,
                    options.account,
                    h,
                    &ns,
                    request.bid,
                    request.lockup,
                    i > 0,
                )
            };
            match per_name {
                Ok((b, record)) => {
                    records.push(record);
                    placed.push(name);
                    builder.absorb(b);
                }
                Err(err) if err.is_recoverable_in_batch() => {
                    errors.push(NameError::new(name, err));
                }
                Err(err) => return Err(err),
            }
        }
        if builder.outputs.is_empty() {
            return match errors.into_iter().next() {
                Some(first) => Err(first.error),
                None => Err(WalletError::MissingField("bids")),
            };
        }

        let tx = self.produce(&fund, builder, &options, h, records).await?;
        // A name may carry several bids in one batch; collect its outputs
        // once.
        placed.sort();
        placed.dedup();
        let mut outputs = Vec::new();
        for name in &placed {
            outputs.extend(outputs_of(&tx, name, CovenantType::Bid));
        }
        let result = ActionResult {
            tx: Some(tx),
            outputs,
            errors,
            from_cache: false,
        };
        self.append_name_outputs(CacheName::Bid, options.idempotency_key.as_deref(), &result);
        Ok(result)
    }

    /// Batch REVEAL: strict-packed under the output budget. Revealing only
    /// a fraction of one name's bids would alter the auction, so a name
    /// that does not fit whole is rejected whole.
    pub async fn batch_reveal(
        &self,
        names: &[String],
        options: CallOptions,
    ) -> Result<ActionResult, WalletError> {
        self.check_batch_len(names.len())?;
        let fund = self.locks.fund().await;
        let h = self.next_height().await?;

        let mut domains: Vec<(String, TxBuilder)> = Vec::new();
        let mut errors: Vec<NameError> = Vec::new();
        for raw in names {
            let name = raw.to_ascii_lowercase();
            match self.reveal_builder(&name, options.account, h).await {
                Ok(builder) => domains.push((name, builder)),
                Err(err) if err.is_recoverable_in_batch() => {
                    errors.push(NameError::new(name, err));
                }
                Err(err) => return Err(err),
            }
        }
        self.produce_packed(&fund, domains, errors, &options, h, CacheName::Reveal)
            .await
    }

    /// Batch REDEEM: partial-packed under the output budget. Unlike
    /// reveals, redeeming a fraction of one name's losing reveals changes
    /// nothing about the auction, so a boundary name contributes a partial
    /// share and the remainder is surfaced for the next call.
    pub async fn batch_redeem(
        &self,
        names: &[String],
        options: CallOptions,
    ) -> Result<ActionResult, WalletError> {
        self.check_batch_len(names.len())?;
        let fund = self.locks.fund().await;
        let h = self.next_height().await?;

        let mut domains: Vec<(String, TxBuilder)> = Vec::new();
        let mut errors: Vec<NameError> = Vec::new();
        for raw in names {
            let name = raw.to_ascii_lowercase();
            let per_name = async {
                let ns = self.require_state(&name).await?;
                let index = self.index.lock().await;
                self.engine(&index).redeem(&name, options.account, h, &ns)
            }
            .await;
            match per_name {
                Ok(builder) => domains.push((name, builder)),
                Err(err) if err.is_recoverable_in_batch() => {
                    errors.push(NameError::new(name, err));
                }
                Err(err) => return Err(err),
            }
        }
        self.produce_packed_with(
            &fund,
            domains,
            errors,
            &options,
            h,
            None,
            PackPolicy::Partial,
        )
        .await
    }

    /// Batch FINISH: redeem+register per name, strict-packed.
    pub async fn batch_finish(
        &self,
        names: &[String],
        options: CallOptions,
    ) -> Result<ActionResult, WalletError> {
        self.check_batch_len(names.len())?;
        let fund = self.locks.fund().await;
        let h = self.next_height().await?;

        let mut domains: Vec<(String, TxBuilder)> = Vec::new();
        let mut errors: Vec<NameError> = Vec::new();
        for raw in names {
            let name = raw.to_ascii_lowercase();
            match self.finish_builder(&name, &[], options.account, h).await {
                Ok(builder) => domains.push((name, builder)),
                Err(err) if err.is_recoverable_in_batch() => {
                    errors.push(NameError::new(name, err));
                }
                Err(err) => return Err(err),
            }
        }
        self.produce_packed(&fund, domains, errors, &options, h, CacheName::Finish)
            .await
    }

    // ==================================================================
    // Queries and administration
    // ==================================================================

    /// Status of one name with local phase/expiry annotation. The
    /// annotation is transient; nothing is persisted.
    pub async fn name_info(&self, name: &str) -> Result<NameInfo, WalletError> {
        let name = name.to_ascii_lowercase();
        lib_rules::verify_name(&name)?;
        let status = self.chain.name_status(&name_hash(&name)).await?;
        let h = self.next_height().await?;
        let (phase, expired) = match &status.state {
            Some(ns) => (
                Some(ns.phase(h, &self.params)),
                ns.is_expired(h, &self.params),
            ),
            None => (None, false),
        };
        Ok(NameInfo {
            status,
            phase,
            expired,
        })
    }

    /// Snapshot of the wallet's credits, optionally for one account.
    pub async fn credits(&self, account: Option<u32>) -> Vec<Credit> {
        self.index.lock().await.credits(account)
    }

    /// Balance summary for `account`.
    pub async fn balance(&self, account: u32) -> Balance {
        let index = self.index.lock().await;
        let mut balance = Balance::default();
        for credit in index.credits(Some(account)) {
            if credit.spent {
                continue;
            }
            let coin = &credit.coin;
            if coin.covenant.is_name() {
                balance.locked_in_names += coin.value;
            } else if coin.is_confirmed() {
                balance.confirmed += coin.value;
            } else {
                balance.unconfirmed += coin.value;
            }
        }
        balance
    }

    /// Ingest confirmed transactions: drop credits their inputs spent,
    /// stamp confirmation heights on outputs paying our addresses, and
    /// insert any we had not seen. One atomic batch per call; the index is
    /// only updated after the store write succeeds.
    pub async fn apply_confirmed(
        &self,
        height: BlockHeight,
        txs: &[Transaction],
    ) -> Result<(), WalletError> {
        let (_fund, _write) = self.locks.fund_then_write().await;
        let mut index = self.index.lock().await;
        let mut batch = CachedBatch::new();
        for tx in txs {
            let txid = tx.txid();
            batch.store_mut().del(
                lib_coins::Tree::Txs,
                lib_coins::keys::tx_key(txid.as_bytes()).to_vec(),
            );
            for input in &tx.inputs {
                if let Some(credit) = index.credit(&input.prevout.tx, input.prevout.index) {
                    batch.del_credit(input.prevout, credit.account);
                }
            }
            for (vout, output) in tx.outputs.iter().enumerate() {
                let Some(account) = self.keyring.account_of(&output.address) else {
                    continue;
                };
                Self::record_name(&mut batch, &output.covenant);
                let mut credit = index
                    .credit(&txid, vout as u32)
                    .unwrap_or_else(|| {
                        Credit::new(
                            Coin {
                                outpoint: OutPoint::new(txid, vout as u32),
                                value: output.value,
                                address: output.address,
                                covenant: output.covenant.clone(),
                                height: None,
                                coinbase: false,
                            },
                            account,
                        )
                    });
                credit.coin.height = Some(height);
                batch.put_credit(&credit)?;
            }
        }
        batch.store_mut().put(
            lib_coins::Tree::Meta,
            lib_coins::keys::meta::SYNC_HEIGHT.to_vec(),
            height.to_be_bytes().to_vec(),
        );
        index.commit(self.store.as_ref(), batch)?;
        Ok(())
    }

    /// Height the wallet last ingested a block at, if any.
    pub fn sync_height(&self) -> Result<Option<BlockHeight>, WalletError> {
        let Some(bytes) = self
            .store
            .get(lib_coins::Tree::Meta, lib_coins::keys::meta::SYNC_HEIGHT)?
        else {
            return Ok(None);
        };
        let bytes: [u8; 4] = bytes
            .try_into()
            .map_err(|_| WalletError::Internal("corrupt sync height".into()))?;
        Ok(Some(BlockHeight::from_be_bytes(bytes)))
    }

    /// Relay a reserved-name claim blob to the network. The wallet only
    /// transports it; claim construction is the caller's business.
    pub async fn send_claim(&self, claim: &[u8]) -> Result<(), WalletError> {
        self.chain.send_claim(claim).await
    }

    /// Rebroadcast every pending transaction that has not confirmed yet.
    /// Returns how many went out.
    pub async fn resend(&self) -> Result<usize, WalletError> {
        let pending = self.store.scan(lib_coins::Tree::Txs)?;
        let mut count = 0usize;
        for (_, bytes) in pending {
            let tx: Transaction = bincode::deserialize(&bytes)
                .map_err(|e| WalletError::Internal(format!("corrupt pending tx: {e}")))?;
            self.chain.send(&tx).await?;
            count += 1;
        }
        if count > 0 {
            info!(count, "pending transactions rebroadcast");
        }
        Ok(count)
    }

    /// Soft-lock a coin against selection.
    pub fn lock_coin(&self, outpoint: OutPoint) -> bool {
        self.locks.lock_coin(outpoint)
    }

    pub fn unlock_coin(&self, outpoint: &OutPoint) -> bool {
        self.locks.unlock_coin(outpoint)
    }

    pub fn locked_coins(&self) -> Vec<OutPoint> {
        self.locks.locked_coins().into_iter().collect()
    }

    /// Drop a whole named cache, or one entry of it.
    pub fn clear_cache(&self, cache: &str, key: Option<&str>) -> Result<(), WalletError> {
        let name = CacheName::parse(cache).ok_or(WalletError::BadType("cache"))?;
        match key {
            Some(key) => {
                self.caches.clear_key(name, key);
            }
            None => self.caches.clear(name),
        }
        Ok(())
    }

    // ==================================================================
    // Pipeline internals
    // ==================================================================

    fn engine<'a>(&'a self, index: &'a CoinIndex) -> NameEngine<'a> {
        NameEngine {
            params: &self.params,
            keyring: &self.keyring,
            index,
            blinds: &self.blinds,
        }
    }

    /// The height the transaction under construction would confirm at.
    async fn next_height(&self) -> Result<BlockHeight, WalletError> {
        Ok(self.chain.height().await?.saturating_add(1))
    }

    async fn require_state(&self, name: &str) -> Result<lib_namestate::NameState, WalletError> {
        self.chain
            .name_state(&name_hash(name))
            .await?
            .ok_or(WalletError::NameNotFound)
    }

    fn check_batch_len(&self, len: usize) -> Result<(), WalletError> {
        if len > self.config.max_batch_names {
            return Err(WalletError::TooManyNames {
                got: len,
                max: self.config.max_batch_names,
            });
        }
        Ok(())
    }

    async fn reveal_builder(
        &self,
        name: &str,
        account: u32,
        h: BlockHeight,
    ) -> Result<TxBuilder, WalletError> {
        let ns = self.require_state(name).await?;
        let index = self.index.lock().await;
        self.engine(&index).reveal(name, account, h, &ns)
    }

    async fn finish_builder(
        &self,
        name: &str,
        resource: &[u8],
        account: u32,
        h: BlockHeight,
    ) -> Result<TxBuilder, WalletError> {
        let ns = self.require_state(name).await?;
        let renewal_hash = self.chain.renewal_block().await?;
        let index = self.index.lock().await;
        let engine = self.engine(&index);

        let mut builder = TxBuilder::new(account);
        let mut any = false;
        if engine.owns_winning_reveal(&ns) {
            builder.absorb(engine.update(name, account, h, &ns, resource.to_vec(), renewal_hash)?);
            any = true;
        }
        match engine.redeem(name, account, h, &ns) {
            Ok(b) => {
                builder.absorb(b);
                any = true;
            }
            Err(WalletError::NotOwned) => {}
            Err(err) => return Err(err),
        }
        if !any {
            return Err(WalletError::NotOwned);
        }
        Ok(builder)
    }

    /// Every name this wallet has touched, from the persistent name map.
    /// Name-bearing covenants (OPEN, BID, CLAIM, FINALIZE) feed the map at
    /// bookkeeping time, so the readable name survives after the covenant
    /// coins themselves are spent and pruned.
    fn known_names(&self) -> Result<Vec<String>, WalletError> {
        let mut names = Vec::new();
        for (_, value) in self.store.scan(lib_coins::Tree::Names)? {
            if let Ok(name) = String::from_utf8(value) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Record a covenant's readable name in the name map.
    fn record_name(batch: &mut CachedBatch, covenant: &Covenant) {
        let (hash, name) = match covenant {
            Covenant::Open {
                name_hash, name, ..
            }
            | Covenant::Bid {
                name_hash, name, ..
            }
            | Covenant::Claim {
                name_hash, name, ..
            }
            | Covenant::Finalize {
                name_hash, name, ..
            } => (name_hash, name),
            _ => return,
        };
        batch.store_mut().put(
            lib_coins::Tree::Names,
            lib_coins::keys::name_key(hash.as_bytes()).to_vec(),
            name.clone(),
        );
    }

    /// Strict-pack per-name builders under the output budget, then fund,
    /// sign and broadcast the surviving set as one transaction.
    async fn produce_packed(
        &self,
        fund: &FundGuard<'_>,
        domains: Vec<(String, TxBuilder)>,
        errors: Vec<NameError>,
        options: &CallOptions,
        h: BlockHeight,
        cache: CacheName,
    ) -> Result<ActionResult, WalletError> {
        self.produce_packed_with(
            fund,
            domains,
            errors,
            options,
            h,
            Some(cache),
            PackPolicy::Strict,
        )
        .await
    }

    /// Pack per-name builders under the output budget with the given
    /// policy, then fund, sign and broadcast the surviving set as one
    /// transaction.
    ///
    /// Partial packing truncates the boundary name's builder to its share;
    /// it is only sound for actions whose inputs and outputs pair up
    /// one-to-one (redeems).
    #[allow(clippy::too_many_arguments)]
    async fn produce_packed_with(
        &self,
        fund: &FundGuard<'_>,
        domains: Vec<(String, TxBuilder)>,
        mut errors: Vec<NameError>,
        options: &CallOptions,
        h: BlockHeight,
        cache: Option<CacheName>,
        policy: PackPolicy,
    ) -> Result<ActionResult, WalletError> {
        let budget = self.config.output_budget;
        let counted: Vec<(String, Vec<usize>)> = domains
            .iter()
            .map(|(name, builder)| (name.clone(), (0..builder.outputs.len()).collect()))
            .collect();
        let plan: BatchPlan<usize> = match policy {
            PackPolicy::Strict => plan_strict(counted, budget),
            PackPolicy::Partial => plan_partial(counted, budget),
        };

        for rejected in &plan.rejected {
            errors.push(NameError::new(
                rejected.name.clone(),
                WalletError::OutputBudget {
                    count: rejected.leftover,
                    budget,
                },
            ));
        }

        let mut included_names: Vec<String> = Vec::new();
        let mut master = TxBuilder::new(options.account);
        let mut builders: HashMap<String, TxBuilder> = domains.into_iter().collect();
        for (name, share) in &plan.included {
            if let Some(mut builder) = builders.remove(name) {
                if share.len() < builder.outputs.len() {
                    // Partial share: keep the first k input/output pairs.
                    builder.outputs.truncate(share.len());
                    builder.inputs.truncate(share.len());
                }
                included_names.push(name.clone());
                master.absorb(builder);
            }
        }

        if master.outputs.is_empty() {
            return match errors.into_iter().next() {
                Some(first) => Err(first.error),
                None => Err(WalletError::NotOwned),
            };
        }

        let tx = self.produce(fund, master, options, h, Vec::new()).await?;
        let mut outputs = Vec::new();
        for name in &included_names {
            let hash = name_hash(name);
            let txid = tx.txid();
            for (vout, output) in tx.outputs.iter().enumerate() {
                if output.covenant.name_hash() == Some(hash) {
                    outputs.push(ProcessedOutput {
                        name: name.clone(),
                        tx_hash: txid,
                        vout: vout as u32,
                        covenant: output.covenant.covenant_type(),
                    });
                }
            }
        }

        let result = ActionResult {
            tx: Some(tx),
            outputs,
            errors,
            from_cache: false,
        };
        if let Some(cache) = cache {
            self.append_name_outputs(cache, options.idempotency_key.as_deref(), &result);
        }
        Ok(result)
    }

    /// Fund, sign, broadcast, and record one transaction. Holds the fund
    /// lock for the whole path; takes the write lock for bookkeeping only.
    async fn produce(
        &self,
        fund: &FundGuard<'_>,
        builder: TxBuilder,
        options: &CallOptions,
        h: BlockHeight,
        blind_records: Vec<BlindRecord>,
    ) -> Result<Transaction, WalletError> {
        // Pre-added inputs picked up by another in-flight producer are a
        // conflict, not a selection candidate.
        for coin in &builder.inputs {
            if self.locks.is_coin_locked(&coin.outpoint) {
                return Err(WalletError::AlreadyPending(coin.outpoint));
            }
        }

        let account = builder.account;
        let candidates = self.index.lock().await.credits(Some(account));
        let locked = self.locks.locked_coins();
        let rate = self.resolve_rate(options).await;
        let change = self.keyring.change_address(account)?;

        let funder = Funder::new(&self.config, &self.params);
        let funded = funder.fund(builder, candidates, &locked, change, h, rate, &options.fund)?;

        // Soft-lock every input for the remainder of the producer, so an
        // overlapping call cannot select them before the spent flags land.
        for coin in &funded.coins {
            self.locks.lock_coin(coin.outpoint);
        }
        let outpoints: Vec<OutPoint> = funded.coins.iter().map(|c| c.outpoint).collect();

        let result = self
            .sign_broadcast_record(fund, funded, options, blind_records)
            .await;

        for outpoint in &outpoints {
            self.locks.unlock_coin(outpoint);
        }
        result
    }

    async fn sign_broadcast_record(
        &self,
        fund: &FundGuard<'_>,
        mut funded: FundedTx,
        options: &CallOptions,
        blind_records: Vec<BlindRecord>,
    ) -> Result<Transaction, WalletError> {
        if self.signer.is_watch_only() {
            return Err(WalletError::CannotSignWatchOnly);
        }
        self.signer.sign(&mut funded.tx, &funded.coins).await?;

        // Abort is checked once, immediately before broadcast: an aborted
        // call mutates neither the chain nor the cache.
        if let Some(abort) = &options.abort {
            if abort.is_aborted() {
                return Err(WalletError::Aborted);
            }
        }

        self.chain.send(&funded.tx).await?;
        info!(
            txid = %funded.tx.txid(),
            fee = funded.fee,
            inputs = funded.tx.inputs.len(),
            outputs = funded.tx.outputs.len(),
            "transaction broadcast"
        );

        // Bookkeeping: mark inputs spent, ingest our own outputs as
        // unconfirmed credits, persist blind records, all in one atomic batch
        // applied to memory only after the store write succeeds.
        let _write = self.locks.write_within(fund).await;
        let mut index = self.index.lock().await;
        let mut batch = CachedBatch::new();
        for coin in &funded.coins {
            if let Some(mut credit) = index.credit(&coin.outpoint.tx, coin.outpoint.index) {
                credit.spent = true;
                batch.put_credit(&credit)?;
            }
        }
        let txid = funded.tx.txid();
        for (vout, output) in funded.tx.outputs.iter().enumerate() {
            Self::record_name(&mut batch, &output.covenant);
            if let Some(account) = self.keyring.account_of(&output.address) {
                let mut credit = Credit::new(
                    Coin {
                        outpoint: OutPoint::new(txid, vout as u32),
                        value: output.value,
                        address: output.address,
                        covenant: output.covenant.clone(),
                        height: None,
                        coinbase: false,
                    },
                    account,
                );
                credit.own = true;
                batch.put_credit(&credit)?;
            }
        }
        for record in &blind_records {
            BlindStore::put(&mut batch, &record.blind, &record.value);
        }
        // Keep the signed transaction around for rebroadcast until it
        // confirms.
        let tx_bytes = bincode::serialize(&funded.tx)
            .map_err(|e| WalletError::Internal(format!("pending tx serialize: {e}")))?;
        batch.store_mut().put(
            lib_coins::Tree::Txs,
            lib_coins::keys::tx_key(txid.as_bytes()).to_vec(),
            tx_bytes,
        );
        index.commit(self.store.as_ref(), batch)?;

        Ok(funded.tx)
    }

    async fn resolve_rate(&self, options: &CallOptions) -> Amount {
        if let Some(rate) = options.fund.rate {
            return rate;
        }
        if options.fund.hard_fee.is_some() {
            // Estimation is pointless under a hard fee.
            return self.config.default_rate;
        }
        match self.chain.estimate_fee(FEE_TARGET_BLOCKS).await {
            Ok(rate) if rate > 0 => rate,
            _ => self.config.default_rate,
        }
    }

    /// Install per-name entries in a list-shaped cache after a successful
    /// batch, skipping a key the with-cache path already installed.
    fn append_name_outputs(&self, cache: CacheName, key: Option<&str>, result: &ActionResult) {
        if result.from_cache {
            return;
        }
        let mut grouped: HashMap<&str, Vec<ProcessedOutput>> = HashMap::new();
        for output in &result.outputs {
            if output.name.is_empty() {
                continue;
            }
            grouped.entry(&output.name).or_default().push(output.clone());
        }
        for (name, outputs) in grouped {
            if key == Some(name) {
                continue;
            }
            self.caches.cache(cache).append_many(name, outputs);
        }
    }

    // ------------------------------------------------------------------
    // Cache adapters
    // ------------------------------------------------------------------

    async fn cached_single<F, Fut>(
        &self,
        cache: CacheName,
        key: Option<String>,
        producer: F,
    ) -> Result<ActionResult, WalletError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(Transaction, ProcessedOutput), WalletError>>,
    {
        let Some(key) = key else {
            let (tx, output) = producer().await?;
            return Ok(ActionResult {
                tx: Some(tx),
                outputs: vec![output],
                errors: Vec::new(),
                from_cache: false,
            });
        };

        let tx_slot: StdMutex<Option<Transaction>> = StdMutex::new(None);
        let slot_ref = &tx_slot;
        let (value, from_cache) = self
            .caches
            .cache(cache)
            .with_cache(&key, move || async move {
                let (tx, output) = producer().await?;
                *slot_ref.lock().expect("slot poisoned") = Some(tx);
                Ok(CachedValue::Single(output))
            })
            .await?;
        let outputs = match value {
            CachedValue::Single(output) => vec![output],
            CachedValue::Many(outputs) => outputs,
        };
        Ok(ActionResult {
            tx: tx_slot.into_inner().expect("slot poisoned"),
            outputs,
            errors: Vec::new(),
            from_cache,
        })
    }

    async fn cached_many<F, Fut>(
        &self,
        cache: CacheName,
        key: Option<String>,
        producer: F,
    ) -> Result<ActionResult, WalletError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<
            Output = Result<(Transaction, Vec<ProcessedOutput>, Vec<NameError>), WalletError>,
        >,
    {
        let Some(key) = key else {
            let (tx, outputs, errors) = producer().await?;
            return Ok(ActionResult {
                tx: Some(tx),
                outputs,
                errors,
                from_cache: false,
            });
        };

        let slot: StdMutex<(Option<Transaction>, Vec<NameError>)> =
            StdMutex::new((None, Vec::new()));
        let slot_ref = &slot;
        let (value, from_cache) = self
            .caches
            .cache(cache)
            .with_cache(&key, move || async move {
                let (tx, outputs, errors) = producer().await?;
                let mut slot = slot_ref.lock().expect("slot poisoned");
                slot.0 = Some(tx);
                slot.1 = errors;
                Ok(CachedValue::Many(outputs))
            })
            .await?;
        let outputs = match value {
            CachedValue::Single(output) => vec![output],
            CachedValue::Many(outputs) => outputs,
        };
        let (tx, errors) = slot.into_inner().expect("slot poisoned");
        Ok(ActionResult {
            tx,
            outputs,
            errors,
            from_cache,
        })
    }
}

// ============================================================================
// Output extraction helpers
// ============================================================================

fn outputs_of(tx: &Transaction, name: &str, covenant: CovenantType) -> Vec<ProcessedOutput> {
    let hash = name_hash(name);
    let txid = tx.txid();
    tx.outputs
        .iter()
        .enumerate()
        .filter(|(_, output)| {
            output.covenant.covenant_type() == covenant
                && output.covenant.name_hash() == Some(hash)
        })
        .map(|(vout, output)| ProcessedOutput {
            name: name.to_string(),
            tx_hash: txid,
            vout: vout as u32,
            covenant: output.covenant.covenant_type(),
        })
        .collect()
}

fn single_output(
    tx: &Transaction,
    name: &str,
    covenant: CovenantType,
) -> Result<ProcessedOutput, WalletError> {
    outputs_of(tx, name, covenant)
        .into_iter()
        .next()
        .ok_or_else(|| WalletError::Internal(format!("{covenant} output missing from built tx")))
}

fn single_output_any(
    tx: &Transaction,
    name: &str,
    covenants: &[CovenantType],
) -> Result<ProcessedOutput, WalletError> {
    for covenant in covenants {
        if let Some(output) = outputs_of(tx, name, *covenant).into_iter().next() {
            return Ok(output);
        }
    }
    Err(WalletError::Internal(
        "expected covenant output missing from built tx".into(),
    ))
}
