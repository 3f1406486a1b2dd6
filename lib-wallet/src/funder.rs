//! Funder
//!
//! Turns an unfunded [`TxBuilder`] into a signed-ready transaction: selects
//! credits, computes the fee, adds change, and enforces the wallet's policy
//! invariants. Selection never touches a credit that is marked spent,
//! soft-locked, or immature.
//!
//! Fee model: integer arithmetic only, fee = ceil(vsize * rate / 1000),
//! where unsigned inputs are costed at the single-signature witness
//! estimate. A hard fee bypasses estimation entirely.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use tracing::debug;

use lib_coins::{Coin, Credit};
use lib_rules::NetworkParams;
use lib_types::{Amount, BlockHeight, Input, Output, Transaction};

use crate::builder::TxBuilder;
use crate::config::{SelectionPolicy, WalletConfig};
use crate::errors::WalletError;

/// Caller-tunable funding knobs.
#[derive(Debug, Clone, Default)]
pub struct FundOptions {
    /// Fee rate per kvB. `None` falls back to the chain estimate supplied
    /// by the dispatcher (or the config default).
    pub rate: Option<Amount>,
    /// Absolute fee override; skips estimation.
    pub hard_fee: Option<Amount>,
    /// Deduct the fee from this output index instead of adding inputs for
    /// it.
    pub subtract_fee: Option<usize>,
    /// Selection policy override.
    pub policy: Option<SelectionPolicy>,
}

/// A funded, unsigned transaction plus everything the signer and the
/// bookkeeper need.
#[derive(Debug, Clone)]
pub struct FundedTx {
    pub tx: Transaction,
    /// Coin backing each input, in final input order.
    pub coins: Vec<Coin>,
    pub fee: Amount,
    /// Whether a change output was added (it is somewhere in `tx.outputs`
    /// after sorting).
    pub has_change: bool,
}

pub struct Funder<'a> {
    pub config: &'a WalletConfig,
    pub params: &'a NetworkParams,
}

impl<'a> Funder<'a> {
    pub fn new(config: &'a WalletConfig, params: &'a NetworkParams) -> Self {
        Self { config, params }
    }

    /// Fund `builder` from `candidates`.
    ///
    /// `locked` is the soft-locked outpoint set; `rate` is the resolved fee
    /// rate (caller option or chain estimate); `height` is the context
    /// height the transaction is being built for.
    pub fn fund(
        &self,
        builder: TxBuilder,
        candidates: Vec<Credit>,
        locked: &HashSet<lib_types::OutPoint>,
        change_address: lib_types::Address,
        height: BlockHeight,
        rate: Amount,
        options: &FundOptions,
    ) -> Result<FundedTx, WalletError> {
        self.check_outputs(&builder.outputs)?;

        if builder.single_input {
            return self.fund_single_input(builder, height);
        }

        let policy = options.policy.unwrap_or(self.config.selection);
        let pre_in = builder.input_value();
        let out_value = builder.output_value();
        let spendable = self.spendable(candidates, locked, &builder, height, policy);

        let mut selected: Vec<Coin> = Vec::new();
        let mut in_value = pre_in;
        let mut have_iter = spendable.into_iter();

        // `all` spends every spendable credit regardless of target.
        if policy == SelectionPolicy::All {
            for credit in have_iter.by_ref() {
                in_value += credit.coin.value;
                selected.push(credit.coin);
            }
        }

        loop {
            let fee = match options.hard_fee {
                Some(fee) => fee,
                None => {
                    // Cost the transaction as if change were present; a
                    // dust-sized remainder folds into the fee below.
                    let scratch = self.assemble(
                        &builder,
                        &selected,
                        Some(Output::pay(0, change_address)),
                    );
                    rate_fee(scratch.virtual_size(), rate)
                }
            };

            let target = if options.subtract_fee.is_some() {
                out_value
            } else {
                out_value.saturating_add(fee)
            };

            if in_value >= target {
                return self.finish(
                    builder, selected, in_value, fee, change_address, height, options,
                );
            }

            match have_iter.next() {
                Some(credit) => {
                    in_value += credit.coin.value;
                    selected.push(credit.coin);
                }
                None => {
                    return Err(WalletError::InsufficientFunds {
                        have: in_value,
                        need: target,
                    })
                }
            }
        }
    }

    /// Pre-signed REVEAL discipline: exactly the pre-added input, no
    /// funding, no change. The fee is whatever the input leaves over.
    fn fund_single_input(
        &self,
        builder: TxBuilder,
        height: BlockHeight,
    ) -> Result<FundedTx, WalletError> {
        if builder.inputs.len() != 1 {
            return Err(WalletError::SingleInputViolated);
        }
        let in_value = builder.input_value();
        let out_value = builder.output_value();
        if in_value < out_value {
            // Funding the difference would require a second input.
            return Err(WalletError::SingleInputViolated);
        }
        let fee = in_value - out_value;
        self.finish(
            builder,
            Vec::new(),
            in_value,
            fee,
            lib_types::Address::null(),
            height,
            &FundOptions {
                hard_fee: Some(fee),
                ..FundOptions::default()
            },
        )
    }

    /// Filter and order candidates per policy.
    fn spendable(
        &self,
        candidates: Vec<Credit>,
        locked: &HashSet<lib_types::OutPoint>,
        builder: &TxBuilder,
        height: BlockHeight,
        policy: SelectionPolicy,
    ) -> Vec<Credit> {
        let pre_added: HashSet<_> = builder.inputs.iter().map(|c| c.outpoint).collect();
        let mut spendable: Vec<Credit> = candidates
            .into_iter()
            .filter(|credit| {
                let coin = &credit.coin;
                !credit.spent
                    && credit.account == builder.account
                    && coin.covenant.covenant_type() == lib_types::CovenantType::None
                    && !locked.contains(&coin.outpoint)
                    && !pre_added.contains(&coin.outpoint)
                    && coin.is_mature(height, self.params.coinbase_maturity)
                    && match policy {
                        // Unconfirmed credits are spendable only when ours.
                        SelectionPolicy::Smart => coin.is_confirmed() || credit.own,
                        _ => true,
                    }
            })
            .collect();

        match policy {
            SelectionPolicy::Age | SelectionPolicy::Smart | SelectionPolicy::All => {
                // Oldest first; unconfirmed last.
                spendable.sort_by_key(|credit| credit.coin.height.unwrap_or(BlockHeight::MAX));
            }
            SelectionPolicy::Random => {
                spendable.shuffle(&mut rand::thread_rng());
            }
        }
        spendable
    }

    fn check_outputs(&self, outputs: &[Output]) -> Result<(), WalletError> {
        for output in outputs {
            if output.address.is_null() {
                return Err(WalletError::NullAddress);
            }
            if output.value == 0 {
                // Zero-value covenant outputs (OPEN) are protocol-exempt.
                if !output.covenant.is_name() {
                    return Err(WalletError::DustOutput {
                        value: 0,
                        dust: self.config.dust_threshold,
                    });
                }
            } else if output.value < self.config.dust_threshold && !output.covenant.is_name() {
                return Err(WalletError::DustOutput {
                    value: output.value,
                    dust: self.config.dust_threshold,
                });
            }
        }
        Ok(())
    }

    fn assemble(
        &self,
        builder: &TxBuilder,
        selected: &[Coin],
        change: Option<Output>,
    ) -> Transaction {
        let mut tx = Transaction {
            version: 0,
            inputs: Vec::with_capacity(builder.inputs.len() + selected.len()),
            outputs: builder.outputs.clone(),
            locktime: builder.locktime,
        };
        for coin in builder.inputs.iter().chain(selected.iter()) {
            tx.inputs.push(Input::new(coin.outpoint));
        }
        if let Some(change) = change {
            tx.outputs.push(change);
        }
        tx
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        mut builder: TxBuilder,
        selected: Vec<Coin>,
        in_value: Amount,
        mut fee: Amount,
        change_address: lib_types::Address,
        height: BlockHeight,
        options: &FundOptions,
    ) -> Result<FundedTx, WalletError> {
        // Subtract-fee mode adjusts the designated output in place.
        if let Some(index) = options.subtract_fee {
            let output = builder
                .outputs
                .get_mut(index)
                .ok_or(WalletError::MissingField("subtract_fee output"))?;
            if output.value < fee {
                return Err(WalletError::InsufficientFunds {
                    have: output.value,
                    need: fee,
                });
            }
            output.value -= fee;
            if output.value < self.config.dust_threshold && !output.covenant.is_name() {
                return Err(WalletError::DustOutput {
                    value: output.value,
                    dust: self.config.dust_threshold,
                });
            }
        }

        let out_value = builder.output_value();
        let remainder = in_value
            .checked_sub(out_value.saturating_add(fee))
            .ok_or(WalletError::InsufficientFunds {
                have: in_value,
                need: out_value.saturating_add(fee),
            })?;

        // Change below dust folds into the fee.
        let change = if remainder >= self.config.dust_threshold {
            Some(Output::pay(remainder, change_address))
        } else {
            fee += remainder;
            None
        };
        let has_change = change.is_some();

        let mut coins: Vec<Coin> = builder
            .inputs
            .iter()
            .cloned()
            .chain(selected.iter().cloned())
            .collect();
        let mut tx = self.assemble(&builder, &selected, change);

        if builder.sort {
            // Keep the coin list aligned with the sorted inputs.
            tx.sort_members();
            coins.sort_by(|a, b| {
                (a.outpoint.tx.0, a.outpoint.index).cmp(&(b.outpoint.tx.0, b.outpoint.index))
            });
        }

        self.sanity_check(&tx, &coins, fee, height)?;

        debug!(
            txid = %tx.txid(),
            inputs = tx.inputs.len(),
            outputs = tx.outputs.len(),
            fee,
            "transaction funded"
        );

        Ok(FundedTx {
            tx,
            coins,
            fee,
            has_change,
        })
    }

    /// Post-fund invariants plus a context check against the build height.
    fn sanity_check(
        &self,
        tx: &Transaction,
        coins: &[Coin],
        fee: Amount,
        height: BlockHeight,
    ) -> Result<(), WalletError> {
        if fee > self.config.max_fee {
            return Err(WalletError::FeeExceedsMax {
                fee,
                max: self.config.max_fee,
            });
        }
        let weight = tx.weight();
        if weight > self.config.max_tx_weight {
            return Err(WalletError::WeightExceeded {
                weight,
                max: self.config.max_tx_weight,
            });
        }
        let sigops = tx.sigops();
        if sigops > self.config.max_tx_sigops {
            return Err(WalletError::SigopsExceeded {
                sigops,
                max: self.config.max_tx_sigops,
            });
        }
        let unconfirmed = coins.iter().filter(|c| c.height.is_none()).count();
        if unconfirmed > self.config.max_ancestors {
            return Err(WalletError::TooManyAncestors {
                got: unconfirmed,
                max: self.config.max_ancestors,
            });
        }

        // Sanity: inputs disjoint, coins aligned.
        let mut seen = HashSet::new();
        for (input, coin) in tx.inputs.iter().zip(coins.iter()) {
            if input.prevout != coin.outpoint {
                return Err(WalletError::Internal("coin/input misalignment".into()));
            }
            if !seen.insert(input.prevout) {
                return Err(WalletError::Internal(format!(
                    "duplicate input {}",
                    input.prevout
                )));
            }
        }
        if tx.inputs.len() != coins.len() {
            return Err(WalletError::Internal("coin/input count mismatch".into()));
        }

        // Context: the transaction must be valid at the build height.
        if tx.locktime > height {
            return Err(WalletError::Internal(format!(
                "locktime {} beyond build height {}",
                tx.locktime, height
            )));
        }
        for coin in coins {
            if !coin.is_mature(height, self.params.coinbase_maturity) {
                return Err(WalletError::NotYetMature);
            }
        }
        Ok(())
    }
}

/// Integer fee for `vsize` at `rate` per kvB, rounded up.
pub fn rate_fee(vsize: usize, rate: Amount) -> Amount {
    let vsize = vsize as u128;
    let rate = rate as u128;
    ((vsize * rate + 999) / 1000) as Amount
}

// ============================================================================
// TESTS
// ============================================================================
