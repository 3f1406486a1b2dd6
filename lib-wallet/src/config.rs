//! Wallet Configuration
//!
//! Policy limits and defaults for transaction construction. Consensus
//! windows live in [`lib_rules::NetworkParams`]; everything here is local
//! wallet policy.

use lib_types::Amount;
use serde::{Deserialize, Serialize};

/// Coin selection policy for funding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionPolicy {
    /// Oldest confirmations first.
    #[default]
    Age,
    /// Uniform shuffle.
    Random,
    /// Spend everything spendable.
    All,
    /// Like age, but unconfirmed inputs are admitted only when produced by
    /// our own transactions.
    Smart,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Hard ceiling on the absolute fee of any produced transaction.
    pub max_fee: Amount,
    /// Standardness weight ceiling.
    pub max_tx_weight: usize,
    /// Signature-operation ceiling.
    pub max_tx_sigops: usize,
    /// Longest permitted unconfirmed ancestor chain.
    pub max_ancestors: usize,
    /// Outputs below this value are dust unless covenant-exempt.
    pub dust_threshold: Amount,
    /// Fee rate used when the chain cannot provide an estimate (per kvB).
    pub default_rate: Amount,
    /// Per-transaction output budget for batch packing.
    pub output_budget: usize,
    /// Upper bound on names per batch request.
    pub max_batch_names: usize,
    /// Capacity of each idempotency cache.
    pub cache_capacity: usize,
    /// Default coin selection policy.
    pub selection: SelectionPolicy,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            max_fee: 10_000_000,
            max_tx_weight: 400_000,
            max_tx_sigops: 400,
            max_ancestors: 25,
            dust_threshold: 546,
            default_rate: 1_000,
            output_budget: 200,
            max_batch_names: 200,
            cache_capacity: 1_024,
            selection: SelectionPolicy::Age,
        }
    }
}
