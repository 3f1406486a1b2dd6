//! Signing Collaborator
//!
//! Given a template transaction and the coins its inputs spend, the signer
//! derives the per-input keyrings and inserts witnesses. The wallet never
//! sees key material; a watch-only signer rejects with
//! [`WalletError::CannotSignWatchOnly`].

use async_trait::async_trait;
use lib_coins::Coin;
use lib_types::Transaction;

use crate::errors::WalletError;

#[async_trait]
pub trait Signer: Send + Sync {
    /// Fill every input's witness. `coins[i]` backs `tx.inputs[i]`.
    async fn sign(&self, tx: &mut Transaction, coins: &[Coin]) -> Result<(), WalletError>;

    /// Whether this signer holds private keys at all.
    fn is_watch_only(&self) -> bool {
        false
    }
}
