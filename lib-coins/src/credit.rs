//! Credits
//!
//! A coin is an unspent output as the chain sees it; a credit is a coin plus
//! the wallet's local bookkeeping. A credit is exclusively owned by the
//! wallet that created it.

use lib_types::{Address, Amount, BlockHeight, Covenant, OutPoint};
use serde::{Deserialize, Serialize};

/// An unspent output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub outpoint: OutPoint,
    pub value: Amount,
    pub address: Address,
    pub covenant: Covenant,
    /// Confirmation height; `None` while unconfirmed.
    pub height: Option<BlockHeight>,
    pub coinbase: bool,
}

impl Coin {
    pub fn is_confirmed(&self) -> bool {
        self.height.is_some()
    }

    /// Whether a coinbase/claim output has matured at `height`.
    pub fn is_mature(&self, height: BlockHeight, maturity: BlockHeight) -> bool {
        if !self.coinbase {
            return true;
        }
        match self.height {
            Some(confirmed) => height >= confirmed.saturating_add(maturity),
            None => false,
        }
    }
}

/// A coin plus local metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credit {
    pub coin: Coin,
    /// Committed to a pending transaction not yet confirmed. Never reused
    /// for selection while set.
    pub spent: bool,
    /// Produced by one of our own transactions (relevant to the `smart`
    /// selection policy's unconfirmed handling).
    pub own: bool,
    /// Derivation account the coin's address belongs to, stamped at ingest.
    pub account: u32,
}

impl Credit {
    pub fn new(coin: Coin, account: u32) -> Self {
        Self {
            coin,
            spent: false,
            own: false,
            account,
        }
    }

    pub fn outpoint(&self) -> OutPoint {
        self.coin.outpoint
    }
}
