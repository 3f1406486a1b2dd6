//! Chain Collaborator
//!
//! The wallet's read/broadcast seam to the node. Every call may suspend;
//! failures surface as [`WalletError::UpstreamUnavailable`] unless the
//! method defines something more specific.

use async_trait::async_trait;
use lib_namestate::NameState;
use lib_types::{Amount, BlockHash, BlockHeight, NameHash, Transaction};

use crate::errors::WalletError;

/// Status summary for one name, as callers see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameStatus {
    pub state: Option<NameState>,
    pub available: bool,
}

#[async_trait]
pub trait ChainView: Send + Sync {
    /// Current chain tip height.
    async fn height(&self) -> Result<BlockHeight, WalletError>;

    /// Auction record for a name, if one exists.
    async fn name_state(&self, name_hash: &NameHash) -> Result<Option<NameState>, WalletError>;

    /// Status summary (state plus availability) for a name.
    async fn name_status(&self, name_hash: &NameHash) -> Result<NameStatus, WalletError>;

    /// Whether the name can currently be opened.
    async fn is_available(&self, name_hash: &NameHash) -> Result<bool, WalletError>;

    /// Renewal anchor: a recent block hash names commit to on
    /// REGISTER/RENEW/FINALIZE.
    async fn renewal_block(&self) -> Result<BlockHash, WalletError>;

    /// Fee rate estimate (per kvB) targeting confirmation within `blocks`.
    async fn estimate_fee(&self, blocks: u32) -> Result<Amount, WalletError>;

    /// Broadcast a signed transaction to the network.
    async fn send(&self, tx: &Transaction) -> Result<(), WalletError>;

    /// Insert a transaction into the local mempool without gossip.
    async fn add_tx(&self, tx: &Transaction) -> Result<(), WalletError>;

    /// Broadcast a reserved-name claim blob.
    async fn send_claim(&self, claim: &[u8]) -> Result<(), WalletError>;
}
