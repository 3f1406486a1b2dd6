//! Name State
//!
//! The per-name auction record as read from the chain. The wallet treats it
//! as shared read-only data; the only local annotation is expiry
//! recomputation, which is transient and never persisted.
//!
//! A name is in exactly one phase at a given height. Phase is derived, never
//! stored: it falls out of the epoch height and the network's window
//! parameters.

use lib_rules::NetworkParams;
use lib_types::{Amount, BlockHeight, NameHash, OutPoint};
use serde::{Deserialize, Serialize};

/// Lifecycle phase of a name at a specific height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuctionPhase {
    /// OPEN confirmed, bidding not yet allowed.
    Opening,
    /// Blind bids accepted.
    Bidding,
    /// Bids must be opened.
    Reveal,
    /// Auction settled; the name has (or awaits) an owner.
    Closed,
    /// Burned until the epoch ends.
    Revoked,
}

/// Per-name auction record.
///
/// `height` is the epoch tag: the block height of the OPEN that started the
/// current auction. Every covenant of the epoch repeats it, which is what
/// defeats cross-epoch replay of bids and reveals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameState {
    pub name_hash: NameHash,
    /// Block height that opened the current auction epoch.
    pub height: BlockHeight,
    /// Height of the last renewal event (starts at the epoch open).
    pub renewal: BlockHeight,
    /// Outpoint currently holding the name. Set only once closed.
    pub owner: Option<OutPoint>,
    /// Second-highest reveal: the price the winner pays at REGISTER.
    pub value: Amount,
    /// Highest reveal.
    pub highest: Amount,
    /// Published resource bytes, if registered.
    pub data: Vec<u8>,
    /// Height at which a TRANSFER was recorded, if one is pending.
    pub transfer: Option<BlockHeight>,
    /// Height at which the name was revoked, if it was.
    pub revoked: Option<BlockHeight>,
    /// Number of times the name was claimed (reserved names).
    pub claimed: u32,
    /// Number of renewals in this epoch.
    pub renewals: u32,
    /// Claimed without a full DNSSEC chain.
    pub weak: bool,
}

impl NameState {
    /// Fresh record for an epoch opening at `height`.
    pub fn open(name_hash: NameHash, height: BlockHeight) -> Self {
        Self {
            name_hash,
            height,
            renewal: height,
            owner: None,
            value: 0,
            highest: 0,
            data: Vec::new(),
            transfer: None,
            revoked: None,
            claimed: 0,
            renewals: 0,
            weak: false,
        }
    }

    /// Phase of this name at `height`.
    pub fn phase(&self, height: BlockHeight, params: &NetworkParams) -> AuctionPhase {
        if self.revoked.is_some() {
            return AuctionPhase::Revoked;
        }
        if height < params.bidding_start(self.height) {
            AuctionPhase::Opening
        } else if height < params.reveal_start(self.height) {
            AuctionPhase::Bidding
        } else if height < params.close_height(self.height) {
            AuctionPhase::Reveal
        } else {
            AuctionPhase::Closed
        }
    }

    /// Whether the registration lapsed: closed and past the renewal window.
    pub fn is_expired(&self, height: BlockHeight, params: &NetworkParams) -> bool {
        self.phase(height, params) == AuctionPhase::Closed
            && height >= self.renewal.saturating_add(params.renewal_window)
    }

    /// Whether a RENEW is accepted at `height`: at least one tree interval
    /// past the previous renewal event.
    pub fn can_renew(&self, height: BlockHeight, params: &NetworkParams) -> bool {
        height >= self.renewal.saturating_add(params.tree_interval)
    }

    /// Whether a TRANSFER is pending.
    pub fn is_transferring(&self) -> bool {
        self.transfer.is_some()
    }
}

// ============================================================================
// TESTS
// ============================================================================
