//! Network Parameters
//!
//! Per-network consensus constants driving the auction state machine. These
//! values are protocol; tests run against `regtest()` where the windows are
//! short enough to walk a full auction in a handful of blocks.

use lib_types::BlockHeight;
use serde::{Deserialize, Serialize};

/// Consensus parameters for one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParams {
    /// Block cadence at which name-tree roots are committed.
    pub tree_interval: BlockHeight,
    /// Span of the OPENING phase after an OPEN confirms.
    pub open_period: BlockHeight,
    /// Span of the BIDDING phase.
    pub bidding_period: BlockHeight,
    /// Span of the REVEAL phase.
    pub reveal_period: BlockHeight,
    /// Blocks a name stays registered before it must be renewed.
    pub renewal_window: BlockHeight,
    /// Minimum blocks between TRANSFER and a valid FINALIZE.
    pub transfer_lockup: BlockHeight,
    /// Blocks before a coinbase (or claim) output may be spent.
    pub coinbase_maturity: BlockHeight,
    /// Height at which name auctions begin.
    pub auction_start: BlockHeight,
    /// Blocks per rollout week; names become biddable one week at a time.
    pub rollout_interval: BlockHeight,
    /// Blocks reserved names stay locked for their rightful claimants.
    pub lockup_period: BlockHeight,
    /// Disable the staged rollout (test networks).
    pub no_rollout: bool,
    /// Disable the reserved-name list (test networks).
    pub no_reserved: bool,
    /// Upper bound on an encoded resource record.
    pub max_resource_size: usize,
}

impl NetworkParams {
    /// Main network.
    pub fn main() -> Self {
        Self {
            tree_interval: 36,
            open_period: 37,
            bidding_period: 720,
            reveal_period: 1_440,
            renewal_window: 105_120,
            transfer_lockup: 288,
            coinbase_maturity: 100,
            auction_start: 2_016,
            rollout_interval: 1_008,
            lockup_period: 210_240,
            no_rollout: false,
            no_reserved: false,
            max_resource_size: 512,
        }
    }

    /// Regression-test network: tiny windows, no rollout, no reservations.
    pub fn regtest() -> Self {
        Self {
            tree_interval: 5,
            open_period: 6,
            bidding_period: 10,
            reveal_period: 20,
            renewal_window: 2_500,
            transfer_lockup: 10,
            coinbase_maturity: 2,
            auction_start: 0,
            rollout_interval: 2,
            lockup_period: 50,
            no_rollout: true,
            no_reserved: true,
            max_resource_size: 512,
        }
    }

    /// Height at which the BIDDING phase starts, relative to the epoch open.
    pub fn bidding_start(&self, epoch: BlockHeight) -> BlockHeight {
        epoch.saturating_add(self.open_period)
    }

    /// Height at which the REVEAL phase starts.
    pub fn reveal_start(&self, epoch: BlockHeight) -> BlockHeight {
        self.bidding_start(epoch).saturating_add(self.bidding_period)
    }

    /// Height at which the auction is CLOSED.
    pub fn close_height(&self, epoch: BlockHeight) -> BlockHeight {
        self.reveal_start(epoch).saturating_add(self.reveal_period)
    }
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self::main()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_boundaries_are_ordered() {
        for params in [NetworkParams::main(), NetworkParams::regtest()] {
            let epoch = 1_000;
            assert!(params.bidding_start(epoch) > epoch);
            assert!(params.reveal_start(epoch) > params.bidding_start(epoch));
            assert!(params.close_height(epoch) > params.reveal_start(epoch));
        }
    }

    #[test]
    fn test_regtest_windows_are_short() {
        let params = NetworkParams::regtest();
        assert!(params.close_height(0) < 50);
        assert!(params.no_rollout);
        assert!(params.no_reserved);
    }
}
