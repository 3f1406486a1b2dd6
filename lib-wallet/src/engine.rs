//! Name Engine
//!
//! The auction state machine. Each method validates that an action is
//! permitted in the current name state and emits an unfunded [`TxBuilder`]
//! with exactly the outputs (and, where the protocol demands, inputs) of
//! that action. The engine never signs and never broadcasts.
//!
//! All legality checks run against `h = chain_height + 1`: the height the
//! transaction would confirm at.

use tracing::debug;

use lib_coins::{CoinIndex, Credit};
use lib_namestate::{AuctionPhase, NameState};
use lib_rules::{
    blind_commitment, blind_nonce, is_locked_up, is_rolled_out, name_hash, nonce_index,
    verify_name, BlindValue, NetworkParams,
};
use lib_types::{
    Address, Amount, BlockHash, BlockHeight, Covenant, CovenantType, NameHash, OutPoint, Output,
};

use crate::blinds::BlindStore;
use crate::builder::TxBuilder;
use crate::errors::WalletError;
use crate::keyring::KeyRing;

/// A bid's secret material, returned alongside the builder so the
/// dispatcher can persist it atomically with the bid's bookkeeping.
#[derive(Debug, Clone)]
pub struct BlindRecord {
    pub blind: [u8; 32],
    pub value: BlindValue,
}

pub struct NameEngine<'a> {
    pub params: &'a NetworkParams,
    pub keyring: &'a dyn KeyRing,
    pub index: &'a CoinIndex,
    pub blinds: &'a BlindStore,
}

impl<'a> NameEngine<'a> {
    // ------------------------------------------------------------------
    // OPEN
    // ------------------------------------------------------------------

    /// Start an auction epoch for `name`.
    pub fn open(
        &self,
        name: &str,
        account: u32,
        h: BlockHeight,
        ns: Option<&NameState>,
    ) -> Result<TxBuilder, WalletError> {
        verify_name(name)?;
        let hash = name_hash(name);

        // A reservation protects the name for its claimant only while the
        // lockup window is open; unclaimed reservations lapse and the name
        // becomes auctionable.
        if is_locked_up(name, h, self.params) {
            return Err(WalletError::Reserved);
        }
        if !is_rolled_out(&hash, h, self.params) {
            return Err(WalletError::NotRolledOut);
        }

        if let Some(ns) = ns {
            // An expired name may be reopened; anything else must still be
            // in its opening window (height 0 or this very block covers an
            // OPEN racing into the same block).
            if !ns.is_expired(h, self.params) {
                let phase = ns.phase(h, self.params);
                if phase != AuctionPhase::Opening || !(ns.height == 0 || ns.height == h) {
                    return Err(WalletError::WrongState {
                        expected: AuctionPhase::Opening,
                        actual: phase,
                    });
                }
            }
        }

        if self.has_pending_open(&hash) {
            return Err(WalletError::AlreadyOpening);
        }

        let address = self.keyring.receive_address(account)?;
        let mut builder = TxBuilder::new(account);
        builder.push_output(Output::new(
            0,
            address,
            Covenant::Open {
                name_hash: hash,
                epoch: 0,
                name: name.as_bytes().to_vec(),
            },
        ));
        debug!(name, height = h, "open builder prepared");
        Ok(builder)
    }

    // ------------------------------------------------------------------
    // BID
    // ------------------------------------------------------------------

    /// Place a blinded bid. `fresh_address` derives a new receive address
    /// (used for every bid after the first in a batch, so two commitments
    /// can never collide).
    pub fn bid(
        &self,
        name: &str,
        account: u32,
        h: BlockHeight,
        ns: &NameState,
        value: Amount,
        lockup: Amount,
        fresh_address: bool,
    ) -> Result<(TxBuilder, BlindRecord), WalletError> {
        verify_name(name)?;
        let hash = name_hash(name);

        let phase = ns.phase(h, self.params);
        if phase != AuctionPhase::Bidding {
            return Err(WalletError::WrongState {
                expected: AuctionPhase::Bidding,
                actual: phase,
            });
        }
        if value > lockup {
            return Err(WalletError::BidExceedsLockup {
                bid: value,
                lockup,
            });
        }

        let address = if fresh_address {
            self.keyring.fresh_receive_address(account)?
        } else {
            self.keyring.receive_address(account)?
        };

        let pubkey = self.keyring.account_pubkey(account, nonce_index(value))?;
        let nonce = blind_nonce(&address, &pubkey, &hash);
        let blind = blind_commitment(value, &nonce);

        let mut builder = TxBuilder::new(account);
        builder.push_output(Output::new(
            lockup,
            address,
            Covenant::Bid {
                name_hash: hash,
                epoch: ns.height,
                name: name.as_bytes().to_vec(),
                blind,
            },
        ));
        debug!(name, value, lockup, "bid builder prepared");
        Ok((
            builder,
            BlindRecord {
                blind,
                value: BlindValue { value, nonce },
            },
        ))
    }

    // ------------------------------------------------------------------
    // REVEAL
    // ------------------------------------------------------------------

    /// Open every one of our bids on `name`. Spends each BID outpoint and
    /// emits a REVEAL of the true bid value, preserving the address.
    pub fn reveal(
        &self,
        name: &str,
        account: u32,
        h: BlockHeight,
        ns: &NameState,
    ) -> Result<TxBuilder, WalletError> {
        verify_name(name)?;
        let hash = name_hash(name);

        let phase = ns.phase(h, self.params);
        if phase != AuctionPhase::Reveal {
            return Err(WalletError::WrongState {
                expected: AuctionPhase::Reveal,
                actual: phase,
            });
        }

        let mut builder = TxBuilder::new(account);
        for credit in self.own_bids(&hash, ns.height) {
            if credit.spent {
                return Err(WalletError::AlreadyPending(credit.outpoint()));
            }
            let Covenant::Bid { blind, .. } = &credit.coin.covenant else {
                continue;
            };
            let record = self
                .blinds
                .get(blind)?
                .ok_or(WalletError::BlindNotFound)?;

            let address = credit.coin.address;
            builder.push_input(credit.coin);
            builder.push_output(Output::new(
                record.value,
                address,
                Covenant::Reveal {
                    name_hash: hash,
                    epoch: ns.height,
                    nonce: record.nonce,
                },
            ));
        }

        if builder.inputs.is_empty() {
            return Err(WalletError::NotOwned);
        }
        debug!(name, reveals = builder.inputs.len(), "reveal builder prepared");
        Ok(builder)
    }

    // ------------------------------------------------------------------
    // REDEEM
    // ------------------------------------------------------------------

    /// Free the locked funds of our losing reveals on `name`.
    pub fn redeem(
        &self,
        name: &str,
        account: u32,
        h: BlockHeight,
        ns: &NameState,
    ) -> Result<TxBuilder, WalletError> {
        verify_name(name)?;
        let hash = name_hash(name);

        let phase = ns.phase(h, self.params);
        if phase != AuctionPhase::Closed {
            return Err(WalletError::WrongState {
                expected: AuctionPhase::Closed,
                actual: phase,
            });
        }

        let mut builder = TxBuilder::new(account);
        for credit in self.own_reveals(&hash, ns.height) {
            // The winning reveal is the owner; it registers, not redeems.
            if Some(credit.outpoint()) == ns.owner {
                continue;
            }
            if credit.spent {
                return Err(WalletError::AlreadyPending(credit.outpoint()));
            }
            let value = credit.coin.value;
            let address = credit.coin.address;
            builder.push_input(credit.coin);
            builder.push_output(Output::new(
                value,
                address,
                Covenant::Redeem {
                    name_hash: hash,
                    epoch: ns.height,
                },
            ));
        }

        if builder.inputs.is_empty() {
            return Err(WalletError::NotOwned);
        }
        debug!(name, redeems = builder.inputs.len(), "redeem builder prepared");
        Ok(builder)
    }

    // ------------------------------------------------------------------
    // REGISTER / UPDATE
    // ------------------------------------------------------------------

    /// Internal: first record after winning. Pays the second price
    /// (`ns.value`) and publishes the resource against a renewal anchor.
    fn register(
        &self,
        name: &str,
        account: u32,
        h: BlockHeight,
        ns: &NameState,
        resource: Vec<u8>,
        renewal_hash: BlockHash,
    ) -> Result<TxBuilder, WalletError> {
        let hash = name_hash(name);
        let owner = self.owner_credit(ns)?;

        let coin_height = owner.coin.height.ok_or(WalletError::NotYetMature)?;
        if coin_height < ns.height {
            // Stale coin from a previous epoch.
            return Err(WalletError::NotOwned);
        }
        match owner.coin.covenant.covenant_type() {
            CovenantType::Reveal => {}
            CovenantType::Claim => {
                if h < coin_height.saturating_add(self.params.coinbase_maturity) {
                    return Err(WalletError::NotYetMature);
                }
            }
            other => return Err(WalletError::BadOwnerCovenant(other)),
        }
        self.check_resource(&resource)?;

        let address = owner.coin.address;
        let mut builder = TxBuilder::new(account);
        builder.push_input(owner.coin);
        builder.push_output(Output::new(
            ns.value,
            address,
            Covenant::Register {
                name_hash: hash,
                epoch: ns.height,
                resource,
                renewal_hash: *renewal_hash.as_bytes(),
            },
        ));
        debug!(name, price = ns.value, "register builder prepared");
        Ok(builder)
    }

    /// Replace the published resource. Falls through to REGISTER while the
    /// owner coin is still a REVEAL (or CLAIM).
    pub fn update(
        &self,
        name: &str,
        account: u32,
        h: BlockHeight,
        ns: &NameState,
        resource: Vec<u8>,
        renewal_hash: BlockHash,
    ) -> Result<TxBuilder, WalletError> {
        verify_name(name)?;
        let hash = name_hash(name);
        self.check_closed(ns, h)?;

        let owner = self.owner_credit(ns)?;
        match owner.coin.covenant.covenant_type() {
            CovenantType::Reveal | CovenantType::Claim => {
                return self.register(name, account, h, ns, resource, renewal_hash);
            }
            t if t.is_ownership() => {}
            other => return Err(WalletError::BadOwnerCovenant(other)),
        }
        self.check_resource(&resource)?;

        let value = owner.coin.value;
        let address = owner.coin.address;
        let mut builder = TxBuilder::new(account);
        builder.push_input(owner.coin);
        builder.push_output(Output::new(
            value,
            address,
            Covenant::Update {
                name_hash: hash,
                epoch: ns.height,
                resource,
            },
        ));
        debug!(name, "update builder prepared");
        Ok(builder)
    }

    // ------------------------------------------------------------------
    // RENEW
    // ------------------------------------------------------------------

    pub fn renew(
        &self,
        name: &str,
        account: u32,
        h: BlockHeight,
        ns: &NameState,
        renewal_hash: BlockHash,
    ) -> Result<TxBuilder, WalletError> {
        verify_name(name)?;
        let hash = name_hash(name);
        self.check_closed(ns, h)?;

        if !ns.can_renew(h, self.params) {
            return Err(WalletError::NotYetMature);
        }

        let owner = self.owner_credit(ns)?;
        let covenant_type = owner.coin.covenant.covenant_type();
        if !covenant_type.is_ownership() {
            return Err(WalletError::BadOwnerCovenant(covenant_type));
        }

        let value = owner.coin.value;
        let address = owner.coin.address;
        let mut builder = TxBuilder::new(account);
        builder.push_input(owner.coin);
        builder.push_output(Output::new(
            value,
            address,
            Covenant::Renew {
                name_hash: hash,
                epoch: ns.height,
                renewal_hash: *renewal_hash.as_bytes(),
            },
        ));
        debug!(name, "renew builder prepared");
        Ok(builder)
    }

    // ------------------------------------------------------------------
    // TRANSFER / CANCEL / FINALIZE
    // ------------------------------------------------------------------

    /// Announce a move to `to`. The coin stays on the current owner
    /// address; the target travels in the covenant until FINALIZE.
    pub fn transfer(
        &self,
        name: &str,
        account: u32,
        h: BlockHeight,
        ns: &NameState,
        to: Address,
    ) -> Result<TxBuilder, WalletError> {
        verify_name(name)?;
        let hash = name_hash(name);
        self.check_closed(ns, h)?;

        let owner = self.owner_credit(ns)?;
        let covenant_type = owner.coin.covenant.covenant_type();
        if covenant_type == CovenantType::Transfer {
            return Err(WalletError::AlreadyTransferring);
        }
        if !covenant_type.is_ownership() {
            return Err(WalletError::BadOwnerCovenant(covenant_type));
        }

        let value = owner.coin.value;
        let address = owner.coin.address;
        let mut builder = TxBuilder::new(account);
        builder.push_input(owner.coin);
        builder.push_output(Output::new(
            value,
            address,
            Covenant::Transfer {
                name_hash: hash,
                epoch: ns.height,
                address_version: to.version,
                address_hash: to.hash,
            },
        ));
        debug!(name, to = %to, "transfer builder prepared");
        Ok(builder)
    }

    /// Revert a pending transfer without finalizing: an UPDATE with an
    /// empty resource.
    pub fn cancel(
        &self,
        name: &str,
        account: u32,
        h: BlockHeight,
        ns: &NameState,
    ) -> Result<TxBuilder, WalletError> {
        verify_name(name)?;
        let hash = name_hash(name);
        self.check_closed(ns, h)?;

        let owner = self.owner_credit(ns)?;
        let covenant_type = owner.coin.covenant.covenant_type();
        if covenant_type != CovenantType::Transfer {
            return Err(WalletError::BadOwnerCovenant(covenant_type));
        }

        let value = owner.coin.value;
        let address = owner.coin.address;
        let mut builder = TxBuilder::new(account);
        builder.push_input(owner.coin);
        builder.push_output(Output::new(
            value,
            address,
            Covenant::Update {
                name_hash: hash,
                epoch: ns.height,
                resource: Vec::new(),
            },
        ));
        debug!(name, "cancel builder prepared");
        Ok(builder)
    }

    /// Complete a transfer once the lockup lapsed. The output address
    /// becomes the transfer target.
    pub fn finalize(
        &self,
        name: &str,
        account: u32,
        h: BlockHeight,
        ns: &NameState,
        renewal_hash: BlockHash,
    ) -> Result<TxBuilder, WalletError> {
        verify_name(name)?;
        let hash = name_hash(name);
        self.check_closed(ns, h)?;

        let owner = self.owner_credit(ns)?;
        let (address_version, address_hash) = match &owner.coin.covenant {
            Covenant::Transfer {
                address_version,
                address_hash,
                ..
            } => (*address_version, *address_hash),
            other => return Err(WalletError::BadOwnerCovenant(other.covenant_type())),
        };

        let coin_height = owner.coin.height.ok_or(WalletError::NotYetMature)?;
        let unlock = coin_height.saturating_add(self.params.transfer_lockup);
        if h < unlock {
            return Err(WalletError::TransferStillLocked {
                remaining: unlock - h,
            });
        }

        let flags = if ns.weak { 1u8 } else { 0u8 };
        let value = owner.coin.value;
        let mut builder = TxBuilder::new(account);
        builder.push_input(owner.coin);
        builder.push_output(Output::new(
            value,
            Address::new(address_version, address_hash),
            Covenant::Finalize {
                name_hash: hash,
                epoch: ns.height,
                name: name.as_bytes().to_vec(),
                flags,
                claimed: ns.claimed,
                renewals: ns.renewals,
                renewal_hash: *renewal_hash.as_bytes(),
            },
        ));
        debug!(name, "finalize builder prepared");
        Ok(builder)
    }

    // ------------------------------------------------------------------
    // REVOKE
    // ------------------------------------------------------------------

    /// Burn the name until the epoch ends. Usable even mid-transfer (it is
    /// the remedy for a key compromise).
    pub fn revoke(
        &self,
        name: &str,
        account: u32,
        h: BlockHeight,
        ns: &NameState,
    ) -> Result<TxBuilder, WalletError> {
        verify_name(name)?;
        let hash = name_hash(name);
        self.check_closed(ns, h)?;

        let owner = self.owner_credit(ns)?;
        let covenant_type = owner.coin.covenant.covenant_type();
        if !covenant_type.is_ownership() && covenant_type != CovenantType::Transfer {
            return Err(WalletError::BadOwnerCovenant(covenant_type));
        }

        let value = owner.coin.value;
        let address = owner.coin.address;
        let mut builder = TxBuilder::new(account);
        builder.push_input(owner.coin);
        builder.push_output(Output::new(
            value,
            address,
            Covenant::Revoke {
                name_hash: hash,
                epoch: ns.height,
            },
        ));
        debug!(name, "revoke builder prepared");
        Ok(builder)
    }

    // ------------------------------------------------------------------
    // Shared checks and index scans
    // ------------------------------------------------------------------

    fn check_closed(&self, ns: &NameState, h: BlockHeight) -> Result<(), WalletError> {
        if ns.is_expired(h, self.params) {
            return Err(WalletError::ExpiredName);
        }
        let phase = ns.phase(h, self.params);
        if phase != AuctionPhase::Closed {
            return Err(WalletError::WrongState {
                expected: AuctionPhase::Closed,
                actual: phase,
            });
        }
        Ok(())
    }

    fn check_resource(&self, resource: &[u8]) -> Result<(), WalletError> {
        if resource.len() > self.params.max_resource_size {
            return Err(WalletError::ResourceTooLarge {
                got: resource.len(),
                max: self.params.max_resource_size,
            });
        }
        Ok(())
    }

    /// The credit holding the name, validated as spendable.
    fn owner_credit(&self, ns: &NameState) -> Result<Credit, WalletError> {
        let owner = ns.owner.ok_or(WalletError::NotOwned)?;
        let credit = self
            .index
            .credit(&owner.tx, owner.index)
            .ok_or(WalletError::NotOwned)?;
        if credit.spent {
            return Err(WalletError::AlreadyPending(owner));
        }
        Ok(credit)
    }

    /// Our unspent BID credits on `name_hash`, confirmed inside the current
    /// epoch (rejecting cross-epoch replays of an earlier auction's bids).
    fn own_bids(&self, hash: &NameHash, epoch: BlockHeight) -> Vec<Credit> {
        self.index
            .credits(None)
            .into_iter()
            .filter(|credit| {
                matches!(
                    &credit.coin.covenant,
                    Covenant::Bid { name_hash, .. } if name_hash == hash
                ) && credit.coin.height.map(|h| h >= epoch).unwrap_or(false)
            })
            .collect()
    }

    /// Our unspent REVEAL credits on `name_hash` for the current epoch.
    fn own_reveals(&self, hash: &NameHash, epoch: BlockHeight) -> Vec<Credit> {
        self.index
            .credits(None)
            .into_iter()
            .filter(|credit| {
                matches!(
                    &credit.coin.covenant,
                    Covenant::Reveal { name_hash, .. } if name_hash == hash
                ) && credit.coin.height.map(|h| h >= epoch).unwrap_or(false)
            })
            .collect()
    }

    /// Double-open check: an unspent OPEN credit (confirmed or pending)
    /// already commits us to this auction.
    fn has_pending_open(&self, hash: &NameHash) -> bool {
        self.index.credits(None).into_iter().any(|credit| {
            !credit.spent
                && matches!(
                    &credit.coin.covenant,
                    Covenant::Open { name_hash, .. } if name_hash == hash
                )
        })
    }

    /// Helper for FINISH batches: whether we hold the winning reveal.
    pub fn owns_winning_reveal(&self, ns: &NameState) -> bool {
        match ns.owner {
            Some(OutPoint { tx, index }) => self.index.has_coin(&tx, index),
            None => false,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
