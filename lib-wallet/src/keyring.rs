//! Key Derivation Collaborator
//!
//! HD derivation lives outside the engine. The keyring hands out addresses
//! and account pubkeys; it never exposes private keys. Derivation is local
//! CPU work, so the trait is synchronous.

use lib_types::Address;

use crate::errors::WalletError;

pub trait KeyRing: Send + Sync {
    /// The account's current receive address (stable until rotated).
    fn receive_address(&self, account: u32) -> Result<Address, WalletError>;

    /// Derive a fresh, never-before-used receive address. Consecutive bids
    /// in one batch use this to avoid blind-commitment collisions.
    fn fresh_receive_address(&self, account: u32) -> Result<Address, WalletError>;

    /// The account's next change address.
    fn change_address(&self, account: u32) -> Result<Address, WalletError>;

    /// Compressed account pubkey at a non-hardened index; feeds blind-nonce
    /// derivation.
    fn account_pubkey(&self, account: u32, index: u32) -> Result<[u8; 33], WalletError>;

    /// Which account an address belongs to, if it is ours.
    fn account_of(&self, address: &Address) -> Option<u32>;
}
