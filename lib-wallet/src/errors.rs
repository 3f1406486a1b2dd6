//! Wallet Errors
//!
//! One taxonomy for the whole engine, grouped by observable behavior:
//! validation errors are the caller's fault and recoverable per-item in
//! batches; state errors mean the auction does not permit the action; coin
//! errors abort the transaction being built; crypto and internal errors
//! abort the call and never leave a cache entry.

use lib_namestate::AuctionPhase;
use lib_types::{Amount, CovenantError, CovenantType, OutPoint};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WalletError {
    // ------------------------------------------------------------------
    // Validation (caller fault)
    // ------------------------------------------------------------------
    #[error("Invalid name: {0}")]
    InvalidName(#[from] lib_rules::RulesError),

    #[error("Resource exceeds {max} bytes: {got}")]
    ResourceTooLarge { got: usize, max: usize },

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Bad type for field: {0}")]
    BadType(&'static str),

    #[error("Bid exceeds lockup: bid={bid}, lockup={lockup}")]
    BidExceedsLockup { bid: Amount, lockup: Amount },

    #[error("Too many names in one batch: {got} > {max}")]
    TooManyNames { got: usize, max: usize },

    #[error("Output budget exceeded: {count} outputs do not fit in budget {budget}")]
    OutputBudget { count: usize, budget: usize },

    // ------------------------------------------------------------------
    // State (auction does not permit this action)
    // ------------------------------------------------------------------
    #[error("Name not found")]
    NameNotFound,

    #[error("Wrong auction phase: expected {expected:?}, found {actual:?}")]
    WrongState {
        expected: AuctionPhase,
        actual: AuctionPhase,
    },

    #[error("Name expired")]
    ExpiredName,

    #[error("Already opening this name")]
    AlreadyOpening,

    #[error("Outpoint already being spent: {0}")]
    AlreadyPending(OutPoint),

    #[error("Name not owned by this wallet")]
    NotOwned,

    #[error("Output not yet mature")]
    NotYetMature,

    #[error("Transfer still locked: {remaining} blocks remaining")]
    TransferStillLocked { remaining: u32 },

    #[error("Name is reserved for its claimant")]
    Reserved,

    #[error("Name has not reached its rollout week")]
    NotRolledOut,

    #[error("A transfer is already pending")]
    AlreadyTransferring,

    #[error("Owner covenant {0} does not permit this action")]
    BadOwnerCovenant(CovenantType),

    // ------------------------------------------------------------------
    // Coins
    // ------------------------------------------------------------------
    #[error("Insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: Amount, need: Amount },

    #[error("Output below dust threshold: {value} < {dust}")]
    DustOutput { value: Amount, dust: Amount },

    #[error("Output pays the null address")]
    NullAddress,

    #[error("Fee exceeds maximum: {fee} > {max}")]
    FeeExceedsMax { fee: Amount, max: Amount },

    #[error("Too many unconfirmed ancestors: {got} > {max}")]
    TooManyAncestors { got: usize, max: usize },

    #[error("Transaction weight exceeded: {weight} > {max}")]
    WeightExceeded { weight: usize, max: usize },

    #[error("Sigop limit exceeded: {sigops} > {max}")]
    SigopsExceeded { sigops: usize, max: usize },

    #[error("Funding would add a second input to a single-input transaction")]
    SingleInputViolated,

    // ------------------------------------------------------------------
    // Crypto
    // ------------------------------------------------------------------
    #[error("Blind commitment not found in blind store")]
    BlindNotFound,

    #[error("Cannot sign with a watch-only wallet")]
    CannotSignWatchOnly,

    #[error("Bad passphrase")]
    BadPassphrase,

    // ------------------------------------------------------------------
    // Transport / abort
    // ------------------------------------------------------------------
    #[error("Request aborted")]
    Aborted,

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    // ------------------------------------------------------------------
    // Internal
    // ------------------------------------------------------------------
    #[error(transparent)]
    Store(#[from] lib_coins::StoreError),

    #[error(transparent)]
    Covenant(#[from] CovenantError),

    #[error("Invariant violated: {0}")]
    Internal(String),
}

impl WalletError {
    /// Whether a batch may recover by dropping the offending name and
    /// continuing with a smaller transaction.
    pub fn is_recoverable_in_batch(&self) -> bool {
        use WalletError::*;
        matches!(
            self,
            InvalidName(_)
                | ResourceTooLarge { .. }
                | MissingField(_)
                | BadType(_)
                | BidExceedsLockup { .. }
                | NameNotFound
                | WrongState { .. }
                | ExpiredName
                | AlreadyOpening
                | AlreadyPending(_)
                | NotOwned
                | NotYetMature
                | TransferStillLocked { .. }
                | Reserved
                | NotRolledOut
                | AlreadyTransferring
                | BadOwnerCovenant(_)
                | BlindNotFound
                | OutputBudget { .. }
        )
    }
}

/// Per-name failure inside a batch response.
#[derive(Debug)]
pub struct NameError {
    pub name: String,
    pub error: WalletError,
}

impl NameError {
    pub fn new(name: impl Into<String>, error: WalletError) -> Self {
        Self {
            name: name.into(),
            error,
        }
    }
}
