//! Naming Rules
//!
//! Pure, deterministic predicates and hashing over names. No state, no I/O.
//!
//! # Design Principles
//!
//! 1. **Pure functions** - No side effects, no global state
//! 2. **Deterministic** - Same inputs produce identical outputs everywhere
//! 3. **No floats** - All arithmetic uses integers
//! 4. **Overflow-safe** - Saturating/checked arithmetic on heights

pub mod blind;
pub mod names;
pub mod params;
mod reserved;

pub use blind::{blind_commitment, blind_nonce, nonce_index, BlindValue};
pub use names::{
    is_locked_up, is_reserved, is_rolled_out, name_hash, rollout_height, verify_name, RulesError,
    MAX_NAME_LEN,
};
pub use params::NetworkParams;
