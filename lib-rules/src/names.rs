//! Name predicates and hashing.
//!
//! The name hash is the protocol identifier: every covenant of an auction
//! epoch repeats it. The readable name appears only where the covenant table
//! demands it (OPEN, BID, FINALIZE).

use lib_types::{BlockHeight, NameHash};
use thiserror::Error;

use crate::params::NetworkParams;
use crate::reserved::RESERVED_NAMES;

/// Longest permitted name label.
pub const MAX_NAME_LEN: usize = 63;

/// Rollout spreads openings across this many weeks.
const ROLLOUT_WEEKS: u32 = 52;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RulesError {
    #[error("Empty name")]
    Empty,

    #[error("Name exceeds {MAX_NAME_LEN} characters: {0}")]
    TooLong(usize),

    #[error("Invalid character {ch:?} at position {pos}")]
    BadCharacter { ch: char, pos: usize },

    #[error("Name may not begin or end with a hyphen")]
    BadHyphen,
}

/// Syntactic validation. Accepts lowercase ASCII labels over
/// `[a-z0-9_-]`, 1..=63 chars, with no leading or trailing hyphen.
/// Uppercase input is rejected rather than folded; callers lowercase at the
/// boundary so the engine only ever sees canonical names.
pub fn verify_name(name: &str) -> Result<(), RulesError> {
    if name.is_empty() {
        return Err(RulesError::Empty);
    }
    if name.len() > MAX_NAME_LEN {
        return Err(RulesError::TooLong(name.len()));
    }
    for (pos, ch) in name.chars().enumerate() {
        match ch {
            'a'..='z' | '0'..='9' | '_' | '-' => {}
            _ => return Err(RulesError::BadCharacter { ch, pos }),
        }
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(RulesError::BadHyphen);
    }
    Ok(())
}

/// Protocol identifier of a readable name.
pub fn name_hash(name: &str) -> NameHash {
    NameHash(blake3::hash(name.as_bytes()).into())
}

/// Whether `name` is on the reserved list (ignoring test-network overrides).
pub fn is_reserved(name: &str, params: &NetworkParams) -> bool {
    if params.no_reserved {
        return false;
    }
    RESERVED_NAMES.binary_search(&name).is_ok()
}

/// Reserved names stay locked for their claimants until the lockup period
/// lapses; opening them before then is rejected.
pub fn is_locked_up(name: &str, height: BlockHeight, params: &NetworkParams) -> bool {
    is_reserved(name, params)
        && height < params.auction_start.saturating_add(params.lockup_period)
}

/// Height at which a name becomes biddable. Names roll out one "week" at a
/// time, staged by hash so the order is deterministic but uncorrelated with
/// the alphabet.
pub fn rollout_height(hash: &NameHash, params: &NetworkParams) -> BlockHeight {
    let bytes = hash.as_bytes();
    let week = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) % ROLLOUT_WEEKS;
    params
        .auction_start
        .saturating_add(week.saturating_mul(params.rollout_interval))
}

/// Whether the name has reached its rollout week at `height`.
pub fn is_rolled_out(hash: &NameHash, height: BlockHeight, params: &NetworkParams) -> bool {
    params.no_rollout || height >= rollout_height(hash, params)
}

// ============================================================================
// TESTS
// ============================================================================
