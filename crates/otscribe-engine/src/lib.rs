//! otscribe-engine — the random correlated OT engine boundary.
//!
//! The benchmark drives an engine through [`RcotEngine`]: set it up over
//! a channel set, ask for bulk random correlations into an engine-owned
//! or a caller-owned buffer, then take the channels back for finalization.
//!
//! Correlations follow the usual RCOT convention. Party 1 holds a global
//! `Δ` with `lsb(Δ) = 1` and blocks `K_i` with `lsb(K_i) = 0`; party 2
//! holds `M_i = K_i ⊕ b_i·Δ`, so its choice bit is `lsb(M_i)`.

use std::fmt;
use std::future::Future;
use std::io;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use otscribe_core::Transport;

pub mod clear;

pub use clear::ClearCot;

/// One correlation: a 128-bit block.
pub type Block = u128;

/// Size of a [`Block`] on the wire.
pub const BLOCK_BYTES: usize = 16;

/// Choice bit carried in the least significant bit.
pub fn lsb(block: Block) -> bool {
    block & 1 == 1
}

// ── Role ──────────────────────────────────────────────────────────────────────

/// Which side of the protocol this process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Party 1: COT sender, listens for connections.
    Alice,
    /// Party 2: COT receiver, connects to party 1.
    Bob,
}

impl Role {
    pub fn party(&self) -> u8 {
        match self {
            Role::Alice => 1,
            Role::Bob => 2,
        }
    }

    pub fn from_party(party: u8) -> Option<Self> {
        match party {
            1 => Some(Role::Alice),
            2 => Some(Role::Bob),
            _ => None,
        }
    }

    pub fn peer(&self) -> Role {
        match self {
            Role::Alice => Role::Bob,
            Role::Bob => Role::Alice,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.party())
    }
}

// ── Variant ───────────────────────────────────────────────────────────────────

/// Protocol variant tag. Both parties must agree on it; it fixes the
/// default per-call batch limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    B11,
    B12,
    B13,
}

impl Variant {
    pub fn tag(&self) -> u8 {
        match self {
            Variant::B11 => 11,
            Variant::B12 => 12,
            Variant::B13 => 13,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            11 => Some(Variant::B11),
            12 => Some(Variant::B12),
            13 => Some(Variant::B13),
            _ => None,
        }
    }

    /// Largest number of correlations one `rcot_inplace` call produces.
    pub fn default_batch_limit(&self) -> usize {
        match self {
            Variant::B11 => 1 << 16,
            Variant::B12 => 1 << 18,
            Variant::B13 => 1 << 20,
        }
    }
}

impl FromStr for Variant {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "b11" => Ok(Variant::B11),
            "b12" => Ok(Variant::B12),
            "b13" => Ok(Variant::B13),
            _ => Err(EngineError::UnknownVariant(s.to_string())),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.tag())
    }
}

// ── Config ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Run the consistency check after every batch.
    pub malicious: bool,
    /// Agree on choice-bit material during setup instead of per batch.
    pub precompute: bool,
    pub variant: Variant,
    /// Overrides the variant's per-call limit. `None` = variant default.
    pub batch_limit: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            malicious: true,
            precompute: true,
            variant: Variant::B13,
            batch_limit: None,
        }
    }
}

impl EngineConfig {
    pub fn batch_limit(&self) -> usize {
        self.batch_limit
            .unwrap_or_else(|| self.variant.default_batch_limit())
    }
}

// ── Engine contract ───────────────────────────────────────────────────────────

/// A two-party random correlated OT engine running over a channel set.
///
/// The engine owns the channels between `setup` and `into_channels`.
/// Every generate call leaves all channels flushed.
pub trait RcotEngine<C: Transport>: Sized + Send {
    /// Bind to the channel set and run the engine's setup traffic.
    fn setup(
        role: Role,
        channels: Vec<C>,
        config: EngineConfig,
    ) -> impl Future<Output = Result<Self, EngineError>> + Send;

    fn role(&self) -> Role;

    /// Per-call limit for [`rcot_inplace`](Self::rcot_inplace).
    fn batch_limit(&self) -> usize;

    /// Party 1's global correlation. `None` on party 2.
    fn delta(&self) -> Option<Block>;

    fn channel_count(&self) -> usize;

    fn channel_mut(&mut self, index: usize) -> Option<&mut C>;

    /// Generate `count` correlations into a buffer the engine allocates.
    fn rcot(&mut self, count: usize)
        -> impl Future<Output = Result<Vec<Block>, EngineError>> + Send;

    /// Fill `out` with correlations. `out.len()` may not exceed
    /// [`batch_limit`](Self::batch_limit).
    fn rcot_inplace(
        &mut self,
        out: &mut [Block],
    ) -> impl Future<Output = Result<(), EngineError>> + Send;

    /// Release the channel set, in its original order.
    fn into_channels(self) -> Vec<C>;
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("transport failure: {0}")]
    Io(#[from] io::Error),

    #[error("engine needs at least one channel")]
    NoChannels,

    #[error("unknown protocol variant {0:?}")]
    UnknownVariant(String),

    #[error("peer disagrees on channel {channel}: {detail}")]
    ConfigMismatch { channel: usize, detail: String },

    #[error("caller buffer holds {len} blocks but the per-call limit is {limit}")]
    BatchTooLarge { len: usize, limit: usize },

    #[error("consistency check failed on channel {0}")]
    ConsistencyCheck(usize),

    #[error("rcot output was dropped while workers were running")]
    OutputClosed,

    #[error("channel worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_map_to_party_numbers() {
        assert_eq!(Role::Alice.party(), 1);
        assert_eq!(Role::Bob.party(), 2);
        assert_eq!(Role::from_party(1), Some(Role::Alice));
        assert_eq!(Role::from_party(2), Some(Role::Bob));
        assert_eq!(Role::from_party(3), None);
        assert_eq!(Role::Alice.peer(), Role::Bob);
        assert_eq!(Role::Bob.to_string(), "2");
    }

    #[test]
    fn variant_parse_and_tag() {
        assert_eq!("b13".parse::<Variant>().unwrap(), Variant::B13);
        assert_eq!("B11".parse::<Variant>().unwrap(), Variant::B11);
        assert!(matches!(
            "b14".parse::<Variant>(),
            Err(EngineError::UnknownVariant(_))
        ));
        for v in [Variant::B11, Variant::B12, Variant::B13] {
            assert_eq!(Variant::from_tag(v.tag()), Some(v));
            assert_eq!(v.to_string().parse::<Variant>().unwrap(), v);
        }
    }

    #[test]
    fn batch_limit_override() {
        let mut config = EngineConfig::default();
        assert_eq!(config.batch_limit(), 1 << 20);
        config.batch_limit = Some(4096);
        assert_eq!(config.batch_limit(), 4096);
    }

    #[test]
    fn lsb_reads_choice_bit() {
        assert!(lsb(0b1011));
        assert!(!lsb(0b1010));
    }
}
