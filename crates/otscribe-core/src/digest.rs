//! Digests and their order-invariant aggregation.
//!
//! Every accumulator is a BLAKE3 hasher read out through its XOF, so the
//! digest length is a run parameter ([`DigestConfig`]) rather than a
//! compiled-in constant.
//!
//! Aggregation sorts the per-channel digests before hashing them:
//!
//!   aggregate = BLAKE3(sort(d_0, .., d_{n-1}) concatenated)
//!
//! Parallel channels finish in no particular order, and both parties must
//! arrive at the same value from the same multiset.

use std::fmt;

use thiserror::Error;

/// Default digest length in bytes.
pub const DEFAULT_DIGEST_LEN: usize = 32;

/// Shortest digest accepted by [`DigestConfig::new`].
pub const MIN_DIGEST_LEN: usize = 16;

/// Longest digest accepted by [`DigestConfig::new`].
pub const MAX_DIGEST_LEN: usize = 64;

// ── Config ────────────────────────────────────────────────────────────────────

/// How long the digests of one run are.
///
/// Both parties must use the same config, or their digests will never
/// match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigestConfig {
    len: usize,
}

impl DigestConfig {
    pub fn new(len: usize) -> Result<Self, DigestError> {
        if !(MIN_DIGEST_LEN..=MAX_DIGEST_LEN).contains(&len) {
            return Err(DigestError::Length(len));
        }
        Ok(Self { len })
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            len: DEFAULT_DIGEST_LEN,
        }
    }
}

// ── Digest ────────────────────────────────────────────────────────────────────

/// A finalized accumulator. Ordered byte-wise.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest(Box<[u8]>);

impl Digest {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

// ── Accumulator ───────────────────────────────────────────────────────────────

/// Incremental BLAKE3 state for bytes that arrive in pieces.
///
/// Finalizing consumes the accumulator.
#[derive(Clone, Default)]
pub struct Accumulator(blake3::Hasher);

impl Accumulator {
    pub fn new() -> Self {
        Self(blake3::Hasher::new())
    }

    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    pub fn finalize(self, config: DigestConfig) -> Digest {
        let mut out = vec![0u8; config.len()];
        self.0.finalize_xof().fill(&mut out);
        Digest(out.into_boxed_slice())
    }
}

/// Reduce one direction's per-channel digests to a single digest.
///
/// The result depends only on the multiset of `parts`.
pub fn aggregate(parts: &[Digest], config: DigestConfig) -> Digest {
    let mut sorted: Vec<&Digest> = parts.iter().collect();
    sorted.sort();

    let mut acc = Accumulator::new();
    for part in sorted {
        acc.update(part.as_bytes());
    }
    acc.finalize(config)
}

// ── Per-channel and per-party digests ─────────────────────────────────────────

/// What one channel yields when it is finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDigests {
    pub send: Digest,
    pub recv: Digest,
}

/// One party's view of the whole transcript: one digest per direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptDigests {
    pub send: Digest,
    pub recv: Digest,
}

impl TranscriptDigests {
    /// Aggregate send digests and receive digests separately.
    pub fn aggregate(parts: &[ChannelDigests], config: DigestConfig) -> Self {
        let sends: Vec<Digest> = parts.iter().map(|p| p.send.clone()).collect();
        let recvs: Vec<Digest> = parts.iter().map(|p| p.recv.clone()).collect();
        Self {
            send: aggregate(&sends, config),
            recv: aggregate(&recvs, config),
        }
    }

    /// What we sent is what the peer received, and the other way round.
    pub fn matches_peer(&self, peer: &TranscriptDigests) -> bool {
        self.send == peer.recv && self.recv == peer.send
    }

    /// `send || recv`, for exchange with the peer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.send.len() + self.recv.len());
        out.extend_from_slice(self.send.as_bytes());
        out.extend_from_slice(self.recv.as_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8], config: DigestConfig) -> Result<Self, DigestError> {
        let len = config.len();
        if bytes.len() != 2 * len {
            return Err(DigestError::Encoding {
                expected: 2 * len,
                actual: bytes.len(),
            });
        }
        let (send, recv) = bytes.split_at(len);
        Ok(Self {
            send: Digest::from_bytes(send),
            recv: Digest::from_bytes(recv),
        })
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum DigestError {
    #[error("digest length {0} outside supported range {MIN_DIGEST_LEN}..={MAX_DIGEST_LEN}")]
    Length(usize),

    #[error("encoded transcript digests: expected {expected} bytes, got {actual}")]
    Encoding { expected: usize, actual: usize },
}

// ── Tests ─────────────────────────────────────────────────────────────────────
