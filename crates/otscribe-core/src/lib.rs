//! otscribe-core — transcript instrumentation for two-party benchmarks.
//!
//! A [`HashingChannel`] wraps any [`Transport`] and folds every byte it
//! moves into a running BLAKE3 state, one per direction. At the end of a
//! run each channel is finalized once and the per-channel digests are
//! reduced to one order-invariant digest per direction.

pub mod channel;
pub mod digest;
pub mod transport;

pub use channel::{ChannelError, HashingChannel};
pub use digest::{
    aggregate, Accumulator, ChannelDigests, Digest, DigestConfig, DigestError, TranscriptDigests,
};
pub use transport::{duplex_pair, IoTransport, TcpTransport, Transport};
