//! HashingChannel — a transport decorator that hashes and counts traffic.
//!
//! Every byte written through the channel is forwarded to the wrapped
//! transport and then absorbed into the send accumulator; every byte read
//! is absorbed into the receive accumulator after it has landed in the
//! caller's buffer. The raw bytes are never retained.
//!
//! Finalization is a one-way state transition: the accumulators are
//! consumed, and any later send, receive or finalize on the channel fails.

use std::io;

use thiserror::Error;

use crate::digest::{Accumulator, ChannelDigests, DigestConfig};
use crate::transport::Transport;

enum HashState {
    Live(Box<Accumulators>),
    Finalized,
}

struct Accumulators {
    send: Accumulator,
    recv: Accumulator,
}

/// A [`Transport`] that keeps a running digest of both directions.
///
/// # Example
/// ```
/// # tokio_test_block_on(async {
/// use otscribe_core::{duplex_pair, DigestConfig, HashingChannel, Transport};
///
/// let (a, b) = duplex_pair(1024);
/// let mut alice = HashingChannel::new(a, DigestConfig::default());
/// let mut bob = HashingChannel::new(b, DigestConfig::default());
///
/// alice.send(b"hello").await.unwrap();
/// alice.flush().await.unwrap();
/// let mut buf = [0u8; 5];
/// bob.receive(&mut buf).await.unwrap();
///
/// let a = alice.finalize().unwrap();
/// let b = bob.finalize().unwrap();
/// assert_eq!(a.send, b.recv);
/// assert!(alice.finalize().is_err());
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
/// # }
/// ```
pub struct HashingChannel<T> {
    inner: T,
    state: HashState,
    config: DigestConfig,
    bytes_sent: u64,
    bytes_received: u64,
}

impl<T: Transport> HashingChannel<T> {
    pub fn new(inner: T, config: DigestConfig) -> Self {
        Self {
            inner,
            state: HashState::Live(Box::new(Accumulators {
                send: Accumulator::new(),
                recv: Accumulator::new(),
            })),
            config,
            bytes_sent: 0,
            bytes_received: 0,
        }
    }

    /// Total bytes sent through this channel so far.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Total bytes received through this channel so far.
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self.state, HashState::Finalized)
    }

    /// The wrapped transport. Traffic sent this way bypasses the digests
    /// and the byte counters.
    pub fn raw_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume both accumulators and return their digests.
    ///
    /// Bytes still sitting in a local write buffer have already been
    /// counted and hashed, but may not have reached the peer: flush every
    /// channel of the run before finalizing any of them.
    pub fn finalize(&mut self) -> Result<ChannelDigests, ChannelError> {
        match std::mem::replace(&mut self.state, HashState::Finalized) {
            HashState::Live(acc) => {
                let Accumulators { send, recv } = *acc;
                let digests = ChannelDigests {
                    send: send.finalize(self.config),
                    recv: recv.finalize(self.config),
                };
                tracing::trace!(
                    bytes_sent = self.bytes_sent,
                    bytes_received = self.bytes_received,
                    send_digest = %digests.send,
                    recv_digest = %digests.recv,
                    "channel finalized"
                );
                Ok(digests)
            }
            HashState::Finalized => Err(ChannelError::AlreadyFinalized),
        }
    }
}

impl<T: Transport> Transport for HashingChannel<T> {
    async fn send(&mut self, data: &[u8]) -> io::Result<()> {
        let HashState::Live(acc) = &mut self.state else {
            return Err(ChannelError::AlreadyFinalized.into());
        };
        self.inner.send(data).await?;
        acc.send.update(data);
        self.bytes_sent += data.len() as u64;
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let HashState::Live(acc) = &mut self.state else {
            return Err(ChannelError::AlreadyFinalized.into());
        };
        self.inner.receive(buf).await?;
        acc.recv.update(buf);
        self.bytes_received += buf.len() as u64;
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.inner.flush().await
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel already finalized; its accumulators were consumed")]
    AlreadyFinalized,
}

impl From<ChannelError> for io::Error {
    fn from(e: ChannelError) -> Self {
        io::Error::other(e)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
