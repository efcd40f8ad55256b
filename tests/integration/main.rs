//! otscribe integration tests.
//!
//! Both parties run in one process, concurrently, over in-memory duplex
//! pipes or localhost TCP. Nothing needs to be set up beforehand.
//!
//!   cargo test --test integration

mod loopback;
mod tcp;

use anyhow::{Context, Result};

use otscribe_bench::{run, BenchParams, RunReport};
use otscribe_core::{duplex_pair, DigestConfig, IoTransport, Transport};
use otscribe_engine::{ClearCot, EngineConfig, Role, Variant};
use tokio::io::DuplexStream;

// ── Harness ───────────────────────────────────────────────────────────────────

pub type Pipe = IoTransport<DuplexStream>;

/// Small enough to run in debug builds, large enough to span several
/// batches per channel.
pub fn params(log2: u32, channels: usize) -> BenchParams {
    BenchParams {
        log2,
        channels,
        verify_samples: 128,
        cross_check: true,
        digest: DigestConfig::default(),
        engine: EngineConfig {
            malicious: true,
            precompute: true,
            variant: Variant::B13,
            batch_limit: Some(256),
        },
    }
}

/// `n` in-memory channels per side.
pub fn pipes(n: usize) -> (Vec<Pipe>, Vec<Pipe>) {
    (0..n).map(|_| duplex_pair(1 << 16)).unzip()
}

/// Run both parties to completion.
pub async fn run_pair<T>(
    alice: Vec<T>,
    bob: Vec<T>,
    params: &BenchParams,
) -> Result<(RunReport, RunReport)>
where
    T: Transport + 'static,
{
    let (a, b) = tokio::try_join!(
        async {
            run::<_, ClearCot<_>>(Role::Alice, alice, params)
                .await
                .context("party 1 failed")
        },
        async {
            run::<_, ClearCot<_>>(Role::Bob, bob, params)
                .await
                .context("party 2 failed")
        },
    )?;
    Ok((a, b))
}

/// The cross-party properties every successful run must have.
pub fn assert_consistent(alice: &RunReport, bob: &RunReport) {
    assert_eq!(alice.digests.send, bob.digests.recv, "party 1 send vs party 2 recv");
    assert_eq!(alice.digests.recv, bob.digests.send, "party 1 recv vs party 2 send");
    assert_eq!(alice.bytes_sent, bob.bytes_received);
    assert_eq!(alice.bytes_received, bob.bytes_sent);
}
