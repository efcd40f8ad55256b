//! Benchmark harness.
//!
//! Drives one party through a run:
//!
//!   readiness barrier → setup → rcot → rcot_inplace
//!     → flush all → finalize all → aggregate → cross-check → report
//!
//! Every channel the engine sees is a [`HashingChannel`]. The barrier, the
//! correlation spot checks and the digest exchange go over channel 0's raw
//! transport and never reach the digests.

use std::fmt;
use std::io;
use std::time::Instant;

use otscribe_core::{
    ChannelDigests, ChannelError, Digest, DigestConfig, DigestError, HashingChannel,
    TranscriptDigests, Transport,
};
use otscribe_engine::{Block, EngineConfig, EngineError, RcotEngine, Role};

use crate::config::{BenchConfig, ConfigError, MAX_LOG2_CEILING};
use crate::net::sync_ready;
use crate::report::{PhaseReport, RunReport};
use crate::verify::check_correlations;

// ── Stages ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Uninitialized,
    Setup,
    BulkGenerateInternal,
    BulkGenerateInplace,
    Flushed,
    Finalized,
    Reported,
}

impl Stage {
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Uninitialized => Some(Stage::Setup),
            Stage::Setup => Some(Stage::BulkGenerateInternal),
            Stage::BulkGenerateInternal => Some(Stage::BulkGenerateInplace),
            Stage::BulkGenerateInplace => Some(Stage::Flushed),
            Stage::Flushed => Some(Stage::Finalized),
            Stage::Finalized => Some(Stage::Reported),
            Stage::Reported => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Uninitialized => "uninitialized",
            Stage::Setup => "setup",
            Stage::BulkGenerateInternal => "rcot",
            Stage::BulkGenerateInplace => "rcot_inplace",
            Stage::Flushed => "flushed",
            Stage::Finalized => "finalized",
            Stage::Reported => "reported",
        };
        f.write_str(s)
    }
}

/// Enforces the stage order of a run. Only single steps forward are
/// accepted.
#[derive(Debug)]
pub struct StageTracker {
    role: Role,
    current: Stage,
}

impl StageTracker {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            current: Stage::Uninitialized,
        }
    }

    pub fn current(&self) -> Stage {
        self.current
    }

    pub fn advance(&mut self, to: Stage) -> Result<(), BenchError> {
        if self.current.next() != Some(to) {
            return Err(BenchError::StageOrder {
                from: self.current,
                to,
            });
        }
        tracing::debug!(party = self.role.party(), from = %self.current, %to, "stage");
        self.current = to;
        Ok(())
    }
}

// ── Parameters ────────────────────────────────────────────────────────────────

/// Everything one party needs to run, resolved from config and args.
#[derive(Debug, Clone, Copy)]
pub struct BenchParams {
    pub log2: u32,
    pub channels: usize,
    pub verify_samples: usize,
    pub cross_check: bool,
    pub digest: DigestConfig,
    pub engine: EngineConfig,
}

impl BenchParams {
    /// Resolve run parameters, applying the size guard.
    pub fn from_config(config: &BenchConfig, log2: Option<u32>) -> Result<Self, BenchError> {
        let log2 = log2.unwrap_or(config.bench.default_log2);
        check_size(log2, config.bench.max_log2)?;
        Ok(Self {
            log2,
            channels: config.bench.channels,
            verify_samples: config.bench.verify_samples,
            cross_check: config.bench.cross_check,
            digest: config.digest_config()?,
            engine: config.engine,
        })
    }
}

/// Refuse requests above `2^max_log2` before any work starts.
pub fn check_size(log2: u32, max_log2: u32) -> Result<u64, BenchError> {
    let max = max_log2.min(MAX_LOG2_CEILING);
    if log2 > max {
        return Err(BenchError::SizeGuard { log2, max });
    }
    Ok(1u64 << log2)
}

// ── Run ───────────────────────────────────────────────────────────────────────

/// Run one party of the benchmark over `transports` with engine `E`.
pub async fn run<T, E>(
    role: Role,
    transports: Vec<T>,
    params: &BenchParams,
) -> Result<RunReport, BenchError>
where
    T: Transport,
    E: RcotEngine<HashingChannel<T>>,
{
    if transports.len() != params.channels {
        return Err(BenchError::ChannelCount {
            expected: params.channels,
            actual: transports.len(),
        });
    }
    check_size(params.log2, MAX_LOG2_CEILING)?;
    let count = 1usize
        .checked_shl(params.log2)
        .ok_or(BenchError::SizeGuard {
            log2: params.log2,
            max: usize::BITS - 1,
        })?;

    let mut stages = StageTracker::new(role);
    let mut channels: Vec<HashingChannel<T>> = transports
        .into_iter()
        .map(|t| HashingChannel::new(t, params.digest))
        .collect();
    let Some(first) = channels.first_mut() else {
        return Err(EngineError::NoChannels.into());
    };
    sync_ready(role, first.raw_mut()).await?;
    tracing::info!(
        party = role.party(),
        channels = params.channels,
        log2 = params.log2,
        "run started"
    );

    let mut phases = Vec::with_capacity(3);

    // Setup
    stages.advance(Stage::Setup)?;
    let start = Instant::now();
    let mut engine = E::setup(role, channels, params.engine).await?;
    phases.push(PhaseReport::timed("setup", start.elapsed()));

    // Bulk generation into an engine buffer
    stages.advance(Stage::BulkGenerateInternal)?;
    let start = Instant::now();
    let blocks = engine.rcot(count).await?;
    let generation = start.elapsed();
    verify::<T, E>(&mut engine, role, &blocks, params.verify_samples).await?;
    phases.push(PhaseReport::generated("rcot", start.elapsed(), generation, count as u64));
    drop(blocks);

    // Bulk generation into a caller buffer of the per-call limit
    stages.advance(Stage::BulkGenerateInplace)?;
    let limit = engine.batch_limit();
    let mut buffer: Vec<Block> = vec![0; limit];
    let start = Instant::now();
    engine.rcot_inplace(&mut buffer).await?;
    let generation = start.elapsed();
    verify::<T, E>(&mut engine, role, &buffer, params.verify_samples).await?;
    phases.push(PhaseReport::generated("rcot_inplace", start.elapsed(), generation, limit as u64));
    drop(buffer);

    // Barrier: nothing is finalized until everything is flushed.
    stages.advance(Stage::Flushed)?;
    let mut channels = engine.into_channels();
    for ch in channels.iter_mut() {
        ch.flush().await?;
    }
    let bytes_sent: u64 = channels.iter().map(|c| c.bytes_sent()).sum();
    let bytes_received: u64 = channels.iter().map(|c| c.bytes_received()).sum();

    stages.advance(Stage::Finalized)?;
    let parts = channels
        .iter_mut()
        .map(|c| c.finalize())
        .collect::<Result<Vec<ChannelDigests>, ChannelError>>()?;
    let digests = TranscriptDigests::aggregate(&parts, params.digest);
    tracing::info!(
        party = role.party(),
        bytes_sent,
        bytes_received,
        send_digest = %digests.send,
        recv_digest = %digests.recv,
        "transcript finalized"
    );

    let peer_match = if params.cross_check {
        let Some(first) = channels.first_mut() else {
            return Err(EngineError::NoChannels.into());
        };
        let peer = exchange_digests(first.raw_mut(), &digests, params.digest).await?;
        let ok = digests.matches_peer(&peer);
        if !ok {
            tracing::error!(
                party = role.party(),
                ours_send = %digests.send,
                ours_recv = %digests.recv,
                peer_send = %peer.send,
                peer_recv = %peer.recv,
                "transcript digests disagree with peer"
            );
        }
        Some(ok)
    } else {
        None
    };

    stages.advance(Stage::Reported)?;
    Ok(RunReport {
        role,
        phases,
        bytes_sent,
        bytes_received,
        digests,
        peer_match,
    })
}

async fn verify<T, E>(
    engine: &mut E,
    role: Role,
    blocks: &[Block],
    samples: usize,
) -> Result<(), BenchError>
where
    T: Transport,
    E: RcotEngine<HashingChannel<T>>,
{
    let delta = engine.delta();
    let channel = engine.channel_mut(0).ok_or(EngineError::NoChannels)?;
    check_correlations(role, delta, blocks, channel.raw_mut(), samples).await
}

/// Send ours, then read the peer's. Both sides send first; the payload is
/// far below any transport buffer.
async fn exchange_digests<T: Transport>(
    raw: &mut T,
    ours: &TranscriptDigests,
    config: DigestConfig,
) -> Result<TranscriptDigests, BenchError> {
    raw.send(&ours.to_bytes()).await?;
    raw.flush().await?;
    let mut buf = vec![0u8; 2 * config.len()];
    raw.receive(&mut buf).await?;
    Ok(TranscriptDigests::from_bytes(&buf, config)?)
}

impl RunReport {
    /// Turn a failed cross-check into an error. Runs without a cross-check
    /// pass.
    pub fn ensure_consistent(&self) -> Result<(), BenchError> {
        match self.peer_match {
            Some(false) => Err(BenchError::TranscriptMismatch {
                send: self.digests.send.clone(),
                recv: self.digests.recv.clone(),
            }),
            _ => Ok(()),
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("Large test size! (guard): 2^{log2} exceeds the limit of 2^{max}")]
    SizeGuard { log2: u32, max: u32 },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("expected {expected} channels, got {actual}")]
    ChannelCount { expected: usize, actual: usize },

    #[error("ports {base}.. cannot hold {count} channels")]
    PortRange { base: u16, count: usize },

    #[error("failed to listen on {addr}: {source}")]
    Listen { addr: String, source: io::Error },

    #[error("failed to connect to {addr} after {attempts} attempts: {source}")]
    Connect {
        addr: String,
        attempts: u32,
        source: io::Error,
    },

    #[error("transport failure: {0}")]
    Io(#[from] io::Error),

    #[error("unexpected readiness bytes {0:?}")]
    Handshake([u8; 2]),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Digest(#[from] DigestError),

    #[error("party 1 has no global correlation to reveal")]
    MissingDelta,

    #[error("correlation check failed at index {index}")]
    CorrelationMismatch { index: usize },

    #[error("stage {to} cannot follow {from}")]
    StageOrder { from: Stage, to: Stage },

    #[error("transcript mismatch with peer (send {send}, recv {recv})")]
    TranscriptMismatch { send: Digest, recv: Digest },
}
