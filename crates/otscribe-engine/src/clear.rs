//! ClearCot — an RCOT engine that produces real correlations in the clear.
//!
//! ClearCot gives NO privacy: party 1 learns every choice bit. It exists to
//! push protocol-shaped traffic through the instrumented channels at
//! realistic volume, with the same setup / batch / consistency-check
//! structure and buffer-ownership split as a production engine.
//!
//! Per channel and per batch of `n` blocks:
//!
//!   1. choice bits: with `precompute`, expanded by both sides from the
//!      seed party 2 sent at setup; otherwise party 2 sends `ceil(n/8)`
//!      packed bits.
//!   2. party 1 sends `M_i = K_i ⊕ b_i·Δ`, 16 bytes LE per block.
//!   3. with `malicious`, party 2 sends a challenge seed, both expand
//!      coefficient bits `χ_i`, and party 1 answers with
//!      `H(⊕χ_i·K_i) || H(⊕χ_i·K_i ⊕ Δ)`. Party 2 checks the half selected
//!      by `⊕χ_i·b_i` against `H(⊕χ_i·M_i)`.

use futures::future::try_join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;

use otscribe_core::Transport;

use crate::{Block, EngineConfig, EngineError, RcotEngine, Role, Variant, BLOCK_BYTES};

const HELLO_MAGIC: [u8; 4] = *b"OTSC";
const HELLO_VERSION: u8 = 1;
const HELLO_LEN: usize = 24;

/// Blocks encoded per transport call.
const WIRE_CHUNK_BLOCKS: usize = 4096;

const CHOICE_DOMAIN: &[u8] = b"otscribe.clearcot.choice";
const CHALLENGE_DOMAIN: &[u8] = b"otscribe.clearcot.challenge";

pub struct ClearCot<C> {
    role: Role,
    config: EngineConfig,
    delta: Option<Block>,
    lanes: Vec<Lane<C>>,
}

/// One channel and the state that travels with it into a worker.
struct Lane<C> {
    index: usize,
    channel: C,
    choice_seed: Option<[u8; 32]>,
    batches: u64,
    rng: StdRng,
}

#[derive(Clone, Copy)]
struct BatchParams {
    role: Role,
    delta: Block,
    malicious: bool,
    batch_limit: usize,
}

impl<C> ClearCot<C> {
    fn params(&self) -> BatchParams {
        BatchParams {
            role: self.role,
            delta: self.delta.unwrap_or(0),
            malicious: self.config.malicious,
            batch_limit: self.config.batch_limit(),
        }
    }
}

impl<C: Transport + 'static> RcotEngine<C> for ClearCot<C> {
    async fn setup(
        role: Role,
        channels: Vec<C>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        if channels.is_empty() {
            return Err(EngineError::NoChannels);
        }
        let count = channels.len();
        let mut lanes: Vec<Lane<C>> = channels
            .into_iter()
            .enumerate()
            .map(|(index, channel)| Lane {
                index,
                channel,
                choice_seed: None,
                batches: 0,
                rng: StdRng::from_entropy(),
            })
            .collect();

        try_join_all(lanes.iter_mut().map(|lane| lane.setup(role, &config, count))).await?;

        let delta = match role {
            Role::Alice => Some(StdRng::from_entropy().gen::<Block>() | 1),
            Role::Bob => None,
        };

        tracing::info!(
            party = role.party(),
            channels = count,
            variant = %config.variant,
            malicious = config.malicious,
            precompute = config.precompute,
            batch_limit = config.batch_limit(),
            "rcot engine ready"
        );

        Ok(Self {
            role,
            config,
            delta,
            lanes,
        })
    }

    fn role(&self) -> Role {
        self.role
    }

    fn batch_limit(&self) -> usize {
        self.config.batch_limit()
    }

    fn delta(&self) -> Option<Block> {
        self.delta
    }

    fn channel_count(&self) -> usize {
        self.lanes.len()
    }

    fn channel_mut(&mut self, index: usize) -> Option<&mut C> {
        self.lanes.get_mut(index).map(|lane| &mut lane.channel)
    }

    async fn rcot(&mut self, count: usize) -> Result<Vec<Block>, EngineError> {
        let params = self.params();
        let shares = split_even(count, self.lanes.len());
        let mut out = vec![0 as Block; count];

        // Each lane moves into its own worker and comes back when the
        // worker is joined. Workers hand over finished batches tagged with
        // their offset, so only a few batches are ever held beside `out`.
        let (tx, mut rx) = mpsc::channel::<(usize, Vec<Block>)>(self.lanes.len().max(1));
        let mut workers = Vec::with_capacity(shares.len());
        let mut start = 0;
        for (mut lane, share) in std::mem::take(&mut self.lanes).into_iter().zip(shares) {
            let tx = tx.clone();
            workers.push(tokio::spawn(async move {
                let result = lane.stream(params, start, share, tx).await;
                (lane, result)
            }));
            start += share;
        }
        drop(tx);

        while let Some((at, batch)) = rx.recv().await {
            out[at..at + batch.len()].copy_from_slice(&batch);
        }

        let mut failure = None;
        for worker in workers {
            let (lane, result) = worker.await?;
            self.lanes.push(lane);
            if let Err(e) = result {
                failure.get_or_insert(e);
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(out),
        }
    }

    async fn rcot_inplace(&mut self, out: &mut [Block]) -> Result<(), EngineError> {
        let limit = self.config.batch_limit();
        if out.len() > limit {
            return Err(EngineError::BatchTooLarge {
                len: out.len(),
                limit,
            });
        }
        let params = self.params();
        let shares = split_even(out.len(), self.lanes.len());

        let mut rest = out;
        let mut work = Vec::with_capacity(shares.len());
        for (lane, share) in self.lanes.iter_mut().zip(shares) {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(share);
            rest = tail;
            work.push(lane.generate(params, head));
        }
        try_join_all(work).await?;
        Ok(())
    }

    fn into_channels(self) -> Vec<C> {
        self.lanes.into_iter().map(|lane| lane.channel).collect()
    }
}

impl<C: Transport> Lane<C> {
    async fn setup(
        &mut self,
        role: Role,
        config: &EngineConfig,
        count: usize,
    ) -> Result<(), EngineError> {
        let ours = hello(role, config, self.index, count);
        self.channel.send(&ours).await?;
        let mut theirs = [0u8; HELLO_LEN];
        self.channel.receive(&mut theirs).await?;
        check_hello(&theirs, role, config, self.index, count)?;

        if config.precompute {
            let mut seed = [0u8; 32];
            match role {
                Role::Bob => {
                    self.rng.fill(&mut seed);
                    self.channel.send(&seed).await?;
                }
                Role::Alice => self.channel.receive(&mut seed).await?,
            }
            self.choice_seed = Some(seed);
        }
        self.channel.flush().await?;

        tracing::debug!(channel = self.index, "channel setup complete");
        Ok(())
    }

    /// Fill `out` in batches of at most `batch_limit`, then flush.
    async fn generate(
        &mut self,
        params: BatchParams,
        out: &mut [Block],
    ) -> Result<(), EngineError> {
        for batch in out.chunks_mut(params.batch_limit.max(1)) {
            self.batch(params, batch).await?;
        }
        self.channel.flush().await?;
        Ok(())
    }

    /// Like [`generate`](Self::generate) over `len` blocks starting at
    /// output offset `start`, but each batch goes to `sink` tagged with its
    /// offset.
    async fn stream(
        &mut self,
        params: BatchParams,
        start: usize,
        len: usize,
        sink: mpsc::Sender<(usize, Vec<Block>)>,
    ) -> Result<(), EngineError> {
        let step = params.batch_limit.max(1);
        let mut done = 0;
        while done < len {
            let mut batch = vec![0 as Block; step.min(len - done)];
            self.batch(params, &mut batch).await?;
            let n = batch.len();
            sink.send((start + done, batch))
                .await
                .map_err(|_| EngineError::OutputClosed)?;
            done += n;
        }
        self.channel.flush().await?;
        Ok(())
    }

    async fn batch(&mut self, params: BatchParams, out: &mut [Block]) -> Result<(), EngineError> {
        let n = out.len();
        let counter = self.batches;
        self.batches += 1;

        let choices = match (self.choice_seed, params.role) {
            (Some(seed), _) => expand_bits(&seed, CHOICE_DOMAIN, counter, n),
            (None, Role::Bob) => {
                let mut bits = vec![0u8; n.div_ceil(8)];
                self.rng.fill(bits.as_mut_slice());
                self.channel.send(&bits).await?;
                bits
            }
            (None, Role::Alice) => {
                let mut bits = vec![0u8; n.div_ceil(8)];
                self.channel.receive(&mut bits).await?;
                bits
            }
        };

        match params.role {
            Role::Alice => self.send_blocks(params.delta, &choices, out).await?,
            Role::Bob => self.receive_blocks(&choices, out).await?,
        }

        if params.malicious {
            self.consistency_check(params, out).await?;
        }

        tracing::trace!(channel = self.index, batch = counter, blocks = n, "batch done");
        Ok(())
    }

    async fn send_blocks(
        &mut self,
        delta: Block,
        choices: &[u8],
        out: &mut [Block],
    ) -> Result<(), EngineError> {
        for k in out.iter_mut() {
            *k = self.rng.gen::<Block>() & !1;
        }
        let mut wire = Vec::with_capacity(WIRE_CHUNK_BLOCKS * BLOCK_BYTES);
        for (chunk_idx, chunk) in out.chunks(WIRE_CHUNK_BLOCKS).enumerate() {
            wire.clear();
            for (i, k) in chunk.iter().enumerate() {
                let m = if bit(choices, chunk_idx * WIRE_CHUNK_BLOCKS + i) {
                    k ^ delta
                } else {
                    *k
                };
                wire.extend_from_slice(&m.to_le_bytes());
            }
            self.channel.send(&wire).await?;
        }
        Ok(())
    }

    async fn receive_blocks(
        &mut self,
        choices: &[u8],
        out: &mut [Block],
    ) -> Result<(), EngineError> {
        let mut wire = vec![0u8; WIRE_CHUNK_BLOCKS * BLOCK_BYTES];
        for (chunk_idx, chunk) in out.chunks_mut(WIRE_CHUNK_BLOCKS).enumerate() {
            let bytes = &mut wire[..chunk.len() * BLOCK_BYTES];
            self.channel.receive(bytes).await?;
            let words = chunk.iter_mut().zip(bytes.chunks_exact(BLOCK_BYTES));
            for (i, (m, raw)) in words.enumerate() {
                let mut le = [0u8; BLOCK_BYTES];
                le.copy_from_slice(raw);
                *m = Block::from_le_bytes(le);
                if crate::lsb(*m) != bit(choices, chunk_idx * WIRE_CHUNK_BLOCKS + i) {
                    return Err(EngineError::ConsistencyCheck(self.index));
                }
            }
        }
        Ok(())
    }

    async fn consistency_check(
        &mut self,
        params: BatchParams,
        out: &[Block],
    ) -> Result<(), EngineError> {
        let mut seed = [0u8; 32];
        match params.role {
            Role::Bob => {
                self.rng.fill(&mut seed);
                self.channel.send(&seed).await?;
            }
            Role::Alice => self.channel.receive(&mut seed).await?,
        }
        let chi = expand_bits(&seed, CHALLENGE_DOMAIN, 0, out.len());
        let combined = out
            .iter()
            .enumerate()
            .filter(|(i, _)| bit(&chi, *i))
            .fold(0 as Block, |acc, (_, b)| acc ^ b);

        match params.role {
            Role::Alice => {
                let mut answer = [0u8; 64];
                answer[..32].copy_from_slice(blake3::hash(&combined.to_le_bytes()).as_bytes());
                answer[32..].copy_from_slice(
                    blake3::hash(&(combined ^ params.delta).to_le_bytes()).as_bytes(),
                );
                self.channel.send(&answer).await?;
            }
            Role::Bob => {
                let mut answer = [0u8; 64];
                self.channel.receive(&mut answer).await?;
                let selected = if crate::lsb(combined) { &answer[32..] } else { &answer[..32] };
                if blake3::hash(&combined.to_le_bytes()).as_bytes() != selected {
                    return Err(EngineError::ConsistencyCheck(self.index));
                }
            }
        }
        Ok(())
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn hello(role: Role, config: &EngineConfig, index: usize, count: usize) -> [u8; HELLO_LEN] {
    let mut out = [0u8; HELLO_LEN];
    out[..4].copy_from_slice(&HELLO_MAGIC);
    out[4] = HELLO_VERSION;
    out[5] = role.party();
    out[6] = config.variant.tag();
    out[7] = config.malicious as u8 | (config.precompute as u8) << 1;
    out[8..16].copy_from_slice(&(config.batch_limit() as u64).to_le_bytes());
    out[16..20].copy_from_slice(&(index as u32).to_le_bytes());
    out[20..24].copy_from_slice(&(count as u32).to_le_bytes());
    out
}

fn check_hello(
    theirs: &[u8; HELLO_LEN],
    role: Role,
    config: &EngineConfig,
    index: usize,
    count: usize,
) -> Result<(), EngineError> {
    let mismatch = |detail: String| EngineError::ConfigMismatch {
        channel: index,
        detail,
    };
    if theirs[..4] != HELLO_MAGIC || theirs[4] != HELLO_VERSION {
        return Err(mismatch("not an otscribe peer".into()));
    }
    let expected = hello(role.peer(), config, index, count);
    if theirs[5] != expected[5] {
        return Err(mismatch(format!("peer also plays party {}", theirs[5])));
    }
    if theirs[6] != expected[6] {
        let peer = match Variant::from_tag(theirs[6]) {
            Some(v) => v.to_string(),
            None => format!("tag {}", theirs[6]),
        };
        return Err(mismatch(format!("variant {peer} vs ours {}", config.variant)));
    }
    if theirs[7] != expected[7] {
        return Err(mismatch("malicious/precompute flags differ".into()));
    }
    if theirs[8..16] != expected[8..16] {
        return Err(mismatch("batch limit differs".into()));
    }
    if theirs[16..] != expected[16..] {
        return Err(mismatch("channel layout differs".into()));
    }
    Ok(())
}

/// `n` bits, packed LSB-first, from a keyed XOF over `(domain, counter)`.
fn expand_bits(seed: &[u8; 32], domain: &[u8], counter: u64, n: usize) -> Vec<u8> {
    let mut hasher = blake3::Hasher::new_keyed(seed);
    hasher.update(domain);
    hasher.update(&counter.to_le_bytes());
    let mut out = vec![0u8; n.div_ceil(8)];
    hasher.finalize_xof().fill(&mut out);
    out
}

fn bit(packed: &[u8], i: usize) -> bool {
    packed[i / 8] >> (i % 8) & 1 == 1
}

/// Split `count` into `parts` shares: the first `count % parts` shares get
/// one extra.
fn split_even(count: usize, parts: usize) -> Vec<usize> {
    let base = count / parts;
    let extra = count % parts;
    (0..parts).map(|i| base + usize::from(i < extra)).collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
