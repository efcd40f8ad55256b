//! Spot check of the generated correlations.
//!
//! Party 1 reveals `Δ` and its blocks at evenly spaced indices over an
//! unhashed transport; party 2 checks `M_i = K_i ⊕ lsb(M_i)·Δ`. The reveal
//! would break privacy in a real deployment, which is why it never touches
//! the transcript and only ever runs in a benchmark.

use otscribe_core::Transport;
use otscribe_engine::{lsb, Block, Role, BLOCK_BYTES};

use crate::harness::BenchError;

/// Up to `samples` indices in `0..len`, evenly spaced, starting at 0.
pub fn sample_indices(len: usize, samples: usize) -> Vec<usize> {
    let k = samples.min(len);
    (0..k)
        .map(|i| (i as u128 * len as u128 / k as u128) as usize)
        .collect()
}

pub async fn check_correlations<T: Transport>(
    role: Role,
    delta: Option<Block>,
    blocks: &[Block],
    raw: &mut T,
    samples: usize,
) -> Result<(), BenchError> {
    let indices = sample_indices(blocks.len(), samples);
    if indices.is_empty() {
        return Ok(());
    }

    match role {
        Role::Alice => {
            let delta = delta.ok_or(BenchError::MissingDelta)?;
            let mut wire = Vec::with_capacity((indices.len() + 1) * BLOCK_BYTES);
            wire.extend_from_slice(&delta.to_le_bytes());
            for &i in &indices {
                wire.extend_from_slice(&blocks[i].to_le_bytes());
            }
            raw.send(&wire).await?;
            raw.flush().await?;
        }
        Role::Bob => {
            let mut wire = vec![0u8; (indices.len() + 1) * BLOCK_BYTES];
            raw.receive(&mut wire).await?;
            let mut words = wire
                .chunks_exact(BLOCK_BYTES)
                .map(|c| {
                    let mut le = [0u8; BLOCK_BYTES];
                    le.copy_from_slice(c);
                    Block::from_le_bytes(le)
                });

            let delta = words.next().ok_or(BenchError::MissingDelta)?;
            if !lsb(delta) {
                return Err(BenchError::CorrelationMismatch { index: 0 });
            }
            for (&i, k) in indices.iter().zip(words) {
                let m = blocks[i];
                let expected = if lsb(m) { k ^ delta } else { k };
                if lsb(k) || m != expected {
                    return Err(BenchError::CorrelationMismatch { index: i });
                }
            }
        }
    }

    tracing::debug!(party = role.party(), samples = indices.len(), "correlations verified");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use otscribe_core::duplex_pair;

    const DELTA: Block = 0x1234_5678_9abc_def0_0fed_cba9_8765_4321 | 1;

    /// Sender blocks with lsb 0 and matching receiver blocks for `choices`.
    fn correlated(choices: &[bool]) -> (Vec<Block>, Vec<Block>) {
        let keys: Vec<Block> = (0..choices.len() as u128)
            .map(|i| (i.wrapping_mul(0x9e37_79b9_7f4a_7c15) << 1) & !1)
            .collect();
        let macs = keys
            .iter()
            .zip(choices)
            .map(|(&k, &b)| if b { k ^ DELTA } else { k })
            .collect();
        (keys, macs)
    }

    #[test]
    fn indices_are_spread_and_bounded() {
        assert_eq!(sample_indices(10, 5), vec![0, 2, 4, 6, 8]);
        assert_eq!(sample_indices(3, 1024), vec![0, 1, 2]);
        assert!(sample_indices(100, 0).is_empty());
        assert!(sample_indices(0, 8).is_empty());
        let wide = sample_indices(1 << 30, 1024);
        assert_eq!(wide.len(), 1024);
        assert!(wide.windows(2).all(|w| w[0] < w[1]));
        assert!(*wide.last().unwrap() < 1 << 30);
    }

    #[tokio::test]
    async fn valid_correlations_pass() {
        let choices: Vec<bool> = (0..500).map(|i| i % 3 == 0).collect();
        let (keys, macs) = correlated(&choices);
        let (mut a, mut b) = duplex_pair(1 << 16);

        tokio::try_join!(
            check_correlations(Role::Alice, Some(DELTA), &keys, &mut a, 64),
            check_correlations(Role::Bob, None, &macs, &mut b, 64),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn corrupted_block_is_caught() {
        let choices = vec![true; 16];
        let (keys, mut macs) = correlated(&choices);
        macs[4] ^= 0x100;
        let (mut a, mut b) = duplex_pair(1 << 16);

        let (sent, checked) = tokio::join!(
            check_correlations(Role::Alice, Some(DELTA), &keys, &mut a, 16),
            check_correlations(Role::Bob, None, &macs, &mut b, 16),
        );
        sent.unwrap();
        assert!(matches!(
            checked,
            Err(BenchError::CorrelationMismatch { index: 4 })
        ));
    }

    #[tokio::test]
    async fn sender_without_delta_fails() {
        let (mut a, _b) = duplex_pair(64);
        let err = check_correlations(Role::Alice, None, &[0, 2], &mut a, 2)
            .await
            .unwrap_err();
        assert!(matches!(err, BenchError::MissingDelta));
    }
}
