//! Line-oriented run report.
//!
//! One tab-separated line per phase, one summary line with byte totals and
//! hex digests, and, after a cross-check, one line with its outcome.

use std::fmt;
use std::time::Duration;

use otscribe_core::TranscriptDigests;
use otscribe_engine::Role;

#[derive(Debug, Clone)]
pub struct PhaseReport {
    pub name: &'static str,
    /// Wall time of the whole phase, verification included.
    pub elapsed: Duration,
    /// Time spent generating correlations. `None` for phases without
    /// throughput.
    pub generation: Option<Duration>,
    pub count: u64,
}

impl PhaseReport {
    pub fn timed(name: &'static str, elapsed: Duration) -> Self {
        Self {
            name,
            elapsed,
            generation: None,
            count: 0,
        }
    }

    pub fn generated(
        name: &'static str,
        elapsed: Duration,
        generation: Duration,
        count: u64,
    ) -> Self {
        Self {
            name,
            elapsed,
            generation: Some(generation),
            count,
        }
    }

    /// Correlations per second of generation time.
    pub fn throughput(&self) -> Option<f64> {
        // A zero-length timer reading would give infinity.
        let secs = self.generation?.as_secs_f64().max(1e-9);
        Some(self.count as f64 / secs)
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1e3
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub role: Role,
    pub phases: Vec<PhaseReport>,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub digests: TranscriptDigests,
    /// Outcome of the digest exchange. `None` when it was not run.
    pub peer_match: Option<bool>,
}

impl RunReport {
    pub fn phase(&self, name: &str) -> Option<&PhaseReport> {
        self.phases.iter().find(|p| p.name == name)
    }

    pub fn lines(&self) -> Vec<String> {
        let party = self.role.party();
        let mut lines: Vec<String> = self
            .phases
            .iter()
            .map(|p| {
                let mut line = format!("party={party}\tphase={}\t{:.2} ms", p.name, p.elapsed_ms());
                if let Some(ops) = p.throughput() {
                    line.push_str(&format!("\tOTps={ops:.1}"));
                }
                line
            })
            .collect();

        lines.push(format!(
            "party={party}\tbytes_sent={}\tbytes_recv={}\tsend_digest={}\trecv_digest={}",
            self.bytes_sent, self.bytes_received, self.digests.send, self.digests.recv
        ));

        match self.peer_match {
            Some(true) => lines.push(format!("party={party}\ttranscript=consistent")),
            Some(false) => lines.push(format!("party={party}\ttranscript=MISMATCH")),
            None => {}
        }
        lines
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.lines() {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otscribe_core::Digest;

    fn report(peer_match: Option<bool>) -> RunReport {
        RunReport {
            role: Role::Bob,
            phases: vec![
                PhaseReport::timed("setup", Duration::from_micros(1_234_567)),
                PhaseReport::generated(
                    "rcot",
                    Duration::from_millis(600),
                    Duration::from_millis(500),
                    1 << 20,
                ),
            ],
            bytes_sent: 1000,
            bytes_received: 2000,
            digests: TranscriptDigests {
                send: Digest::from_bytes(&[0xab; 16]),
                recv: Digest::from_bytes(&[0x01; 16]),
            },
            peer_match,
        }
    }

    #[test]
    fn renders_phase_and_summary_lines() {
        let lines = report(None).lines();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "party=2\tphase=setup\t1234.57 ms");
        assert_eq!(lines[1], "party=2\tphase=rcot\t600.00 ms\tOTps=2097152.0");
        assert_eq!(
            lines[2],
            format!(
                "party=2\tbytes_sent=1000\tbytes_recv=2000\tsend_digest={}\trecv_digest={}",
                "ab".repeat(16),
                "01".repeat(16)
            )
        );
    }

    #[test]
    fn cross_check_line() {
        let text = report(Some(true)).to_string();
        assert!(text.ends_with("party=2\ttranscript=consistent\n"));
        let text = report(Some(false)).to_string();
        assert!(text.ends_with("party=2\ttranscript=MISMATCH\n"));
    }

    #[test]
    fn throughput_uses_generation_time() {
        let r = report(None);
        assert_eq!(r.phase("setup").unwrap().throughput(), None);
        let ops = r.phase("rcot").unwrap().throughput().unwrap();
        assert!((ops - (1u64 << 21) as f64).abs() < 1e-6);
    }

    #[test]
    fn zero_generation_time_stays_finite() {
        let p = PhaseReport::generated("rcot", Duration::ZERO, Duration::ZERO, 10);
        let ops = p.throughput().unwrap();
        assert!(ops.is_finite() && ops > 0.0);
    }
}
