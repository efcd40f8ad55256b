//! otscribe-bench — two-party RCOT benchmark with transcript digests.
//!
//! Each party runs the same sequence over a set of parallel channels and
//! prints timing, throughput, byte totals and the aggregate send and
//! receive digests. Matching digests across the two outputs show that both
//! sides saw the same transcript.

pub mod cli;
pub mod config;
pub mod harness;
pub mod net;
pub mod report;
pub mod verify;

pub use cli::{Args, ArgsError};
pub use config::{BenchConfig, ConfigError};
pub use harness::{check_size, run, BenchError, BenchParams, Stage, StageTracker};
pub use report::{PhaseReport, RunReport};
