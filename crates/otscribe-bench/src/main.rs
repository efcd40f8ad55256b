//! otscribe-bench — run one party of the benchmark.
//!
//!   otscribe-bench <party 1|2> <port> [log2 size]

use std::process::ExitCode;

use anyhow::{Context, Result};

use otscribe_bench::cli::USAGE;
use otscribe_bench::net::open_channels;
use otscribe_bench::{run, Args, BenchConfig, BenchError, BenchParams};
use otscribe_engine::ClearCot;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Logs go to stderr; stdout carries the report.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = match Args::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}\n{USAGE}");
            return Ok(ExitCode::from(2));
        }
    };

    let config = BenchConfig::load().context("failed to load config")?;

    let params = match BenchParams::from_config(&config, args.log2) {
        Ok(params) => params,
        Err(e @ BenchError::SizeGuard { .. }) => {
            tracing::warn!(log2 = ?args.log2, max = config.bench.max_log2, "request refused");
            eprintln!("{e}");
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e).context("invalid benchmark parameters"),
    };
    tracing::info!(
        party = args.role.party(),
        port = args.port,
        log2 = params.log2,
        channels = params.channels,
        variant = %params.engine.variant,
        malicious = params.engine.malicious,
        "otscribe-bench starting"
    );

    let transports = open_channels(args.role, args.port, params.channels, &config.network)
        .await
        .context("failed to open channels")?;

    let report = run::<_, ClearCot<_>>(args.role, transports, &params)
        .await
        .context("benchmark run failed")?;
    print!("{report}");

    report.ensure_consistent()?;
    Ok(ExitCode::SUCCESS)
}
