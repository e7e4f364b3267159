//! Command line entry point of the `metricgen` binary.

use std::path::PathBuf;

use anyhow::{Context, Result};
use argh::FromArgs;

use crate::bulk::{self, BulkOptions};
use crate::config::Config;
use crate::http::HttpRemote;
use crate::observability;
use crate::sample::{AnomalyRule, SampleGenerator};
use crate::trickle::{self, TrickleOptions};

/// Synthetic load generator for the metrics ingestion endpoint.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    #[argh(subcommand)]
    pub command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Bulk(BulkCommand),
    Trickle(TrickleCommand),
    Version(VersionCommand),
}

/// send a fixed number of samples concurrently and report the achieved throughput
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "bulk")]
struct BulkCommand {}

/// send samples one at a time until interrupted
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "trickle")]
struct TrickleCommand {}

/// print the metricgen version
#[derive(Default, Debug, FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionCommand {}

/// Bootstrap the runtime and execute the CLI command.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    // Special switch to just print the version and exit.
    if let Command::Version(_) = args.command {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = Config::load(args.config.as_deref()).context("failed to load configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("main-rt")
        .enable_all()
        .worker_threads(config.runtime.worker_threads.max(1))
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::init_colors();
    observability::init_tracing(&config);
    tracing::debug!(?config);

    runtime.block_on(async move {
        match args.command {
            Command::Bulk(BulkCommand {}) => run_bulk(config).await,
            Command::Trickle(TrickleCommand {}) => run_trickle(config).await,
            Command::Version(VersionCommand {}) => unreachable!(),
        }
    })
}

async fn run_bulk(config: Config) -> Result<()> {
    let remote = HttpRemote::new(config.target_url, config.bulk.timeout)?;
    let generator = SampleGenerator::builder(config.bulk.device_prefix)
        .ranges(config.values)
        .rule(AnomalyRule::Probability(config.bulk.anomaly_rate))
        .build()?;
    let options = BulkOptions {
        total_requests: config.bulk.total_requests,
        concurrency: config.bulk.concurrency,
        target_rps: config.bulk.target_rps,
    };

    let report = bulk::run(remote, generator, options).await?;
    report.print();

    Ok(())
}

async fn run_trickle(config: Config) -> Result<()> {
    let remote = HttpRemote::new(config.target_url, config.trickle.timeout)?;
    let generator = SampleGenerator::builder(config.trickle.device_prefix)
        .ranges(config.values)
        .rule(AnomalyRule::EveryNth(config.trickle.anomaly_every))
        .build()?;
    let options = TrickleOptions {
        interval: config.trickle.interval,
        limit: config.trickle.limit,
    };

    println!("Generating samples against {}", remote.url());
    println!("Press Ctrl+C to stop");
    println!();

    let summary = trickle::run_until_shutdown(remote, generator, options).await?;
    summary.print();

    Ok(())
}
