//! Send samples one at a time at a fixed pace until interrupted.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use yansi::Paint;

use crate::http::HttpRemote;
use crate::sample::{Sample, SampleGenerator};

/// Parameters of a trickle run.
#[derive(Clone, Copy, Debug)]
pub struct TrickleOptions {
    /// Pause after every request.
    pub interval: Duration,
    /// Stop after this many iterations. Runs until shutdown if `None`.
    pub limit: Option<u64>,
}

/// Counters of a finished trickle run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrickleSummary {
    /// Iterations whose request completed, regardless of outcome.
    pub attempted: u64,
    /// Requests answered with `202 Accepted`.
    pub succeeded: u64,
    /// Requests that were rejected or failed.
    pub failed: u64,
    /// Anomalous samples among all attempted iterations.
    pub anomalies: u64,
}

impl TrickleSummary {
    /// Prints the final summary to stdout.
    pub fn print(&self) {
        println!();
        println!(
            "{} {} samples ({} accepted, {} failed, {} anomalies)",
            "Generated".bold(),
            self.attempted.bold(),
            self.succeeded.green(),
            self.failed.red(),
            self.anomalies.yellow()
        );
    }
}

/// Sends one sample per iteration, pausing `options.interval` in between, until `shutdown`
/// resolves or the iteration limit is reached.
///
/// Shutdown is observed while a request is in flight as well as during the pause. A request
/// interrupted by shutdown is abandoned and does not count as attempted.
pub async fn run(
    remote: HttpRemote,
    mut generator: SampleGenerator,
    options: TrickleOptions,
    shutdown: impl Future<Output = ()>,
) -> TrickleSummary {
    tracing::info!(url = remote.url(), interval = ?options.interval, "starting trickle run");

    let mut summary = TrickleSummary::default();
    tokio::pin!(shutdown);

    let limit_reached = |summary: &TrickleSummary| {
        options
            .limit
            .is_some_and(|limit| summary.attempted >= limit)
    };

    for id in 1.. {
        if limit_reached(&summary) {
            break;
        }

        let sample = generator.sample(id);
        let result = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            result = remote.send(&sample) => result,
        };

        summary.attempted += 1;
        if sample.anomaly {
            summary.anomalies += 1;
        }
        match result {
            Ok(()) => summary.succeeded += 1,
            Err(ref err) => {
                summary.failed += 1;
                tracing::warn!(device_id = %sample.device_id, "failed to send sample: {err}");
            }
        }
        print_status(&sample, result.is_ok());

        if limit_reached(&summary) {
            break;
        }
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(options.interval) => {}
        }
    }

    tracing::info!(attempted = summary.attempted, "trickle run stopped");
    summary
}

/// Runs [`run`] until the process receives `SIGINT` or `SIGTERM`, or shutdown is initiated through
/// [`elegant_departure::shutdown`].
///
/// The summary is returned in either case, and also when the iteration limit ends the run first.
pub async fn run_until_shutdown(
    remote: HttpRemote,
    generator: SampleGenerator,
    options: TrickleOptions,
) -> Result<TrickleSummary> {
    let shutdown = elegant_departure::get_shutdown_guard().wait_owned();
    let mut task = tokio::spawn(run(remote, generator, options, shutdown));

    let summary = tokio::select! {
        summary = &mut task => summary?,
        _ = async {
            elegant_departure::tokio::depart()
                .on_termination()
                .on_sigint()
                .await
        } => task.await?,
    };

    Ok(summary)
}

fn print_status(sample: &Sample, success: bool) {
    let symbol = if success { "✓".green() } else { "✗".red() };
    if sample.anomaly {
        println!(
            "{symbol} {}: {:.1} {}",
            sample.device_id,
            sample.value.bold(),
            "[ANOMALY]".yellow()
        );
    } else {
        println!("{symbol} {}: {:.1}", sample.device_id, sample.value);
    }
}
