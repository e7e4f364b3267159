//! Dispatch a fixed number of samples concurrently and report the achieved throughput.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use sketches_ddsketch::DDSketch;
use yansi::Paint;

use crate::http::{HttpRemote, SendError};
use crate::sample::SampleGenerator;

/// Parameters of a bulk run.
#[derive(Clone, Copy, Debug)]
pub struct BulkOptions {
    /// Number of requests to dispatch.
    pub total_requests: u64,
    /// Maximum number of requests in flight.
    pub concurrency: usize,
    /// The throughput the run has to reach to pass.
    pub target_rps: f64,
}

/// Outcome counters of a run, shared by all in-flight requests.
#[derive(Default)]
pub struct Tally {
    /// Requests answered with `202 Accepted`.
    pub succeeded: u64,
    /// Requests rejected with `429 Too Many Requests`.
    pub rate_limited: u64,
    /// Requests answered with any other status.
    pub bad_status: u64,
    /// Requests that failed below HTTP, including timeouts.
    pub transport_errors: u64,
    /// Anomalous samples among all dispatched requests.
    pub anomalies: u64,
    /// Latency of every completed request in seconds.
    pub latency: DDSketch,
}

impl fmt::Debug for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tally")
            .field("succeeded", &self.succeeded)
            .field("rate_limited", &self.rate_limited)
            .field("bad_status", &self.bad_status)
            .field("transport_errors", &self.transport_errors)
            .field("anomalies", &self.anomalies)
            .field("latency_samples", &self.latency.count())
            .finish()
    }
}

impl Tally {
    /// Records the outcome of one completed request.
    pub fn record(&mut self, result: &Result<(), SendError>, anomaly: bool, elapsed: Duration) {
        match result {
            Ok(()) => self.succeeded += 1,
            Err(SendError::RateLimited) => self.rate_limited += 1,
            Err(SendError::Status(_)) => self.bad_status += 1,
            Err(SendError::Transport(_)) => self.transport_errors += 1,
        }
        if anomaly {
            self.anomalies += 1;
        }
        self.latency.add(elapsed.as_secs_f64());
    }

    /// All requests that were not accepted.
    pub fn failed(&self) -> u64 {
        self.rate_limited + self.bad_status + self.transport_errors
    }

    /// All recorded requests.
    pub fn completed(&self) -> u64 {
        self.succeeded + self.failed()
    }
}

/// The final report of a bulk run.
#[derive(Debug)]
pub struct BulkReport {
    /// Number of requests the run was asked to dispatch.
    pub total_requests: u64,
    /// Maximum number of requests in flight.
    pub concurrency: usize,
    /// Wall-clock time from first dispatch until the last request completed.
    pub elapsed: Duration,
    /// The throughput the run had to reach.
    pub target_rps: f64,
    /// Outcome counters.
    pub tally: Tally,
}

impl BulkReport {
    /// Completed requests per second regardless of outcome, or `0` if no time has elapsed.
    pub fn rps(&self) -> f64 {
        self.per_second(self.tally.completed())
    }

    /// Completed requests per minute.
    pub fn rpm(&self) -> f64 {
        self.rps() * 60.0
    }

    /// Accepted requests per second, or `0` if no time has elapsed.
    pub fn accepted_rps(&self) -> f64 {
        self.per_second(self.tally.succeeded)
    }

    /// Whether the accepted throughput reached the target.
    ///
    /// Failed requests do not count towards the target, so a run without any accepted request
    /// never passes.
    pub fn passed(&self) -> bool {
        self.tally.succeeded > 0 && self.accepted_rps() >= self.target_rps
    }

    fn per_second(&self, count: u64) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 { count as f64 / secs } else { 0.0 }
    }

    /// Prints the report to stdout.
    pub fn print(&self) {
        let tally = &self.tally;

        println!();
        println!(
            "{} ({} requests, concurrency: {})",
            "## RESULTS".bold(),
            self.total_requests.bold(),
            self.concurrency.bold()
        );
        println!(
            "{} {}/{}",
            "SUCCEEDED:".bold().green(),
            tally.succeeded.bold(),
            self.total_requests
        );
        print!(
            "{} {}/{}",
            "FAILED:".bold().red(),
            tally.failed().bold(),
            self.total_requests
        );
        if tally.failed() > 0 {
            print!(
                " (rate limited: {}, bad status: {}, transport: {})",
                tally.rate_limited, tally.bad_status, tally.transport_errors
            );
        }
        println!();
        println!("  anomalies sent: {}", tally.anomalies.bold());
        println!("  elapsed: {:.2?}", self.elapsed.bold());
        println!(
            "  {:.1} requests/s; {:.0} requests/min; {:.1} accepted/s",
            self.rps().bold(),
            self.rpm(),
            self.accepted_rps().bold()
        );
        if tally.latency.count() > 0 {
            print_percentiles(&tally.latency, Duration::from_secs_f64);
        }

        println!();
        if self.passed() {
            println!(
                "{}",
                format!("PASSED: reached {:.0}+ accepted requests/s", self.target_rps)
                    .bold()
                    .green()
            );
        } else {
            println!(
                "{}",
                format!(
                    "FAILED: {:.1} accepted requests/s (target {:.0})",
                    self.accepted_rps(),
                    self.target_rps
                )
                .bold()
                .yellow()
            );
        }
    }
}

/// Dispatches `options.total_requests` samples against the remote, with at most
/// `options.concurrency` requests in flight, and waits for all of them to complete.
///
/// Individual request failures are counted and never abort the run.
pub async fn run(
    remote: HttpRemote,
    mut generator: SampleGenerator,
    options: BulkOptions,
) -> Result<BulkReport> {
    anyhow::ensure!(options.concurrency > 0, "concurrency must be at least 1");

    let BulkOptions {
        total_requests,
        concurrency,
        target_rps,
    } = options;

    tracing::info!(
        url = remote.url(),
        total_requests,
        concurrency,
        "starting bulk run"
    );

    let bar = ProgressBar::new(total_requests)
        .with_message("Sending samples...")
        .with_style(ProgressStyle::with_template(
            "{msg}\n{wide_bar} {pos}/{len}",
        )?);
    bar.enable_steady_tick(Duration::from_millis(100));

    let remote = Arc::new(remote);
    let tally = Arc::new(Mutex::new(Tally::default()));

    let start = Instant::now();
    futures::stream::iter(generator.samples(total_requests))
        .for_each_concurrent(concurrency, |sample| {
            let remote = Arc::clone(&remote);
            let tally = Arc::clone(&tally);
            let bar = &bar;
            async move {
                let start = Instant::now();
                let result = remote.send(&sample).await;
                if let Err(ref err) = result {
                    tracing::debug!(device_id = %sample.device_id, "sample not accepted: {err}");
                }

                let mut tally = tally.lock().unwrap_or_else(|e| e.into_inner());
                tally.record(&result, sample.anomaly, start.elapsed());
                drop(tally);

                bar.inc(1);
            }
        })
        .await;
    let elapsed = start.elapsed();

    bar.finish_and_clear();

    let tally = std::mem::take(&mut *tally.lock().unwrap_or_else(|e| e.into_inner()));
    tracing::info!(
        succeeded = tally.succeeded,
        failed = tally.failed(),
        ?elapsed,
        "bulk run finished"
    );

    Ok(BulkReport {
        total_requests,
        concurrency,
        elapsed,
        target_rps,
        tally,
    })
}

fn print_percentiles<T: fmt::Debug>(sketch: &DDSketch, map: impl Fn(f64) -> T) {
    let ops = sketch.count();
    let quantile = |q| sketch.quantile(q).ok().flatten().unwrap_or_default();
    let avg = map(sketch.sum().unwrap_or_default() / ops as f64);
    let p50 = map(quantile(0.5));
    let p90 = map(quantile(0.9));
    let p99 = map(quantile(0.99));
    println!(
        "  latency avg: {:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}",
        avg.bold()
    );
}
