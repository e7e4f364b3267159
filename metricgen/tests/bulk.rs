//! Blackbox tests for the bulk generator against an in-process stub endpoint.

use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::Result;
use metricgen::bulk::{self, BulkOptions};
use metricgen::sample::{AnomalyRule, ValueRanges};
use metricgen::{HttpRemote, SampleGenerator};
use metricgen_test::server::{StubServer, refused_url};

fn generator(anomaly_rate: f64) -> SampleGenerator {
    SampleGenerator::builder("load-test-")
        .seed(4711)
        .rule(AnomalyRule::Probability(anomaly_rate))
        .build()
        .unwrap()
}

fn options(total_requests: u64, concurrency: usize) -> BulkOptions {
    BulkOptions {
        total_requests,
        concurrency,
        target_rps: 1000.0,
    }
}

#[tokio::test]
async fn test_all_accepted() -> Result<()> {
    metricgen_test::tracing::init();

    for (total, concurrency) in [(1, 1), (50, 1), (100, 7), (200, 64), (30, 100)] {
        let server = StubServer::new(202).await;
        let remote = HttpRemote::new(server.url("/metric"), Duration::from_secs(2))?;

        let report = bulk::run(remote, generator(0.1), options(total, concurrency)).await?;

        assert_eq!(report.tally.succeeded, total, "N={total} W={concurrency}");
        assert_eq!(report.tally.failed(), 0);
        assert_eq!(server.hits(), total);

        let device_ids: BTreeSet<_> = server.received().into_iter().map(|s| s.device_id).collect();
        let expected: BTreeSet<_> = (1..=total).map(|id| format!("load-test-{id}")).collect();
        assert_eq!(device_ids, expected);
    }

    Ok(())
}

#[tokio::test]
async fn test_all_rejected() -> Result<()> {
    metricgen_test::tracing::init();

    let server = StubServer::new(500).await;
    let remote = HttpRemote::new(server.url("/metric"), Duration::from_secs(2))?;

    let report = bulk::run(remote, generator(0.1), options(120, 16)).await?;

    assert_eq!(report.tally.succeeded, 0);
    assert_eq!(report.tally.failed(), 120);
    assert_eq!(report.tally.bad_status, 120);
    assert_eq!(server.hits(), 120);
    assert_eq!(report.accepted_rps(), 0.0);
    assert!(!report.passed());

    Ok(())
}

#[tokio::test]
async fn test_rate_limited_counted_separately() -> Result<()> {
    let server = StubServer::new(429).await;
    let remote = HttpRemote::new(server.url("/metric"), Duration::from_secs(2))?;

    let report = bulk::run(remote, generator(0.1), options(40, 8)).await?;

    assert_eq!(report.tally.rate_limited, 40);
    assert_eq!(report.tally.bad_status, 0);
    assert_eq!(report.tally.failed(), 40);

    Ok(())
}

#[tokio::test]
async fn test_other_success_codes_fail() -> Result<()> {
    let server = StubServer::new(200).await;
    let remote = HttpRemote::new(server.url("/metric"), Duration::from_secs(2))?;

    let report = bulk::run(remote, generator(0.1), options(10, 2)).await?;

    assert_eq!(report.tally.succeeded, 0);
    assert_eq!(report.tally.bad_status, 10);

    Ok(())
}

#[tokio::test]
async fn test_connection_refused() -> Result<()> {
    let remote = HttpRemote::new(refused_url(), Duration::from_secs(2))?;

    let report = bulk::run(remote, generator(0.1), options(25, 5)).await?;

    assert_eq!(report.tally.transport_errors, 25);
    assert_eq!(report.tally.completed(), 25);
    // Refused connections fail fast, which must not count as throughput.
    assert!(!report.passed());

    Ok(())
}

#[tokio::test]
async fn test_timeouts_are_failures() -> Result<()> {
    let server = StubServer::with_delay(202, Duration::from_millis(500)).await;
    let remote = HttpRemote::new(server.url("/metric"), Duration::from_millis(50))?;

    let report = bulk::run(remote, generator(0.1), options(10, 10)).await?;

    assert_eq!(report.tally.succeeded, 0);
    assert_eq!(report.tally.transport_errors, 10);

    Ok(())
}

#[tokio::test]
async fn test_anomalies_match_values_sent() -> Result<()> {
    let server = StubServer::new(202).await;
    let remote = HttpRemote::new(server.url("/metric"), Duration::from_secs(2))?;

    let report = bulk::run(remote, generator(0.1), options(2000, 50)).await?;

    let ranges = ValueRanges::default();
    let received = server.received();
    let anomalous = received
        .iter()
        .filter(|s| ranges.anomaly.contains(s.value))
        .count() as u64;
    let normal = received
        .iter()
        .filter(|s| ranges.normal.contains(s.value))
        .count() as u64;

    assert_eq!(anomalous, report.tally.anomalies);
    assert_eq!(anomalous + normal, 2000);
    let rate = anomalous as f64 / 2000.0;
    assert!((0.06..=0.14).contains(&rate), "observed rate {rate}");

    Ok(())
}

#[tokio::test]
async fn test_empty_run() -> Result<()> {
    let server = StubServer::new(202).await;
    let remote = HttpRemote::new(server.url("/metric"), Duration::from_secs(2))?;

    let report = bulk::run(remote, generator(0.1), options(0, 4)).await?;

    assert_eq!(report.tally.completed(), 0);
    assert_eq!(report.rps(), 0.0);
    assert!(!report.passed());
    assert_eq!(server.hits(), 0);

    Ok(())
}

#[tokio::test]
async fn test_zero_concurrency_rejected() -> Result<()> {
    let server = StubServer::new(202).await;
    let remote = HttpRemote::new(server.url("/metric"), Duration::from_secs(2))?;

    let result = bulk::run(remote, generator(0.1), options(10, 0)).await;

    assert!(result.is_err());
    assert_eq!(server.hits(), 0);

    Ok(())
}
