//! Configuration for the metric generators.
//!
//! Configuration can be loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Environment variables (prefixed with `MG__`)
//! 2. YAML configuration file (specified via `-c` or `--config` flag)
//! 3. Defaults
//!
//! Environment variables use double underscores (`__`) to denote nested configuration structures,
//! for example `MG__TARGET_URL=http://metrics.local/metric` or `MG__BULK__CONCURRENCY=50`.
//!
//! The same configuration as a YAML file:
//!
//! ```yaml
//! target_url: http://metrics.local/metric
//!
//! bulk:
//!   concurrency: 50
//! ```

use std::num::NonZeroU64;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

use crate::sample::ValueRanges;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "MG__";

const DEFAULT_ANOMALY_EVERY: NonZeroU64 = NonZeroU64::new(10).unwrap();

/// Settings of the bulk load generator.
///
/// Used in: [`Config::bulk`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Bulk {
    /// Number of requests to dispatch. Defaults to `1000`.
    pub total_requests: u64,
    /// Maximum number of requests in flight. Must be at least `1`. Defaults to `300`.
    pub concurrency: usize,
    /// Probability in `[0, 1]` that a sample is an anomaly. Defaults to `0.1`.
    pub anomaly_rate: f64,
    /// Per-request timeout. Defaults to `2s`.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Throughput in requests per second required to pass. Defaults to `1000`.
    pub target_rps: f64,
    /// Prefix of generated device IDs. Defaults to `load-test-`.
    pub device_prefix: String,
}

impl Default for Bulk {
    fn default() -> Self {
        Self {
            total_requests: 1000,
            concurrency: 300,
            anomaly_rate: 0.1,
            timeout: Duration::from_secs(2),
            target_rps: 1000.0,
            device_prefix: "load-test-".into(),
        }
    }
}

/// Settings of the continuous trickle generator.
///
/// Used in: [`Config::trickle`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Trickle {
    /// Pause between two requests. Defaults to `100ms`.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Every n-th sample is an anomaly. Defaults to `10`.
    pub anomaly_every: NonZeroU64,
    /// Per-request timeout. Defaults to `5s`.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Prefix of generated device IDs. Defaults to `sensor_`.
    pub device_prefix: String,
    /// Stop after this many iterations instead of running until interrupted.
    pub limit: Option<u64>,
}

impl Default for Trickle {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            anomaly_every: DEFAULT_ANOMALY_EVERY,
            timeout: Duration::from_secs(5),
            device_prefix: "sensor_".into(),
            limit: None,
        }
    }
}

/// Runtime configuration for the Tokio async runtime.
///
/// Used in: [`Config::runtime`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Runtime {
    /// Number of worker threads for the runtime.
    ///
    /// Defaults to the number of available CPU cores.
    pub worker_threads: usize,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            worker_threads: std::thread::available_parallelism().map_or(1, |n| n.get()),
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,
    /// Compact output with colors.
    Pretty,
    /// Plain text output without colors.
    Simplified,
    /// JSON lines.
    Json,
}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging configuration.
///
/// Used in: [`Config::logging`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Minimum log level to output. Defaults to `INFO`.
    ///
    /// The `RUST_LOG` environment variable takes precedence if set.
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format. Defaults to `auto`.
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Main configuration struct for the metric generators.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// URL of the ingestion endpoint samples are posted to.
    ///
    /// Defaults to `http://localhost:9898/metric`.
    pub target_url: String,

    /// Value ranges shared by both generators.
    pub values: ValueRanges,

    /// Bulk generator settings.
    pub bulk: Bulk,

    /// Trickle generator settings.
    pub trickle: Trickle,

    /// Tokio runtime settings.
    pub runtime: Runtime,

    /// Logging settings.
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_url: "http://localhost:9898/metric".into(),
            values: ValueRanges::default(),
            bulk: Bulk::default(),
            trickle: Trickle::default(),
            runtime: Runtime::default(),
            logging: Logging::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the provided arguments.
    ///
    /// Configuration is merged in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. YAML configuration file (if provided)
    /// 3. Environment variables (prefixed with `MG__`)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::sample::ValueRange;

    #[test]
    fn defaults_match_builtin_constants() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load(None).unwrap();

            assert_eq!(config.target_url, "http://localhost:9898/metric");
            assert_eq!(config.bulk.total_requests, 1000);
            assert_eq!(config.bulk.concurrency, 300);
            assert_eq!(config.bulk.anomaly_rate, 0.1);
            assert_eq!(config.bulk.timeout, Duration::from_secs(2));
            assert_eq!(config.trickle.interval, Duration::from_millis(100));
            assert_eq!(config.trickle.anomaly_every.get(), 10);
            assert_eq!(config.trickle.timeout, Duration::from_secs(5));
            assert_eq!(config.trickle.limit, None);
            assert_eq!(config.values, ValueRanges::default());
            assert_eq!(config.logging.level, LevelFilter::INFO);

            Ok(())
        });
    }

    #[test]
    fn configurable_via_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("MG__TARGET_URL", "http://metrics.local/metric");
            jail.set_env("MG__BULK__CONCURRENCY", "50");
            jail.set_env("MG__BULK__TIMEOUT", "500ms");
            jail.set_env("MG__TRICKLE__LIMIT", "25");
            jail.set_env("MG__VALUES__ANOMALY__MIN", "200");
            jail.set_env("MG__LOGGING__LEVEL", "debug");
            jail.set_env("MG__LOGGING__FORMAT", "json");

            let config = Config::load(None).unwrap();

            assert_eq!(config.target_url, "http://metrics.local/metric");
            assert_eq!(config.bulk.concurrency, 50);
            assert_eq!(config.bulk.timeout, Duration::from_millis(500));
            assert_eq!(config.bulk.total_requests, 1000);
            assert_eq!(config.trickle.limit, Some(25));
            assert_eq!(config.values.anomaly, ValueRange::new(200.0, 150.0));
            assert_eq!(config.logging.level, LevelFilter::DEBUG);
            assert_eq!(config.logging.format, LogFormat::Json);

            Ok(())
        });
    }

    #[test]
    fn configurable_via_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            target_url: http://172.27.185.72:30080/metric
            bulk:
                total_requests: 5000
                anomaly_rate: 0.25
            trickle:
                interval: 1s
                anomaly_every: 5
            values:
                normal:
                    min: 0
                    max: 10
                anomaly:
                    min: 90
                    max: 95
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|_jail| {
            let config = Config::load(Some(tempfile.path())).unwrap();

            assert_eq!(config.target_url, "http://172.27.185.72:30080/metric");
            assert_eq!(config.bulk.total_requests, 5000);
            assert_eq!(config.bulk.anomaly_rate, 0.25);
            assert_eq!(config.bulk.concurrency, 300);
            assert_eq!(config.trickle.interval, Duration::from_secs(1));
            assert_eq!(config.trickle.anomaly_every.get(), 5);
            assert_eq!(config.values.normal, ValueRange::new(0.0, 10.0));
            assert_eq!(config.values.anomaly, ValueRange::new(90.0, 95.0));

            Ok(())
        });
    }

    #[test]
    fn env_overrides_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(b"bulk:\n  concurrency: 10\n")
            .unwrap();

        figment::Jail::expect_with(|jail| {
            jail.set_env("MG__BULK__CONCURRENCY", "20");

            let config = Config::load(Some(tempfile.path())).unwrap();
            assert_eq!(config.bulk.concurrency, 20);

            Ok(())
        });
    }

    #[test]
    fn rejects_zero_anomaly_interval() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("MG__TRICKLE__ANOMALY_EVERY", "0");
            assert!(Config::load(None).is_err());
            Ok(())
        });
    }
}
