use tracing_subscriber::EnvFilter;

/// Default filter for tests: errors everywhere, everything from the generator crates.
const DEFAULT_FILTER: &str = "ERROR,metricgen=TRACE,metricgen_test=TRACE";

/// Initialize the logger for testing.
///
/// Logs go to the output captured by the Rust test runner, so they only show up for failing
/// tests. `RUST_LOG` replaces the default filter, e.g. `RUST_LOG=metricgen::bulk=debug` to follow
/// the dispatcher alone. Calling this more than once is a no-op.
///
/// # Example
///
/// ```
/// metricgen_test::tracing::init();
/// metricgen_test::tracing::init();
/// ```
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_test_writer()
        .without_time()
        .compact()
        .try_init()
        .ok();
}
