//! The `metricgen` binary, see [`metricgen::cli`] for the available commands.

fn main() -> anyhow::Result<()> {
    metricgen::cli::execute()
}
