//! Shared plumbing for the driver binaries.

#![warn(missing_docs)]

use tracing_subscriber::EnvFilter;

/// Install the stderr tracing subscriber, filtered by `RUST_LOG`.
///
/// Improvement events go to stdout through the drivers; everything here
/// is diagnostics only.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}

/// Run a driver entry point, reporting failure as the one-line
/// diagnostic the tools promise.
pub fn run_driver(name: &str, run: impl FnOnce() -> anyhow::Result<()>) {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("{name}: {err:#}");
        std::process::exit(1);
    }
}

/// Parse a `MIN:MAX` op-count range.
pub fn parse_range(s: &str) -> anyhow::Result<(usize, usize)> {
    let (min, max) = s
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("invalid range (expected MIN:MAX): {s}"))?;
    let min: usize = min.parse()?;
    let max: usize = max.parse()?;
    if min < 1 || max > 32 || min > max {
        anyhow::bail!("invalid range (1 <= MIN <= MAX <= 32): {s}");
    }
    Ok((min, max))
}
