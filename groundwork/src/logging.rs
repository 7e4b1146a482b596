//! Diagnostic tracing for the generator.
//!
//! Tracing goes to stderr and is controlled by `RUST_LOG`. The completion
//! summary and abort report printed by the CLI are separate and always shown.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG` env var. Defaults to `warn` if unset, or `info` with
/// `verbose` (step progress and command lines).
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=groundwork=debug groundwork new shop
/// ```
pub fn init(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
