//! Diagnostics for the stagehand binary.
//!
//! Tracing output goes to stderr and is filtered by `RUST_LOG`. Iteration logs under
//! `.stagehand/items/<id>/iterations/` are product output and are written regardless.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "warn,stagehand=info";

/// Install the global subscriber. Defaults to `info` for stagehand and `warn` elsewhere.
///
/// ```bash
/// RUST_LOG=stagehand=debug stagehand next 001-add-dark-mode
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
