//! Tracing setup for the `loopai` binary.
//!
//! Library code only emits events; the binary decides where they go. Task
//! summaries go to stdout, diagnostics go to stderr.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the stderr subscriber.
///
/// `RUST_LOG` wins when set. Otherwise `loopai=info`, or `loopai=debug` when
/// `verbose` is true.
///
/// # Example
/// ```bash
/// RUST_LOG=loopai=trace loopai run tasks.json
/// ```
pub fn init(verbose: bool) {
    let fallback = if verbose { "loopai=debug" } else { "loopai=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
