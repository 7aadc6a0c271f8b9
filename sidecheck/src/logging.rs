//! Tracing setup for the sidecheck binary.
//!
//! What the library traces:
//! - `info`: an extension class skipped because its marker names the other
//!   side (needs `RUST_LOG=sidecheck=info`).
//! - `warn`: conflicting markers on one class, missing or failing classpath
//!   entries.
//! - `error`: a class that was found but could not be read or parsed.
//!
//! Classes that are simply absent are never traced. Embedders of the
//! library install their own subscriber instead of calling [`init`].

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "warn";

/// Install a compact stderr subscriber filtered by `RUST_LOG`.
///
/// Stdout stays reserved for command output (`--json` reports, filtered
/// lists).
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}
