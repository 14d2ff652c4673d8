//! Logging setup.
//!
//! Installs a `tracing` subscriber that writes to **stderr**; stdout belongs
//! to the host. Filtering follows `RUST_LOG`.
//!
//! ```bash
//! # Default
//! RUST_LOG=info ./anomalo-provider
//!
//! # Every API call and reconciler step
//! RUST_LOG=anomalo_provider=debug ./anomalo-provider
//! ```
//!
//! The API token never shows up in logs: it travels only in a header marked
//! sensitive and [`crate::config::ClientSettings`] redacts it in `Debug`.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_LEVEL: &str = "info";

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn subscriber(
    default_level: &str,
) -> impl tracing::Subscriber + Send + Sync + for<'a> tracing_subscriber::registry::LookupSpan<'a> {
    tracing_subscriber::registry().with(filter(default_level)).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    )
}

/// Install the subscriber with `RUST_LOG`, defaulting to `info`.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default(DEFAULT_LEVEL);
}

/// Install the subscriber with `RUST_LOG`, defaulting to `default_level`.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    subscriber(default_level).init();
}

/// Install the subscriber unless one is already set. Returns whether this
/// call installed it.
pub fn try_init_logging() -> bool {
    subscriber(DEFAULT_LEVEL).try_init().is_ok()
}

#[cfg(test)]
mod tests {
    // The global subscriber can only be set once per process, so only the
    // non-panicking entry point is exercised here.

    use super::*;

    #[test]
    fn test_env_filter_parsing() {
        assert!(EnvFilter::try_new("info").is_ok());
        assert!(EnvFilter::try_new("anomalo_provider=debug").is_ok());
        assert!(EnvFilter::try_new("warn,anomalo_provider::check=debug").is_ok());
    }

    #[test]
    fn test_try_init_is_idempotent() {
        try_init_logging();
        assert!(!try_init_logging());
    }
}
