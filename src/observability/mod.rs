//! # Observability
//!
//! Prometheus metrics and log initialisation for the controller.

pub mod metrics;

pub use metrics::Metrics;

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence over `default_filter`. Calling this twice is
/// harmless; the second call only logs that a subscriber already exists.
pub fn init_tracing(default_filter: &str) {
    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .try_init()
    {
        tracing::warn!("Tracing subscriber init returned error (may already be initialized): {}", e);
    }
}
