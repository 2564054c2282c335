//! # Controller Configuration
//!
//! Configuration loaded from environment variables.
//!
//! All configuration has sensible defaults and can be overridden via
//! environment variables set on the operator Deployment.

mod controller;
mod duration;
mod server;

pub use controller::ControllerConfig;
pub use duration::parse_kubernetes_duration;
pub use server::ServerConfig;

/// Load configuration from environment variables with defaults
pub fn load_config() -> (ControllerConfig, ServerConfig) {
    (ControllerConfig::from_env(), ServerConfig::from_env())
}

/// Read environment variable or return default value
///
/// Unparseable values are ignored with a warning.
pub(crate) fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => match value.trim().parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Ignoring invalid {}={:?}: {}", key, value, e);
                default
            }
        },
        Err(_) => default,
    }
}
