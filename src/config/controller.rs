//! # Controller Configuration
//!
//! Namespaces, resource names and timing shared by both controllers.

use super::{env_var_or_default, parse_kubernetes_duration};
use crate::constants::*;
use std::time::Duration;
use tracing::warn;

/// Controller configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace holding the next signing key secret
    pub operator_namespace: String,
    /// Namespace of the API server static pods (operand secret and trust stores)
    pub target_namespace: String,
    /// Name of the cluster-scoped KubeAPIServer resource
    pub kube_apiserver_name: String,
    /// Operator Deployment that events are attached to
    pub operator_deployment: String,
    /// Event reporter instance
    pub pod_name: String,
    /// Timed resync interval
    pub resync_interval: Duration,
    /// How long a superseded issuer keeps being accepted
    pub issuer_trust_duration: Duration,
    /// Maximum number of service account issuer status entries
    pub max_service_account_issuers: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            operator_namespace: DEFAULT_OPERATOR_NAMESPACE.to_string(),
            target_namespace: DEFAULT_TARGET_NAMESPACE.to_string(),
            kube_apiserver_name: DEFAULT_KUBE_APISERVER_NAME.to_string(),
            operator_deployment: DEFAULT_OPERATOR_DEPLOYMENT.to_string(),
            pod_name: CONTROLLER_NAME.to_string(),
            resync_interval: Duration::from_secs(300),
            issuer_trust_duration: Duration::from_secs(24 * 3600),
            max_service_account_issuers: DEFAULT_MAX_SERVICE_ACCOUNT_ISSUERS,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            operator_namespace: env_var_or_default(
                "OPERATOR_NAMESPACE",
                DEFAULT_OPERATOR_NAMESPACE.to_string(),
            ),
            target_namespace: env_var_or_default(
                "TARGET_NAMESPACE",
                DEFAULT_TARGET_NAMESPACE.to_string(),
            ),
            kube_apiserver_name: env_var_or_default(
                "KUBE_APISERVER_NAME",
                DEFAULT_KUBE_APISERVER_NAME.to_string(),
            ),
            operator_deployment: env_var_or_default(
                "OPERATOR_DEPLOYMENT",
                DEFAULT_OPERATOR_DEPLOYMENT.to_string(),
            ),
            pod_name: env_var_or_default("POD_NAME", CONTROLLER_NAME.to_string()),
            resync_interval: duration_var_or_default("RESYNC_INTERVAL", DEFAULT_RESYNC_INTERVAL),
            issuer_trust_duration: duration_var_or_default(
                "ISSUER_TRUST_DURATION",
                DEFAULT_ISSUER_TRUST_DURATION,
            ),
            max_service_account_issuers: clamp_max_issuers(env_var_or_default(
                "MAX_SERVICE_ACCOUNT_ISSUERS",
                DEFAULT_MAX_SERVICE_ACCOUNT_ISSUERS,
            )),
        }
    }

    /// Issuer limit actually enforced, never above
    /// [`DEFAULT_MAX_SERVICE_ACCOUNT_ISSUERS`] and never zero
    pub fn issuer_limit(&self) -> usize {
        self.max_service_account_issuers
            .clamp(1, DEFAULT_MAX_SERVICE_ACCOUNT_ISSUERS)
    }

    /// Issuer trust window as a chrono duration for timestamp arithmetic
    pub fn issuer_trust_window(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.issuer_trust_duration)
            .unwrap_or_else(|_| chrono::Duration::hours(24))
    }
}

/// Keep a configured issuer limit within `1..=DEFAULT_MAX_SERVICE_ACCOUNT_ISSUERS`
fn clamp_max_issuers(value: usize) -> usize {
    let clamped = value.clamp(1, DEFAULT_MAX_SERVICE_ACCOUNT_ISSUERS);
    if clamped != value {
        warn!(
            "MAX_SERVICE_ACCOUNT_ISSUERS={} is outside 1..={}, using {}",
            value, DEFAULT_MAX_SERVICE_ACCOUNT_ISSUERS, clamped
        );
    }
    clamped
}

/// Read a duration variable, falling back to `default` when unset or invalid
fn duration_var_or_default(key: &str, default: &str) -> Duration {
    let raw = std::env::var(key).unwrap_or_else(|_| default.to_string());
    match parse_kubernetes_duration(&raw) {
        Ok(duration) => duration,
        Err(e) => {
            warn!("Ignoring invalid {}={:?}: {}, using {}", key, raw, e, default);
            parse_kubernetes_duration(default).unwrap_or(Duration::from_secs(300))
        }
    }
}
