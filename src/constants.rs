//! # Constants
//!
//! Default values for configuration that can be overridden via environment variables.

/// Namespace the operator itself runs in
pub const DEFAULT_OPERATOR_NAMESPACE: &str = "openshift-kube-apiserver-operator";

/// Namespace the API server static pods run in
pub const DEFAULT_TARGET_NAMESPACE: &str = "openshift-kube-apiserver";

/// Name of the cluster-scoped KubeAPIServer resource
pub const DEFAULT_KUBE_APISERVER_NAME: &str = "cluster";

/// Name of the Deployment events are attached to
pub const DEFAULT_OPERATOR_DEPLOYMENT: &str = "kube-apiserver-operator";

/// Field manager / event reporter name
pub const CONTROLLER_NAME: &str = "bound-token-trust-controller";

/// Timed resync interval for both controllers
pub const DEFAULT_RESYNC_INTERVAL: &str = "5m";

/// How long a superseded issuer keeps being accepted
pub const DEFAULT_ISSUER_TRUST_DURATION: &str = "24h";

/// Upper bound on tracked service account issuers (active + trusted)
pub const DEFAULT_MAX_SERVICE_ACCOUNT_ISSUERS: usize = 10;

/// RSA modulus size for generated signing keys
pub const SIGNING_KEY_BITS: usize = 2048;

/// Default port for the metrics and probe server
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Server startup timeout (seconds)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Server readiness poll interval (milliseconds)
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Error backoff bounds (seconds)
pub const DEFAULT_ERROR_BACKOFF_MIN_SECS: u64 = 1;
pub const DEFAULT_ERROR_BACKOFF_MAX_SECS: u64 = 300;

/// Consecutive synthetic requeues allowed before falling back to the resync timer
pub const MAX_CONSECUTIVE_REQUEUES: u32 = 20;
