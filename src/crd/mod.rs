//! # Custom Resource Definitions
//!
//! CRD types for the Bound Token Trust Controller.
//!
//! The controller does not own the `KubeAPIServer` resource. It reads the
//! desired service account issuer from its spec and the static pod node
//! statuses from its status, and writes only `status.serviceAccountIssuers`.

mod status;

pub use status::*;

use serde::{Deserialize, Serialize};

/// KubeAPIServer Custom Resource Definition
///
/// Cluster-scoped singleton (conventionally named `cluster`) describing the
/// API server operand.
///
/// # Example
///
/// ```yaml
/// apiVersion: operator.openshift.io/v1
/// kind: KubeAPIServer
/// metadata:
///   name: cluster
/// spec:
///   serviceAccountIssuer: https://issuer.example.com
/// status:
///   nodeStatuses:
///     - nodeName: master-0
///       currentRevision: 7
///   serviceAccountIssuers:
///     - name: https://issuer.example.com
///     - name: https://kubernetes.default.svc
///       expirationTime: "2026-10-18T12:00:00Z"
/// ```
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "KubeAPIServer",
    group = "operator.openshift.io",
    version = "v1",
    status = "KubeAPIServerStatus",
    shortname = "kas",
    printcolumn = r#"{"name":"Issuer", "type":"string", "jsonPath":".spec.serviceAccountIssuer"}, {"name":"Active", "type":"string", "jsonPath":".status.serviceAccountIssuers[0].name"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KubeAPIServerSpec {
    /// Desired service account token issuer
    /// Owned by the authentication configuration; empty means "use the default issuer"
    #[serde(default)]
    pub service_account_issuer: String,
}

impl KubeAPIServer {
    /// Configured issuer, empty when unset
    pub fn configured_issuer(&self) -> &str {
        self.spec.service_account_issuer.trim()
    }

    /// Current issuer status entries, empty when no status has been written
    pub fn service_account_issuers(&self) -> &[ServiceAccountIssuerStatus] {
        self.status
            .as_ref()
            .map(|s| s.service_account_issuers.as_slice())
            .unwrap_or_default()
    }

    /// Static pod node statuses, empty when no status has been written
    pub fn node_statuses(&self) -> &[NodeStatus] {
        self.status
            .as_ref()
            .map(|s| s.node_statuses.as_slice())
            .unwrap_or_default()
    }
}
