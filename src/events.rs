//! # Events
//!
//! Operator-facing audit trail. Both controllers report rotation progress as
//! Kubernetes events attached to the operator Deployment.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Event reason codes
pub mod reason {
    pub const SIGNING_KEY_REGENERATED: &str = "SigningKeyRegenerated";
    pub const TRUST_STORE_KEY_ADDED: &str = "TrustStoreKeyAdded";
    pub const SIGNING_KEY_PROMOTED: &str = "SigningKeyPromoted";
    pub const SIGNING_KEY_PROMOTION_PENDING: &str = "SigningKeyPromotionPending";
    pub const SIGNING_KEY_PROMOTION_BLOCKED: &str = "SigningKeyPromotionBlocked";
    pub const ISSUER_ACTIVATED: &str = "ServiceAccountIssuerActivated";
    pub const ISSUERS_CLEARED: &str = "ServiceAccountIssuersCleared";
    pub const ISSUER_EXPIRED: &str = "ServiceAccountIssuerExpired";
    pub const ISSUER_LIMIT_REACHED: &str = "ServiceAccountIssuerLimitReached";
}

/// Severity of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Normal,
    Warning,
}

/// Sink for controller events
///
/// Publishing is best effort: a failure is logged and never fails a sync.
#[async_trait]
pub trait EventRecorder: Send + Sync {
    async fn record(&self, severity: Severity, reason: &'static str, action: &'static str, note: String);

    async fn normal(&self, reason: &'static str, action: &'static str, note: String) {
        self.record(Severity::Normal, reason, action, note).await;
    }

    async fn warning(&self, reason: &'static str, action: &'static str, note: String) {
        self.record(Severity::Warning, reason, action, note).await;
    }
}

/// Publishes `events.k8s.io/v1` events through the kube runtime recorder
pub struct KubeEventRecorder {
    recorder: Recorder,
    regarding: ObjectReference,
}

impl std::fmt::Debug for KubeEventRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeEventRecorder")
            .field("regarding", &self.regarding)
            .finish_non_exhaustive()
    }
}

impl KubeEventRecorder {
    /// Recorder attaching events to the operator Deployment `namespace/deployment`
    pub fn new(client: Client, controller: &str, instance: &str, namespace: &str, deployment: &str) -> Self {
        let reporter = Reporter {
            controller: controller.to_string(),
            instance: Some(instance.to_string()),
        };
        let regarding = ObjectReference {
            api_version: Some("apps/v1".to_string()),
            kind: Some("Deployment".to_string()),
            name: Some(deployment.to_string()),
            namespace: Some(namespace.to_string()),
            ..ObjectReference::default()
        };
        Self {
            recorder: Recorder::new(client, reporter),
            regarding,
        }
    }
}

#[async_trait]
impl EventRecorder for KubeEventRecorder {
    async fn record(&self, severity: Severity, reason: &'static str, action: &'static str, note: String) {
        let event = Event {
            type_: match severity {
                Severity::Normal => EventType::Normal,
                Severity::Warning => EventType::Warning,
            },
            reason: reason.to_string(),
            note: Some(note),
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, &self.regarding).await {
            warn!(reason, error = %e, "failed to publish event");
        }
    }
}
