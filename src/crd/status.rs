//! # KubeAPIServer Status
//!
//! Status types: static pod node revisions and accepted service account issuers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of the KubeAPIServer resource
///
/// Only the fields this controller reads or writes are modelled; other
/// writers' fields are preserved because status updates are merge patches.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubeAPIServerStatus {
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Latest static pod revision that has been rendered
    #[serde(default)]
    pub latest_available_revision: Option<i32>,
    /// Per-node static pod rollout state
    #[serde(default)]
    pub node_statuses: Vec<NodeStatus>,
    /// Accepted service account token issuers
    /// The entry without an expiration is the active issuer; entries with an
    /// expiration are still trusted for verification until that time
    #[serde(default)]
    pub service_account_issuers: Vec<ServiceAccountIssuerStatus>,
}

/// Static pod state of one control plane node
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    /// Node name
    pub node_name: String,
    /// Revision the node is currently running
    #[serde(default)]
    pub current_revision: i32,
    /// Revision the node is being moved to, if a rollout is in progress
    #[serde(default)]
    pub target_revision: Option<i32>,
}

/// One accepted service account issuer
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccountIssuerStatus {
    /// Issuer identifier as it appears in the `iss` claim
    pub name: String,
    /// When the issuer stops being trusted; absent for the active issuer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<DateTime<Utc>>,
}

impl ServiceAccountIssuerStatus {
    /// Active issuer entry (no expiration)
    pub fn active(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expiration_time: None,
        }
    }

    /// Trusted issuer entry expiring at `expiration_time`
    pub fn trusted(name: impl Into<String>, expiration_time: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            expiration_time: Some(expiration_time),
        }
    }

    pub fn is_active(&self) -> bool {
        self.expiration_time.is_none()
    }
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last transition time
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default)]
    pub message: Option<String>,
}
