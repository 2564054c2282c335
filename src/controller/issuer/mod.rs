//! # Issuer Trust Controller
//!
//! Keeps `status.serviceAccountIssuers` of the KubeAPIServer resource in line
//! with the configured issuer. The configured issuer becomes the active entry;
//! the issuer it replaces stays trusted for a fixed window so tokens it signed
//! keep verifying, and is pruned once that window has passed.
//!
//! | Case            | Condition                              | Outcome             |
//! |-----------------|----------------------------------------|---------------------|
//! | Quiescent-empty | nothing configured, status empty       | `Done`              |
//! | Seed            | issuer configured, status empty        | `Requeue`           |
//! | Clear           | nothing configured, status non-empty   | `Requeue`           |
//! | Self-heal       | no active entry                        | `Requeue`           |
//! | Steady          | configured is active                   | `Requeue` if pruned |
//! | Rotate          | configured differs from active         | `Requeue`           |

mod status;

pub use status::{active_issuer, count_by_state, make_active_issuer_trusted, prune_expired_issuers};

use crate::client::ResourceClient;
use crate::config::ControllerConfig;
use crate::controller::{Clock, SyncOutcome, Syncer};
use crate::crd::{KubeAPIServer, ServiceAccountIssuerStatus};
use crate::error::{Error, Result};
use crate::events::{reason, EventRecorder};
use crate::observability::Metrics;
use async_trait::async_trait;
use chrono::SubsecRound;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

/// Issuer trust controller
pub struct IssuerTrustController {
    client: Arc<dyn ResourceClient>,
    events: Arc<dyn EventRecorder>,
    metrics: Arc<Metrics>,
    clock: Arc<dyn Clock>,
    kube_apiserver_name: String,
    trust_duration: chrono::Duration,
    max_issuers: usize,
}

impl std::fmt::Debug for IssuerTrustController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuerTrustController")
            .field("kube_apiserver_name", &self.kube_apiserver_name)
            .field("trust_duration", &self.trust_duration)
            .field("max_issuers", &self.max_issuers)
            .finish_non_exhaustive()
    }
}

impl IssuerTrustController {
    pub fn new(
        client: Arc<dyn ResourceClient>,
        events: Arc<dyn EventRecorder>,
        metrics: Arc<Metrics>,
        clock: Arc<dyn Clock>,
        config: &ControllerConfig,
    ) -> Self {
        Self {
            client,
            events,
            metrics,
            clock,
            kube_apiserver_name: config.kube_apiserver_name.clone(),
            trust_duration: config.issuer_trust_window(),
            max_issuers: config.issuer_limit(),
        }
    }

    /// Reconcile the issuer status once
    pub async fn sync(&self) -> Result<SyncOutcome> {
        let kas = self
            .client
            .get_kube_apiserver(&self.kube_apiserver_name)
            .await?;
        let configured = kas.configured_issuer();
        let issuers = kas.service_account_issuers();
        self.record_gauge(issuers);

        if configured.is_empty() && issuers.is_empty() {
            debug!("No service account issuer configured");
            return Ok(SyncOutcome::Done);
        }

        if issuers.is_empty() {
            info!(issuer = configured, "Seeding service account issuer status");
            self.write(&kas, &[ServiceAccountIssuerStatus::active(configured)])
                .await?;
            self.events
                .normal(
                    reason::ISSUER_ACTIVATED,
                    "Activate",
                    format!("Service account issuer {configured} is now active"),
                )
                .await;
            return Ok(SyncOutcome::Requeue);
        }

        if configured.is_empty() {
            info!(count = issuers.len(), "Clearing service account issuer status");
            self.write(&kas, &[]).await?;
            self.events
                .normal(
                    reason::ISSUERS_CLEARED,
                    "Clear",
                    "Service account issuer unset, cleared all accepted issuers".to_string(),
                )
                .await;
            return Ok(SyncOutcome::Requeue);
        }

        let now = self.clock.now();
        // Status timestamps are second precision, like metav1.Time.
        let expiration = (now + self.trust_duration).trunc_subsecs(0);

        let Some(active) = active_issuer(issuers) else {
            warn!(issuer = configured, "No active service account issuer in status, re-seeding");
            let next = self.transition(issuers, configured, configured, expiration).await?;
            self.write(&kas, &next).await?;
            self.events
                .normal(
                    reason::ISSUER_ACTIVATED,
                    "Activate",
                    format!("Service account issuer {configured} is now active"),
                )
                .await;
            return Ok(SyncOutcome::Requeue);
        };

        if active.name == configured {
            let (kept, removed) = prune_expired_issuers(issuers, now);
            if removed.is_empty() {
                debug!(issuer = configured, "Service account issuers up to date");
                return Ok(SyncOutcome::Done);
            }
            self.write(&kas, &kept).await?;
            for name in removed {
                info!(issuer = %name, "Pruned expired service account issuer");
                self.events
                    .normal(
                        reason::ISSUER_EXPIRED,
                        "Prune",
                        format!("Service account issuer {name} expired and is no longer trusted"),
                    )
                    .await;
            }
            return Ok(SyncOutcome::Requeue);
        }

        let old_active = active.name.as_str();
        let next = self
            .transition(issuers, old_active, configured, expiration)
            .await?;
        self.write(&kas, &next).await?;
        info!(
            issuer = configured,
            previous = old_active,
            %expiration,
            "Rotated service account issuer"
        );
        self.events
            .normal(
                reason::ISSUER_ACTIVATED,
                "Activate",
                format!(
                    "Service account issuer {configured} is now active, {old_active} stays trusted until {}",
                    expiration.to_rfc3339()
                ),
            )
            .await;
        Ok(SyncOutcome::Requeue)
    }

    async fn transition(
        &self,
        issuers: &[ServiceAccountIssuerStatus],
        old_active: &str,
        new_active: &str,
        expiration: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<ServiceAccountIssuerStatus>> {
        match make_active_issuer_trusted(issuers, old_active, new_active, expiration, self.max_issuers)
        {
            Ok(next) => Ok(next),
            Err(e @ Error::TooManyIssuers { .. }) => {
                warn!(issuer = new_active, error = %e, "Service account issuer limit reached");
                self.events
                    .warning(reason::ISSUER_LIMIT_REACHED, "Activate", e.to_string())
                    .await;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn write(&self, kas: &KubeAPIServer, issuers: &[ServiceAccountIssuerStatus]) -> Result<()> {
        self.client
            .update_service_account_issuers(kas, issuers)
            .await?;
        self.record_gauge(issuers);
        Ok(())
    }

    fn record_gauge(&self, issuers: &[ServiceAccountIssuerStatus]) {
        let (active, trusted) = count_by_state(issuers);
        self.metrics.set_service_account_issuers(active, trusted);
    }
}

#[async_trait]
impl Syncer for IssuerTrustController {
    fn name(&self) -> &'static str {
        "issuer-trust"
    }

    async fn sync(&self) -> Result<SyncOutcome> {
        let span = tracing::info_span!("controller.sync", controller = self.name());
        IssuerTrustController::sync(self).instrument(span).await
    }
}
