//! # Signing Key Rotation Controller
//!
//! Rotates the key pair used to sign bound service account tokens without
//! invalidating tokens already issued.
//!
//! A sync runs three steps in order, each re-reading the state it depends on:
//!
//! 1. **ensure operator secret**: make sure the operator namespace holds a valid
//!    key pair, generating a fresh one when it is missing or broken
//! 2. **ensure trust store entry**: append the operator public key to the trust
//!    store ConfigMap under the next free `service-account-NNN.pub` slot
//! 3. **ensure operand secret**: copy the operator pair to the API server
//!    namespace once every running revision trusts its public key
//!
//! A failing step does not stop the later ones; their errors are returned
//! together.

mod propagation;
mod slots;

pub use propagation::{distinct_revisions, snapshot_contains_key};
pub use slots::next_free_slot;

use crate::client::ResourceClient;
use crate::config::ControllerConfig;
use crate::controller::{SyncOutcome, Syncer};
use crate::crypto::{fingerprint, KeyPair, SigningKeyCrypto};
use crate::error::{Error, Result};
use crate::events::{reason, EventRecorder};
use crate::observability::Metrics;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use names::{
    revision_trust_store_name, NEXT_SIGNING_KEY_SECRET, PRIVATE_KEY_KEY, PUBLIC_KEY_KEY,
    SIGNING_KEY_SECRET, TRUST_STORE_CONFIG_MAP,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

/// Signing key rotation controller
pub struct SigningKeyController {
    client: Arc<dyn ResourceClient>,
    crypto: Arc<dyn SigningKeyCrypto>,
    events: Arc<dyn EventRecorder>,
    metrics: Arc<Metrics>,
    operator_namespace: String,
    target_namespace: String,
    kube_apiserver_name: String,
}

impl std::fmt::Debug for SigningKeyController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyController")
            .field("operator_namespace", &self.operator_namespace)
            .field("target_namespace", &self.target_namespace)
            .field("kube_apiserver_name", &self.kube_apiserver_name)
            .finish_non_exhaustive()
    }
}

/// Non-empty value stored under `key` in a Secret
fn secret_value<'a>(secret: &'a Secret, key: &str) -> Option<&'a [u8]> {
    secret
        .data
        .as_ref()?
        .get(key)
        .map(|v| v.0.as_slice())
        .filter(|v| !v.is_empty())
}

/// Secret data holding a signing key pair
fn key_data(private_key: &[u8], public_key: &[u8]) -> BTreeMap<String, ByteString> {
    BTreeMap::from([
        (PRIVATE_KEY_KEY.to_string(), ByteString(private_key.to_vec())),
        (PUBLIC_KEY_KEY.to_string(), ByteString(public_key.to_vec())),
    ])
}

/// Overwrite the key material in `secret`, keeping any unrelated keys
fn set_key_material(secret: &mut Secret, private_key: &[u8], public_key: &[u8]) {
    secret
        .data
        .get_or_insert_with(BTreeMap::new)
        .extend(key_data(private_key, public_key));
}

fn new_secret(namespace: &str, name: &str, private_key: &[u8], public_key: &[u8]) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..ObjectMeta::default()
        },
        type_: Some("Opaque".to_string()),
        data: Some(key_data(private_key, public_key)),
        ..Secret::default()
    }
}

/// Public key of the operator secret as PEM text
fn public_key_pem(secret: &Secret, namespace: &str) -> Result<String> {
    let bytes = secret_value(secret, PUBLIC_KEY_KEY).ok_or_else(|| Error::MissingPublicKey {
        namespace: namespace.to_string(),
        name: NEXT_SIGNING_KEY_SECRET.to_string(),
        key: PUBLIC_KEY_KEY,
    })?;
    String::from_utf8(bytes.to_vec())
        .map_err(|e| Error::InvalidKeyPair(format!("public key is not UTF-8: {e}")))
}

impl SigningKeyController {
    pub fn new(
        client: Arc<dyn ResourceClient>,
        crypto: Arc<dyn SigningKeyCrypto>,
        events: Arc<dyn EventRecorder>,
        metrics: Arc<Metrics>,
        config: &ControllerConfig,
    ) -> Self {
        Self {
            client,
            crypto,
            events,
            metrics,
            operator_namespace: config.operator_namespace.clone(),
            target_namespace: config.target_namespace.clone(),
            kube_apiserver_name: config.kube_apiserver_name.clone(),
        }
    }

    /// Run all three steps, aggregating their errors
    pub async fn sync(&self) -> Result<SyncOutcome> {
        let mut errors = Vec::new();

        if let Err(e) = self.ensure_operator_secret().await {
            warn!(step = "ensure-operator-secret", error = %e, "Signing key step failed");
            errors.push(e);
        }
        if let Err(e) = self.ensure_trust_store_entry().await {
            warn!(step = "ensure-trust-store-entry", error = %e, "Signing key step failed");
            errors.push(e);
        }
        if let Err(e) = self.ensure_operand_secret().await {
            if !matches!(e, Error::NotYetPromotable) {
                warn!(step = "ensure-operand-secret", error = %e, "Signing key step failed");
            }
            errors.push(e);
        }

        match Error::aggregate(errors) {
            Some(e) => Err(e),
            None => Ok(SyncOutcome::Done),
        }
    }

    async fn operator_secret(&self) -> Result<Secret> {
        self.client
            .get_secret(&self.operator_namespace, NEXT_SIGNING_KEY_SECRET)
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: "Secret",
                namespace: self.operator_namespace.clone(),
                name: NEXT_SIGNING_KEY_SECRET.to_string(),
            })
    }

    /// Make sure the operator namespace holds a valid signing key pair
    pub async fn ensure_operator_secret(&self) -> Result<()> {
        let namespace = self.operator_namespace.as_str();
        let existing = self
            .client
            .get_secret(namespace, NEXT_SIGNING_KEY_SECRET)
            .await?;

        if let Some(secret) = &existing {
            let public = secret_value(secret, PUBLIC_KEY_KEY).unwrap_or_default();
            let private = secret_value(secret, PRIVATE_KEY_KEY).unwrap_or_default();
            match self.crypto.validate(public, private) {
                Ok(()) => {
                    debug!(namespace, name = NEXT_SIGNING_KEY_SECRET, "Operator signing key pair is valid");
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        namespace,
                        name = NEXT_SIGNING_KEY_SECRET,
                        error = %e,
                        "Operator signing key pair is invalid, regenerating"
                    );
                }
            }
        } else {
            info!(namespace, name = NEXT_SIGNING_KEY_SECRET, "Operator signing secret not found, regenerating");
        }

        let KeyPair {
            private_key,
            public_key,
        } = self.generate_key_pair().await?;

        match existing {
            Some(mut secret) => {
                set_key_material(&mut secret, &private_key, &public_key);
                self.client.update_secret(namespace, &secret).await?;
            }
            None => {
                let secret = new_secret(namespace, NEXT_SIGNING_KEY_SECRET, &private_key, &public_key);
                self.client.create_secret(namespace, &secret).await?;
            }
        }

        let fingerprint = fingerprint(&public_key);
        info!(namespace, name = NEXT_SIGNING_KEY_SECRET, %fingerprint, "Regenerated bound service account signing key");
        self.metrics.increment_signing_key_regenerations();
        self.events
            .normal(
                reason::SIGNING_KEY_REGENERATED,
                "Regenerate",
                format!("Generated new bound service account signing key {fingerprint} in {namespace}/{NEXT_SIGNING_KEY_SECRET}"),
            )
            .await;
        Ok(())
    }

    /// Generate a key pair on the blocking pool
    async fn generate_key_pair(&self) -> Result<KeyPair> {
        let crypto = Arc::clone(&self.crypto);
        tokio::task::spawn_blocking(move || crypto.generate())
            .await
            .map_err(|e| Error::KeyGeneration(format!("key generation task failed: {e}")))?
    }

    /// Append the operator public key to the trust store if it is not there yet
    pub async fn ensure_trust_store_entry(&self) -> Result<()> {
        let operator = self.operator_secret().await?;
        let public_key = public_key_pem(&operator, &self.operator_namespace)?;

        let namespace = self.target_namespace.as_str();
        let mut trust_store = match self
            .client
            .get_config_map(namespace, TRUST_STORE_CONFIG_MAP)
            .await?
        {
            Some(cm) => cm,
            None => {
                info!(namespace, name = TRUST_STORE_CONFIG_MAP, "Creating empty trust store");
                let empty = ConfigMap {
                    metadata: ObjectMeta {
                        name: Some(TRUST_STORE_CONFIG_MAP.to_string()),
                        namespace: Some(namespace.to_string()),
                        ..ObjectMeta::default()
                    },
                    ..ConfigMap::default()
                };
                self.client.create_config_map(namespace, &empty).await?
            }
        };

        if snapshot_contains_key(&trust_store, &public_key) {
            let slots = trust_store.data.as_ref().map_or(0, BTreeMap::len);
            self.metrics.set_trust_store_slots(slots);
            debug!(namespace, name = TRUST_STORE_CONFIG_MAP, "Trust store already contains the operator public key");
            return Ok(());
        }

        let data = trust_store.data.get_or_insert_with(BTreeMap::new);
        let slot = next_free_slot(data.keys());
        data.insert(slot.clone(), public_key.clone());
        let slots = data.len();

        self.client.update_config_map(namespace, &trust_store).await?;

        let fingerprint = fingerprint(public_key.as_bytes());
        info!(namespace, name = TRUST_STORE_CONFIG_MAP, %slot, %fingerprint, "Added public key to trust store");
        self.metrics.set_trust_store_slots(slots);
        self.events
            .normal(
                reason::TRUST_STORE_KEY_ADDED,
                "AddTrustedKey",
                format!("Added public key {fingerprint} to {namespace}/{TRUST_STORE_CONFIG_MAP} as {slot}"),
            )
            .await;
        Ok(())
    }

    /// Promote the operator key pair to the API server namespace once it is trusted everywhere
    pub async fn ensure_operand_secret(&self) -> Result<()> {
        let operator = self.operator_secret().await?;
        let public_key = public_key_pem(&operator, &self.operator_namespace)?;
        let private_key = secret_value(&operator, PRIVATE_KEY_KEY).ok_or_else(|| {
            Error::InvalidKeyPair(format!(
                "operator signing secret {}/{} has no private key",
                self.operator_namespace, NEXT_SIGNING_KEY_SECRET
            ))
        })?;

        let namespace = self.target_namespace.as_str();
        let operand = self.client.get_secret(namespace, SIGNING_KEY_SECRET).await?;

        if let Some(secret) = &operand {
            let same_public = secret_value(secret, PUBLIC_KEY_KEY) == Some(public_key.as_bytes());
            let same_private = secret_value(secret, PRIVATE_KEY_KEY) == Some(private_key);
            if same_public && same_private {
                debug!(namespace, name = SIGNING_KEY_SECRET, "Operand signing key is up to date");
                return Ok(());
            }
        }

        let fingerprint = fingerprint(public_key.as_bytes());
        let trusted = self
            .client
            .get_config_map(namespace, TRUST_STORE_CONFIG_MAP)
            .await?
            .is_some_and(|cm| snapshot_contains_key(&cm, &public_key));
        if !trusted {
            warn!(namespace, %fingerprint, "Signing key promotion blocked until the trust store contains its public key");
            self.events
                .warning(
                    reason::SIGNING_KEY_PROMOTION_BLOCKED,
                    "Promote",
                    format!("Signing key {fingerprint} cannot be promoted until {namespace}/{TRUST_STORE_CONFIG_MAP} contains its public key"),
                )
                .await;
            return Err(Error::NotYetPromotable);
        }

        match operand {
            None => {
                // Nothing can have been signed yet, so there is nothing to invalidate.
                let secret = new_secret(namespace, SIGNING_KEY_SECRET, private_key, public_key.as_bytes());
                self.client.create_secret(namespace, &secret).await?;
                info!(namespace, name = SIGNING_KEY_SECRET, %fingerprint, "Promoting signing key (bootstrap)");
            }
            Some(mut secret) => {
                if !self.public_key_synced_to_all_nodes(&public_key).await? {
                    info!(namespace, %fingerprint, "Signing key promotion pending until all revisions trust its public key");
                    self.events
                        .normal(
                            reason::SIGNING_KEY_PROMOTION_PENDING,
                            "Promote",
                            format!("Waiting for every API server revision to trust public key {fingerprint} before promoting it"),
                        )
                        .await;
                    return Ok(());
                }
                set_key_material(&mut secret, private_key, public_key.as_bytes());
                self.client.update_secret(namespace, &secret).await?;
                info!(namespace, name = SIGNING_KEY_SECRET, %fingerprint, "Promoting signing key");
            }
        }

        self.metrics.increment_signing_key_promotions();
        self.events
            .normal(
                reason::SIGNING_KEY_PROMOTED,
                "Promote",
                format!("Promoted signing key {fingerprint} to {namespace}/{SIGNING_KEY_SECRET}"),
            )
            .await;
        Ok(())
    }

    /// Whether the trust store snapshot of every revision running on some node contains `public_key`
    ///
    /// No node statuses means the rollout state is unknown, which counts as not synced.
    pub async fn public_key_synced_to_all_nodes(&self, public_key: &str) -> Result<bool> {
        let kas = self
            .client
            .get_kube_apiserver(&self.kube_apiserver_name)
            .await?;
        let revisions = distinct_revisions(kas.node_statuses());
        if revisions.is_empty() {
            debug!("No node statuses reported yet");
            return Ok(false);
        }

        for revision in revisions {
            let name = revision_trust_store_name(revision);
            match self
                .client
                .get_config_map(&self.target_namespace, &name)
                .await?
            {
                Some(snapshot) if snapshot_contains_key(&snapshot, public_key) => {}
                Some(_) => {
                    debug!(revision, %name, "Revision does not trust the public key yet");
                    return Ok(false);
                }
                None => {
                    debug!(revision, %name, "Revision trust store snapshot not found");
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl Syncer for SigningKeyController {
    fn name(&self) -> &'static str {
        "signing-key"
    }

    async fn sync(&self) -> Result<SyncOutcome> {
        let span = tracing::info_span!("controller.sync", controller = self.name());
        SigningKeyController::sync(self).instrument(span).await
    }
}
