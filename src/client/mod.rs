//! # Resource Client
//!
//! The read/write operations the controllers need against the cluster, as an
//! explicit trait so tests can swap in an in-memory implementation.
//!
//! Every write carries the resourceVersion of the object it was derived from.
//! A racing writer produces [`Error::Conflict`], which is left for the next
//! reconcile to resolve rather than retried in place.

#[cfg(test)]
pub(crate) mod fake;

use crate::crd::{KubeAPIServer, ServiceAccountIssuerStatus};
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::debug;

/// Typed cluster operations used by the signing key and issuer controllers
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Get a Secret, `None` when it does not exist
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;

    /// Create a Secret, failing with [`Error::AlreadyExists`] on a race
    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret>;

    /// Replace a Secret, failing with [`Error::Conflict`] when its resourceVersion is stale
    async fn update_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret>;

    /// Get a ConfigMap, `None` when it does not exist
    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>>;

    /// Create a ConfigMap, failing with [`Error::AlreadyExists`] on a race
    async fn create_config_map(&self, namespace: &str, config_map: &ConfigMap)
        -> Result<ConfigMap>;

    /// Replace a ConfigMap, failing with [`Error::Conflict`] when its resourceVersion is stale
    async fn update_config_map(&self, namespace: &str, config_map: &ConfigMap)
        -> Result<ConfigMap>;

    /// Get the cluster-scoped KubeAPIServer resource
    async fn get_kube_apiserver(&self, name: &str) -> Result<KubeAPIServer>;

    /// Replace `status.serviceAccountIssuers`, guarded by the resourceVersion of `current`
    async fn update_service_account_issuers(
        &self,
        current: &KubeAPIServer,
        issuers: &[ServiceAccountIssuerStatus],
    ) -> Result<KubeAPIServer>;
}

/// [`ResourceClient`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeResourceClient {
    client: Client,
    field_manager: String,
}

impl std::fmt::Debug for KubeResourceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeResourceClient")
            .field("field_manager", &self.field_manager)
            .finish_non_exhaustive()
    }
}

impl KubeResourceClient {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..PostParams::default()
        }
    }
}

/// Map write errors onto the conflict taxonomy
fn classify_write_error(err: kube::Error, kind: &'static str, namespace: &str, name: &str) -> Error {
    match err {
        kube::Error::Api(api_err) if api_err.code == 409 && api_err.reason == "AlreadyExists" => {
            Error::AlreadyExists {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            }
        }
        kube::Error::Api(api_err) if api_err.code == 409 => Error::Conflict {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        other => Error::Kube(other),
    }
}

/// Merge patch replacing `status.serviceAccountIssuers` wholesale
///
/// The resourceVersion of `current` turns the patch into a compare-and-swap.
fn issuer_status_patch(
    current: &KubeAPIServer,
    issuers: &[ServiceAccountIssuerStatus],
) -> Result<serde_json::Value> {
    Ok(serde_json::json!({
        "metadata": {
            "resourceVersion": current.resource_version(),
        },
        "status": {
            "serviceAccountIssuers": serde_json::to_value(issuers)?,
        }
    }))
}

#[async_trait]
impl ResourceClient for KubeResourceClient {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let name = secret.name_any();
        debug!(namespace, name = %name, "creating secret");
        api.create(&self.post_params(), secret)
            .await
            .map_err(|e| classify_write_error(e, "Secret", namespace, &name))
    }

    async fn update_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let name = secret.name_any();
        debug!(namespace, name = %name, "replacing secret");
        api.replace(&name, &self.post_params(), secret)
            .await
            .map_err(|e| classify_write_error(e, "Secret", namespace, &name))
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let name = config_map.name_any();
        debug!(namespace, name = %name, "creating configmap");
        api.create(&self.post_params(), config_map)
            .await
            .map_err(|e| classify_write_error(e, "ConfigMap", namespace, &name))
    }

    async fn update_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let name = config_map.name_any();
        debug!(namespace, name = %name, "replacing configmap");
        api.replace(&name, &self.post_params(), config_map)
            .await
            .map_err(|e| classify_write_error(e, "ConfigMap", namespace, &name))
    }

    async fn get_kube_apiserver(&self, name: &str) -> Result<KubeAPIServer> {
        let api: Api<KubeAPIServer> = Api::all(self.client.clone());
        match api.get(name).await {
            Ok(kas) => Ok(kas),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Err(Error::NotFound {
                kind: "KubeAPIServer",
                namespace: String::new(),
                name: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_service_account_issuers(
        &self,
        current: &KubeAPIServer,
        issuers: &[ServiceAccountIssuerStatus],
    ) -> Result<KubeAPIServer> {
        let api: Api<KubeAPIServer> = Api::all(self.client.clone());
        let name = current.name_any();
        let patch = issuer_status_patch(current, issuers)?;

        api.patch_status(
            &name,
            &PatchParams::apply(&self.field_manager),
            &Patch::Merge(patch),
        )
        .await
        .map_err(|e| classify_write_error(e, "KubeAPIServer", "", &name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::KubeAPIServerSpec;
    use chrono::{TimeZone, Utc};
    use kube::error::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{reason} from the API server"),
            reason: reason.to_string(),
            code,
        })
    }

    fn kube_apiserver(resource_version: &str) -> KubeAPIServer {
        let mut kas = KubeAPIServer::new("cluster", KubeAPIServerSpec::default());
        kas.metadata.resource_version = Some(resource_version.to_string());
        kas
    }

    #[test]
    fn test_create_race_maps_to_already_exists() {
        let err = classify_write_error(
            api_error(409, "AlreadyExists"),
            "Secret",
            "openshift-kube-apiserver-operator",
            "next-bound-service-account-signing-key",
        );
        match err {
            Error::AlreadyExists {
                kind,
                namespace,
                name,
            } => {
                assert_eq!(kind, "Secret");
                assert_eq!(namespace, "openshift-kube-apiserver-operator");
                assert_eq!(name, "next-bound-service-account-signing-key");
            }
            other => panic!("expected AlreadyExists, got {other:?}"),
        }
    }

    #[test]
    fn test_stale_resource_version_maps_to_conflict() {
        let err = classify_write_error(
            api_error(409, "Conflict"),
            "ConfigMap",
            "openshift-kube-apiserver",
            "bound-sa-token-signing-certs",
        );
        assert!(matches!(err, Error::Conflict { kind: "ConfigMap", .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn test_other_api_errors_stay_kube_errors() {
        let err = classify_write_error(
            api_error(500, "InternalError"),
            "KubeAPIServer",
            "",
            "cluster",
        );
        assert!(matches!(err, Error::Kube(kube::Error::Api(ref e)) if e.code == 500));
    }

    #[test]
    fn test_issuer_patch_carries_resource_version_and_full_list() {
        let expires = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
        let issuers = vec![
            ServiceAccountIssuerStatus::active("https://b.example.com"),
            ServiceAccountIssuerStatus::trusted("https://a.example.com", expires),
        ];

        let patch = issuer_status_patch(&kube_apiserver("42"), &issuers).unwrap();

        assert_eq!(patch["metadata"]["resourceVersion"], "42");
        assert_eq!(
            patch["status"]["serviceAccountIssuers"],
            serde_json::json!([
                { "name": "https://b.example.com" },
                { "name": "https://a.example.com", "expirationTime": "2026-10-18T12:00:00Z" },
            ])
        );
    }

    #[test]
    fn test_issuer_patch_clears_with_empty_list() {
        let patch = issuer_status_patch(&kube_apiserver("7"), &[]).unwrap();

        assert_eq!(patch["metadata"]["resourceVersion"], "7");
        assert_eq!(patch["status"]["serviceAccountIssuers"], serde_json::json!([]));
    }
}
