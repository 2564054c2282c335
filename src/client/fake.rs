//! In-memory [`ResourceClient`] for controller tests
//!
//! Mimics the API server's optimistic concurrency: every write bumps a global
//! resourceVersion and a replace carrying a stale resourceVersion fails with
//! [`Error::Conflict`].

use super::ResourceClient;
use crate::crd::{KubeAPIServer, KubeAPIServerStatus, ServiceAccountIssuerStatus};
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::ResourceExt;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

/// Operation an injected failure applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum FakeOp {
    GetSecret,
    CreateSecret,
    UpdateSecret,
    GetConfigMap,
    CreateConfigMap,
    UpdateConfigMap,
    UpdateIssuers,
}

#[derive(Debug, Default)]
struct FakeState {
    secrets: BTreeMap<(String, String), Secret>,
    config_maps: BTreeMap<(String, String), ConfigMap>,
    kube_apiservers: BTreeMap<String, KubeAPIServer>,
    resource_version: u64,
    writes: usize,
    failing: BTreeSet<FakeOp>,
}

impl FakeState {
    fn next_resource_version(&mut self) -> String {
        self.resource_version += 1;
        self.writes += 1;
        self.resource_version.to_string()
    }

    fn check_failure(&self, op: FakeOp, kind: &'static str, namespace: &str, name: &str) -> Result<()> {
        if self.failing.contains(&op) {
            return Err(Error::Conflict {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeClient {
    state: Mutex<FakeState>,
}

fn key(namespace: &str, name: &str) -> (String, String) {
    (namespace.to_string(), name.to_string())
}

fn conflict(kind: &'static str, namespace: &str, name: &str) -> Error {
    Error::Conflict {
        kind,
        namespace: namespace.to_string(),
        name: name.to_string(),
    }
}

impl FakeClient {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Seed a Secret without counting it as a controller write
    pub(crate) fn insert_secret(&self, namespace: &str, mut secret: Secret) {
        let mut state = self.state.lock().unwrap();
        state.resource_version += 1;
        secret.metadata.namespace = Some(namespace.to_string());
        secret.metadata.resource_version = Some(state.resource_version.to_string());
        state.secrets.insert(key(namespace, &secret.name_any()), secret);
    }

    /// Seed a ConfigMap without counting it as a controller write
    pub(crate) fn insert_config_map(&self, namespace: &str, mut config_map: ConfigMap) {
        let mut state = self.state.lock().unwrap();
        state.resource_version += 1;
        config_map.metadata.namespace = Some(namespace.to_string());
        config_map.metadata.resource_version = Some(state.resource_version.to_string());
        state
            .config_maps
            .insert(key(namespace, &config_map.name_any()), config_map);
    }

    /// Seed or overwrite a KubeAPIServer without counting it as a controller write
    pub(crate) fn insert_kube_apiserver(&self, mut kas: KubeAPIServer) {
        let mut state = self.state.lock().unwrap();
        state.resource_version += 1;
        kas.metadata.resource_version = Some(state.resource_version.to_string());
        state.kube_apiservers.insert(kas.name_any(), kas);
    }

    pub(crate) fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.state.lock().unwrap().secrets.get(&key(namespace, name)).cloned()
    }

    pub(crate) fn config_map(&self, namespace: &str, name: &str) -> Option<ConfigMap> {
        self.state
            .lock()
            .unwrap()
            .config_maps
            .get(&key(namespace, name))
            .cloned()
    }

    pub(crate) fn kube_apiserver(&self, name: &str) -> Option<KubeAPIServer> {
        self.state.lock().unwrap().kube_apiservers.get(name).cloned()
    }

    /// Number of create/update calls that reached storage
    pub(crate) fn write_count(&self) -> usize {
        self.state.lock().unwrap().writes
    }

    /// Make every call of `op` fail until [`FakeClient::recover`]
    pub(crate) fn fail(&self, op: FakeOp) {
        self.state.lock().unwrap().failing.insert(op);
    }

    pub(crate) fn recover(&self, op: FakeOp) {
        self.state.lock().unwrap().failing.remove(&op);
    }
}

#[async_trait]
impl ResourceClient for FakeClient {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        let state = self.state.lock().unwrap();
        state.check_failure(FakeOp::GetSecret, "Secret", namespace, name)?;
        Ok(state.secrets.get(&key(namespace, name)).cloned())
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret> {
        let name = secret.name_any();
        let mut state = self.state.lock().unwrap();
        state.check_failure(FakeOp::CreateSecret, "Secret", namespace, &name)?;
        if state.secrets.contains_key(&key(namespace, &name)) {
            return Err(Error::AlreadyExists {
                kind: "Secret",
                namespace: namespace.to_string(),
                name,
            });
        }
        let mut stored = secret.clone();
        stored.metadata.namespace = Some(namespace.to_string());
        stored.metadata.resource_version = Some(state.next_resource_version());
        state.secrets.insert(key(namespace, &name), stored.clone());
        Ok(stored)
    }

    async fn update_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret> {
        let name = secret.name_any();
        let mut state = self.state.lock().unwrap();
        state.check_failure(FakeOp::UpdateSecret, "Secret", namespace, &name)?;
        let existing = state
            .secrets
            .get(&key(namespace, &name))
            .ok_or_else(|| Error::NotFound {
                kind: "Secret",
                namespace: namespace.to_string(),
                name: name.clone(),
            })?;
        if secret.metadata.resource_version.is_some()
            && secret.metadata.resource_version != existing.metadata.resource_version
        {
            return Err(conflict("Secret", namespace, &name));
        }
        let mut stored = secret.clone();
        stored.metadata.namespace = Some(namespace.to_string());
        stored.metadata.resource_version = Some(state.next_resource_version());
        state.secrets.insert(key(namespace, &name), stored.clone());
        Ok(stored)
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        let state = self.state.lock().unwrap();
        state.check_failure(FakeOp::GetConfigMap, "ConfigMap", namespace, name)?;
        Ok(state.config_maps.get(&key(namespace, name)).cloned())
    }

    async fn create_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap> {
        let name = config_map.name_any();
        let mut state = self.state.lock().unwrap();
        state.check_failure(FakeOp::CreateConfigMap, "ConfigMap", namespace, &name)?;
        if state.config_maps.contains_key(&key(namespace, &name)) {
            return Err(Error::AlreadyExists {
                kind: "ConfigMap",
                namespace: namespace.to_string(),
                name,
            });
        }
        let mut stored = config_map.clone();
        stored.metadata.namespace = Some(namespace.to_string());
        stored.metadata.resource_version = Some(state.next_resource_version());
        state.config_maps.insert(key(namespace, &name), stored.clone());
        Ok(stored)
    }

    async fn update_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap> {
        let name = config_map.name_any();
        let mut state = self.state.lock().unwrap();
        state.check_failure(FakeOp::UpdateConfigMap, "ConfigMap", namespace, &name)?;
        let existing = state
            .config_maps
            .get(&key(namespace, &name))
            .ok_or_else(|| Error::NotFound {
                kind: "ConfigMap",
                namespace: namespace.to_string(),
                name: name.clone(),
            })?;
        if config_map.metadata.resource_version.is_some()
            && config_map.metadata.resource_version != existing.metadata.resource_version
        {
            return Err(conflict("ConfigMap", namespace, &name));
        }
        let mut stored = config_map.clone();
        stored.metadata.namespace = Some(namespace.to_string());
        stored.metadata.resource_version = Some(state.next_resource_version());
        state.config_maps.insert(key(namespace, &name), stored.clone());
        Ok(stored)
    }

    async fn get_kube_apiserver(&self, name: &str) -> Result<KubeAPIServer> {
        self.state
            .lock()
            .unwrap()
            .kube_apiservers
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                kind: "KubeAPIServer",
                namespace: String::new(),
                name: name.to_string(),
            })
    }

    async fn update_service_account_issuers(
        &self,
        current: &KubeAPIServer,
        issuers: &[ServiceAccountIssuerStatus],
    ) -> Result<KubeAPIServer> {
        let name = current.name_any();
        let mut state = self.state.lock().unwrap();
        state.check_failure(FakeOp::UpdateIssuers, "KubeAPIServer", "", &name)?;
        let existing = state
            .kube_apiservers
            .get(&name)
            .ok_or_else(|| Error::NotFound {
                kind: "KubeAPIServer",
                namespace: String::new(),
                name: name.clone(),
            })?;
        if current.metadata.resource_version != existing.metadata.resource_version {
            return Err(conflict("KubeAPIServer", "", &name));
        }
        let mut stored = existing.clone();
        stored
            .status
            .get_or_insert_with(KubeAPIServerStatus::default)
            .service_account_issuers = issuers.to_vec();
        stored.metadata.resource_version = Some(state.next_resource_version());
        state.kube_apiservers.insert(name, stored.clone());
        Ok(stored)
    }
}
