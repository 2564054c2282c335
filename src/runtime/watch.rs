//! # Watches
//!
//! Watch streams that poke worker triggers whenever a resource a controller
//! depends on changes. Watches carry no state of their own; controllers always
//! re-read what they need when they sync.

use crate::config::ControllerConfig;
use crate::crd::KubeAPIServer;
use crate::runtime::error_policy::handle_watch_stream_error;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::Api;
use kube::{Client, Resource};
use kube_runtime::watcher::{self, watcher, Event};
use kube_runtime::WatchStreamExt;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Spawn a watch that notifies every trigger on each change
///
/// The initial listing notifies once, when it completes.
pub fn spawn_watch<K>(
    label: &'static str,
    api: Api<K>,
    config: watcher::Config,
    triggers: Vec<Arc<Notify>>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    tokio::spawn(async move {
        info!(watch = label, "Starting watch");
        let mut stream = std::pin::pin!(watcher(api, config).default_backoff());
        loop {
            tokio::select! {
                item = stream.next() => match item {
                    Some(Ok(Event::Apply(_) | Event::Delete(_) | Event::InitDone)) => {
                        debug!(watch = label, "Change observed");
                        for trigger in &triggers {
                            trigger.notify_one();
                        }
                    }
                    Some(Ok(Event::Init | Event::InitApply(_))) => {}
                    Some(Err(e)) => handle_watch_stream_error(label, &e),
                    None => break,
                },
                _ = shutdown.changed() => break,
            }
        }
        info!(watch = label, "Watch stopped");
    })
}

/// Start every watch the two controllers depend on
///
/// The signing key controller reacts to its secrets, the trust store and its
/// revision snapshots, and node revision changes. The issuer controller
/// reacts to the KubeAPIServer resource only.
pub fn start_watches(
    client: &Client,
    config: &ControllerConfig,
    signing_key_trigger: &Arc<Notify>,
    issuer_trigger: &Arc<Notify>,
    shutdown: &watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let operator_secrets: Api<Secret> = Api::namespaced(client.clone(), &config.operator_namespace);
    let target_secrets: Api<Secret> = Api::namespaced(client.clone(), &config.target_namespace);
    let target_config_maps: Api<ConfigMap> =
        Api::namespaced(client.clone(), &config.target_namespace);
    let kube_apiservers: Api<KubeAPIServer> = Api::all(client.clone());

    vec![
        spawn_watch(
            "operator-signing-secret",
            operator_secrets,
            watcher::Config::default()
                .fields(&format!("metadata.name={}", names::NEXT_SIGNING_KEY_SECRET)),
            vec![Arc::clone(signing_key_trigger)],
            shutdown.clone(),
        ),
        spawn_watch(
            "operand-signing-secret",
            target_secrets,
            watcher::Config::default()
                .fields(&format!("metadata.name={}", names::SIGNING_KEY_SECRET)),
            vec![Arc::clone(signing_key_trigger)],
            shutdown.clone(),
        ),
        spawn_watch(
            "trust-store-config-maps",
            target_config_maps,
            watcher::Config::default(),
            vec![Arc::clone(signing_key_trigger)],
            shutdown.clone(),
        ),
        spawn_watch(
            "kube-apiserver",
            kube_apiservers,
            watcher::Config::default()
                .fields(&format!("metadata.name={}", config.kube_apiserver_name)),
            vec![Arc::clone(signing_key_trigger), Arc::clone(issuer_trigger)],
            shutdown.clone(),
        ),
    ]
}
