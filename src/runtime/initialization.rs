//! # Initialization
//!
//! Controller startup: rustls setup, tracing, metrics, HTTP server,
//! Kubernetes client, controllers, workers and watches.

use crate::client::{KubeResourceClient, ResourceClient};
use crate::config::{load_config, ServerConfig};
use crate::constants::CONTROLLER_NAME;
use crate::controller::{IssuerTrustController, SigningKeyController, SystemClock};
use crate::crypto::RsaSigningKeyCrypto;
use crate::events::{EventRecorder, KubeEventRecorder};
use crate::observability::{self, Metrics};
use crate::runtime::shutdown::shutdown_requested;
use crate::runtime::watch::start_watches;
use crate::runtime::worker::Worker;
use crate::server::{start_server, ServerState};
use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Everything `main` needs to run the controllers
pub struct InitializationResult {
    /// HTTP server task
    pub server_handle: JoinHandle<()>,
    /// One worker per controller, not yet running
    pub workers: Vec<Worker>,
    /// Watch tasks feeding the worker triggers
    pub watches: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("workers", &self.workers)
            .field("watches", &self.watches.len())
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
pub async fn initialize(shutdown: watch::Receiver<bool>) -> Result<InitializationResult> {
    // Required for rustls 0.23+ when no default provider is selected via features
    let provider_installed = rustls::crypto::ring::default_provider()
        .install_default()
        .is_ok();

    observability::init_tracing("bound_token_trust_controller=info");
    if !provider_installed {
        warn!("rustls crypto provider was already installed");
    }

    info!("Starting Bound Token Trust Controller");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    let (config, server_config) = load_config();
    info!(
        operator_namespace = %config.operator_namespace,
        target_namespace = %config.target_namespace,
        kube_apiserver = %config.kube_apiserver_name,
        "Resync every {}s, issuers trusted for {}s after rotation, at most {} issuers",
        config.resync_interval.as_secs(),
        config.issuer_trust_duration.as_secs(),
        config.max_service_account_issuers
    );

    let metrics = Arc::new(Metrics::new().context("Failed to register metrics")?);

    let server_state = ServerState::new(Arc::clone(&metrics));
    let server_handle = {
        let state = server_state.clone();
        let port = server_config.metrics_port;
        let stop = shutdown_requested(shutdown.clone());
        tokio::spawn(async move {
            if let Err(e) = start_server(port, state, stop).await {
                error!("HTTP server error: {}", e);
            }
        })
    };
    wait_for_server_ready(&server_state, &server_handle, &server_config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let resource_client: Arc<dyn ResourceClient> =
        Arc::new(KubeResourceClient::new(client.clone(), CONTROLLER_NAME));
    let events: Arc<dyn EventRecorder> = Arc::new(KubeEventRecorder::new(
        client.clone(),
        CONTROLLER_NAME,
        &config.pod_name,
        &config.operator_namespace,
        &config.operator_deployment,
    ));

    let signing_key = Arc::new(SigningKeyController::new(
        Arc::clone(&resource_client),
        Arc::new(RsaSigningKeyCrypto::default()),
        Arc::clone(&events),
        Arc::clone(&metrics),
        &config,
    ));
    let issuer = Arc::new(IssuerTrustController::new(
        Arc::clone(&resource_client),
        Arc::clone(&events),
        Arc::clone(&metrics),
        Arc::new(SystemClock),
        &config,
    ));

    let signing_key_trigger = Arc::new(Notify::new());
    let issuer_trigger = Arc::new(Notify::new());
    let watches = start_watches(
        &client,
        &config,
        &signing_key_trigger,
        &issuer_trigger,
        &shutdown,
    );

    let workers = vec![
        Worker::new(
            signing_key,
            signing_key_trigger,
            Arc::clone(&metrics),
            config.resync_interval,
        ),
        Worker::new(
            issuer,
            issuer_trigger,
            Arc::clone(&metrics),
            config.resync_interval,
        ),
    ];

    info!("Controller initialized, starting workers...");

    Ok(InitializationResult {
        server_handle,
        workers,
        watches,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &ServerState,
    server_handle: &JoinHandle<()>,
    server_config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(server_config.startup_timeout_secs);
    let poll_interval = Duration::from_millis(server_config.poll_interval_ms);
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.ready() {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}
