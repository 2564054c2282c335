//! # Shutdown
//!
//! Translates SIGINT/SIGTERM into the shutdown channel observed by workers,
//! watches and the HTTP server.

use tokio::sync::watch;
use tracing::{info, warn};

/// Wait for SIGINT or SIGTERM, then flip `shutdown` to true
pub async fn forward_shutdown_signal(shutdown: watch::Sender<bool>) {
    wait_for_signal().await;
    info!("Shutdown signal received");
    if shutdown.send(true).is_err() {
        warn!("No shutdown receivers left");
    }
}

/// Resolve once `shutdown` flips to true or its sender is dropped
pub async fn shutdown_requested(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for ctrl-c: {}", e);
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {}", e);
    }
}
