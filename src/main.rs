//! # Bound Token Trust Controller
//!
//! A Kubernetes controller that keeps the API server's bound service account
//! token trust material consistent while it rotates.
//!
//! ## Overview
//!
//! Two controllers run side by side:
//!
//! 1. **Signing key rotation** - Generates the token signing key pair, appends its
//!    public key to the `bound-sa-token-signing-certs` trust store, and promotes the
//!    pair to the API server namespace once every running revision trusts it
//! 2. **Issuer trust** - Tracks the configured service account issuer in the
//!    `KubeAPIServer` status, keeping the previous issuer trusted for a grace period
//!
//! ## Features
//!
//! - **No premature invalidation**: Keys and issuers are only replaced once every replica accepts the new material
//! - **Level-triggered**: Resyncs on a timer and on every relevant watch event
//! - **Prometheus metrics**: Exposes metrics for monitoring and observability
//! - **Health probes**: HTTP endpoints for liveness and readiness checks
//!
//! ## Usage
//!
//! See the [README.md](../README.md) for configuration and deployment.

use anyhow::Result;
use bound_token_trust_controller::runtime::{self, initialize, shutdown::forward_shutdown_signal};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(forward_shutdown_signal(shutdown_tx));

    // Initialize the controller runtime
    let init_result = initialize(shutdown_rx.clone()).await?;

    // Run both workers until shutdown
    runtime::run(init_result, shutdown_rx).await;

    Ok(())
}
