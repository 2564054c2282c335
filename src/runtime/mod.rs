//! # Runtime Module
//!
//! Runtime components for the Bound Token Trust Controller: initialization,
//! per-controller workers, watches, shutdown and error handling.

pub mod error_policy;
pub mod initialization;
pub mod shutdown;
pub mod watch;
pub mod worker;

pub use initialization::{initialize, InitializationResult};
pub use worker::Worker;

use tokio::sync::watch as channel;
use tracing::{error, info};

/// Run every worker until shutdown, then wait for watches and the server to stop
pub async fn run(init: InitializationResult, shutdown: channel::Receiver<bool>) {
    let handles: Vec<_> = init
        .workers
        .into_iter()
        .map(|worker| tokio::spawn(worker.run(shutdown.clone())))
        .collect();

    for handle in handles {
        if let Err(e) = handle.await {
            error!("Worker task failed: {}", e);
        }
    }
    for handle in init.watches {
        if let Err(e) = handle.await {
            error!("Watch task failed: {}", e);
        }
    }
    if let Err(e) = init.server_handle.await {
        error!("HTTP server task failed: {}", e);
    }
    info!("Controller stopped");
}
