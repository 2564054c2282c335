//! # HTTP Server
//!
//! Metrics and health probe endpoints.
//!
//! - `/metrics`: Prometheus text exposition of the injected [`Metrics`]
//! - `/healthz`: liveness, always `ok` while the process serves requests
//! - `/readyz`: readiness, `ok` once the listener is bound

use crate::observability::Metrics;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared state for the probe handlers
#[derive(Debug, Clone)]
pub struct ServerState {
    pub is_ready: Arc<AtomicBool>,
    pub metrics: Arc<Metrics>,
}

impl ServerState {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            is_ready: Arc::new(AtomicBool::new(false)),
            metrics,
        }
    }

    pub fn ready(&self) -> bool {
        self.is_ready.load(Ordering::Relaxed)
    }
}

/// Router serving the metrics and probe endpoints
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn metrics_handler(State(state): State<ServerState>) -> (StatusCode, String) {
    match state.metrics.encode() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn healthz_handler() -> &'static str {
    "ok"
}

async fn readyz_handler(State(state): State<ServerState>) -> (StatusCode, &'static str) {
    if state.ready() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

/// Bind `0.0.0.0:port` and serve until `shutdown` resolves
///
/// Readiness flips to true once the listener is bound.
pub async fn start_server<F>(port: u16, state: ServerState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    serve(listener, state, shutdown).await
}

/// Serve on an already bound listener
pub async fn serve<F>(
    listener: tokio::net::TcpListener,
    state: ServerState,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("HTTP server listening on {}", listener.local_addr()?);
    state.is_ready.store(true, Ordering::Relaxed);
    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn state() -> ServerState {
        ServerState::new(Arc::new(Metrics::new().unwrap()))
    }

    #[tokio::test]
    async fn test_readyz_follows_state() {
        let state = state();
        let (status, _) = readyz_handler(State(state.clone())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        state.is_ready.store(true, Ordering::Relaxed);
        let (status, body) = readyz_handler(State(state)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_metrics_handler_renders_registry() {
        let state = state();
        state.metrics.increment_syncs("issuer-trust");
        let (status, body) = metrics_handler(State(state)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("trust_controller_syncs_total{controller=\"issuer-trust\"} 1"));
    }

    #[tokio::test]
    async fn test_serve_answers_probes_and_shuts_down() {
        let state = state();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(serve(listener, state.clone(), async move {
            let _ = stop_rx.await;
        }));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /healthz HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(state.ready());

        stop_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
