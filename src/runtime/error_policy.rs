//! # Error Policy
//!
//! Retry scheduling for failed syncs and classification of watch stream errors.

use crate::controller::backoff::FibonacciBackoff;
use crate::error::Error;
use crate::observability::Metrics;
use std::time::Duration;
use tracing::{error, info, warn};

/// Delay before retrying a failed sync
///
/// A pending trust store update resolves on its own within a resync, so it
/// waits for the regular interval. Everything else backs off progressively.
pub fn retry_delay(error: &Error, backoff: &mut FibonacciBackoff, resync_interval: Duration) -> Duration {
    if error.is_not_yet_promotable() {
        resync_interval
    } else {
        backoff.next_backoff()
    }
}

/// Log and count a failed sync, returning the delay before the next attempt
pub fn handle_sync_error(
    controller: &str,
    error: &Error,
    backoff: &mut FibonacciBackoff,
    resync_interval: Duration,
    metrics: &Metrics,
) -> Duration {
    metrics.increment_sync_errors(controller, error.as_str());
    let delay = retry_delay(error, backoff, resync_interval);

    if error.is_not_yet_promotable() {
        info!(
            controller,
            "Signing key not yet promotable, retrying in {}s (trigger source: resync)",
            delay.as_secs()
        );
        metrics.increment_requeues(controller, "resync");
    } else {
        if error.is_transient() {
            warn!(controller, error = %error, reason = error.as_str(), "Sync failed");
        } else {
            error!(controller, error = %error, reason = error.as_str(), "Sync failed");
        }
        let next_trigger_time = chrono::Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        info!(
            controller,
            "Retrying with Fibonacci backoff: {}s, next retry at {} (trigger source: error-backoff)",
            delay.as_secs(),
            next_trigger_time.to_rfc3339()
        );
        metrics.increment_requeues(controller, "error-backoff");
    }
    delay
}

/// Log a watch stream error
///
/// The watcher restarts itself with backoff; this only classifies the
/// failure so the log says what went wrong.
pub fn handle_watch_stream_error(watch: &str, error: &kube_runtime::watcher::Error) {
    let message = error.to_string();
    let is_401 = message.contains("401") || message.contains("Unauthorized");
    let is_403 = message.contains("403") || message.contains("Forbidden");
    let is_410 = message.contains("410")
        || message.contains("too old resource version")
        || message.contains("Expired");
    let is_429 = message.contains("429") || message.contains("TooManyRequests");

    if is_401 || is_403 {
        error!(watch, error = %message, "Watch not authorized, check the controller RBAC");
    } else if is_410 {
        warn!(watch, "Watch resource version expired (410), watch will restart");
    } else if is_429 {
        warn!(watch, "API server throttling watch (429), backing off");
    } else {
        error!(watch, error = %message, "Watch stream error");
    }
}
