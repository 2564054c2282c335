//! # Worker
//!
//! Drives one [`Syncer`]: level-triggered, one sync in flight at a time.
//!
//! A sync runs when the resync timer fires, when a watch pokes the trigger,
//! or immediately after a sync asked to be requeued. Failed syncs are retried
//! on the schedule chosen by the error policy.

use crate::constants::{
    DEFAULT_ERROR_BACKOFF_MAX_SECS, DEFAULT_ERROR_BACKOFF_MIN_SECS, MAX_CONSECUTIVE_REQUEUES,
};
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::{SyncOutcome, Syncer};
use crate::error::Result;
use crate::observability::Metrics;
use crate::runtime::error_policy::handle_sync_error;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

/// Scheduler for a single controller
pub struct Worker {
    syncer: Arc<dyn Syncer>,
    trigger: Arc<Notify>,
    metrics: Arc<Metrics>,
    resync_interval: Duration,
    backoff: FibonacciBackoff,
    max_consecutive_requeues: u32,
    consecutive_requeues: u32,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("controller", &self.syncer.name())
            .field("resync_interval", &self.resync_interval)
            .field("consecutive_requeues", &self.consecutive_requeues)
            .finish_non_exhaustive()
    }
}

impl Worker {
    pub fn new(
        syncer: Arc<dyn Syncer>,
        trigger: Arc<Notify>,
        metrics: Arc<Metrics>,
        resync_interval: Duration,
    ) -> Self {
        Self {
            syncer,
            trigger,
            metrics,
            resync_interval,
            backoff: FibonacciBackoff::new(
                DEFAULT_ERROR_BACKOFF_MIN_SECS,
                DEFAULT_ERROR_BACKOFF_MAX_SECS,
            ),
            max_consecutive_requeues: MAX_CONSECUTIVE_REQUEUES,
            consecutive_requeues: 0,
        }
    }

    /// Cap on back-to-back requeues before falling back to the resync timer
    pub fn with_max_consecutive_requeues(mut self, max: u32) -> Self {
        self.max_consecutive_requeues = max;
        self
    }

    pub fn with_backoff(mut self, backoff: FibonacciBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Run until `shutdown` flips to true or its sender is dropped
    ///
    /// An in-flight sync is dropped on shutdown.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let name = self.syncer.name();
        info!(controller = name, "Starting worker, resync every {}s", self.resync_interval.as_secs());

        loop {
            if *shutdown.borrow() {
                break;
            }

            let result = tokio::select! {
                result = self.sync_once() => result,
                _ = shutdown.changed() => {
                    info!(controller = name, "Shutdown requested, cancelling in-flight sync");
                    break;
                }
            };

            let delay = self.next_delay(result);
            if delay.is_zero() {
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    debug!(controller = name, "Resync timer fired");
                }
                _ = self.trigger.notified() => {
                    debug!(controller = name, "Watch event received");
                }
                _ = shutdown.changed() => break,
            }
        }

        info!(controller = name, "Worker stopped");
    }

    async fn sync_once(&self) -> Result<SyncOutcome> {
        let name = self.syncer.name();
        self.metrics.increment_syncs(name);
        let _timer = self.metrics.sync_timer(name).start_timer();
        self.syncer.sync().await
    }

    /// Delay before the next sync given the result of the last one
    fn next_delay(&mut self, result: Result<SyncOutcome>) -> Duration {
        let name = self.syncer.name();
        match result {
            Ok(SyncOutcome::Done) => {
                self.backoff.reset();
                self.consecutive_requeues = 0;
                self.resync_interval
            }
            Ok(SyncOutcome::Requeue) => {
                self.backoff.reset();
                self.consecutive_requeues += 1;
                if self.consecutive_requeues > self.max_consecutive_requeues {
                    warn!(
                        controller = name,
                        "Requeued {} times in a row, waiting for the next resync",
                        self.consecutive_requeues - 1
                    );
                    self.consecutive_requeues = 0;
                    self.metrics.increment_requeues(name, "requeue-limit");
                    self.resync_interval
                } else {
                    debug!(controller = name, "State changed, syncing again immediately");
                    self.metrics.increment_requeues(name, "requeue");
                    Duration::ZERO
                }
            }
            Err(e) => {
                self.consecutive_requeues = 0;
                handle_sync_error(
                    name,
                    &e,
                    &mut self.backoff,
                    self.resync_interval,
                    &self.metrics,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const LONG: Duration = Duration::from_secs(3600);

    /// Returns scripted results, then `Done` forever
    #[derive(Default)]
    struct ScriptedSyncer {
        script: Mutex<VecDeque<Result<SyncOutcome>>>,
        calls: AtomicUsize,
        hang: bool,
        always_requeue: bool,
    }

    impl ScriptedSyncer {
        fn new(script: Vec<Result<SyncOutcome>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Syncer for ScriptedSyncer {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn sync(&self) -> Result<SyncOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                std::future::pending::<()>().await;
            }
            if self.always_requeue {
                return Ok(SyncOutcome::Requeue);
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(SyncOutcome::Done))
        }
    }

    struct Running {
        syncer: Arc<ScriptedSyncer>,
        trigger: Arc<Notify>,
        stop: watch::Sender<bool>,
        handle: tokio::task::JoinHandle<()>,
    }

    fn start(syncer: ScriptedSyncer, configure: impl FnOnce(Worker) -> Worker) -> Running {
        let syncer = Arc::new(syncer);
        let trigger = Arc::new(Notify::new());
        let (stop, shutdown) = watch::channel(false);
        let worker = configure(Worker::new(
            Arc::clone(&syncer) as Arc<dyn Syncer>,
            Arc::clone(&trigger),
            Arc::new(Metrics::new().unwrap()),
            LONG,
        ));
        let handle = tokio::spawn(worker.run(shutdown));
        Running {
            syncer,
            trigger,
            stop,
            handle,
        }
    }

    async fn wait_for_calls(syncer: &ScriptedSyncer, expected: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while syncer.calls() < expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        // Give the worker a chance to run any sync it should not run.
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    async fn stop(running: Running) {
        running.stop.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), running.handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_requeue_runs_again_immediately() {
        let running = start(
            ScriptedSyncer::new(vec![Ok(SyncOutcome::Requeue), Ok(SyncOutcome::Requeue)]),
            |w| w,
        );

        wait_for_calls(&running.syncer, 3).await;
        assert_eq!(running.syncer.calls(), 3);
        stop(running).await;
    }

    #[tokio::test]
    async fn test_watch_trigger_runs_a_sync() {
        let running = start(ScriptedSyncer::new(Vec::new()), |w| w);
        wait_for_calls(&running.syncer, 1).await;

        running.trigger.notify_one();
        wait_for_calls(&running.syncer, 2).await;
        assert_eq!(running.syncer.calls(), 2);
        stop(running).await;
    }

    #[tokio::test]
    async fn test_error_is_retried_with_backoff() {
        let running = start(
            ScriptedSyncer::new(vec![Err(Error::NotFound {
                kind: "KubeAPIServer",
                namespace: String::new(),
                name: "cluster".to_string(),
            })]),
            |w| w.with_backoff(FibonacciBackoff::new(1, 1)),
        );

        wait_for_calls(&running.syncer, 2).await;
        assert_eq!(running.syncer.calls(), 2);
        stop(running).await;
    }

    #[tokio::test]
    async fn test_requeue_guard_falls_back_to_resync() {
        let syncer = ScriptedSyncer {
            always_requeue: true,
            ..ScriptedSyncer::default()
        };
        let running = start(syncer, |w| w.with_max_consecutive_requeues(3));

        wait_for_calls(&running.syncer, 4).await;
        assert_eq!(running.syncer.calls(), 4);
        stop(running).await;
    }

    #[tokio::test]
    async fn test_shutdown_cancels_in_flight_sync() {
        let syncer = ScriptedSyncer {
            hang: true,
            ..ScriptedSyncer::default()
        };
        let running = start(syncer, |w| w);

        wait_for_calls(&running.syncer, 1).await;
        stop(running).await;
    }
}
