//! # Controllers
//!
//! The signing key rotation controller and the issuer trust controller.
//!
//! Each controller exposes a single idempotent `sync` that reads current
//! cluster state, diffs it against policy and performs at most a few writes.
//! The outcome is three-way:
//!
//! - `Ok(SyncOutcome::Done)`: steady state, wait for the next trigger
//! - `Ok(SyncOutcome::Requeue)`: state changed, sync again immediately
//! - `Err(_)`: retry with backoff

pub mod backoff;
pub mod issuer;
pub mod signing_key;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use issuer::IssuerTrustController;
pub use signing_key::SigningKeyController;

/// Successful result of a sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing further to do until the next resync or watch event
    Done,
    /// A meaningful transition was written; run again without waiting
    Requeue,
}

/// A level-triggered reconciler driven by the runtime worker
#[async_trait]
pub trait Syncer: Send + Sync {
    /// Stable name used in logs and metric labels
    fn name(&self) -> &'static str;

    async fn sync(&self) -> Result<SyncOutcome>;
}

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
