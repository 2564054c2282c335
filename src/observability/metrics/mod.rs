//! # Metrics Module
//!
//! Prometheus metrics for the trust controllers.
//!
//! Metrics live in an explicit [`Metrics`] value that owns its own registry.
//! One instance is created at startup and shared (via `Arc`) with the workers,
//! the controllers and the HTTP server; tests create their own instance.

use anyhow::Result;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    IntGaugeVec, Opts, Registry, TextEncoder,
};

/// Controller metrics and the registry they are registered with
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    syncs_total: IntCounterVec,
    sync_errors_total: IntCounterVec,
    sync_duration: HistogramVec,
    requeues_total: IntCounterVec,
    signing_key_promotions_total: IntCounter,
    signing_key_regenerations_total: IntCounter,
    trust_store_slots: IntGauge,
    service_account_issuers: IntGaugeVec,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create all metrics and register them with a fresh registry
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let syncs_total = IntCounterVec::new(
            Opts::new("trust_controller_syncs_total", "Total number of sync invocations"),
            &["controller"],
        )?;
        let sync_errors_total = IntCounterVec::new(
            Opts::new(
                "trust_controller_sync_errors_total",
                "Total number of syncs that returned an error",
            ),
            &["controller", "reason"],
        )?;
        let sync_duration = HistogramVec::new(
            HistogramOpts::new(
                "trust_controller_sync_duration_seconds",
                "Duration of sync invocations in seconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
            &["controller"],
        )?;
        let requeues_total = IntCounterVec::new(
            Opts::new(
                "trust_controller_requeues_total",
                "Total number of scheduled re-syncs by reason",
            ),
            &["controller", "reason"],
        )?;
        let signing_key_promotions_total = IntCounter::new(
            "trust_controller_signing_key_promotions_total",
            "Total number of signing keys promoted to the operand secret",
        )?;
        let signing_key_regenerations_total = IntCounter::new(
            "trust_controller_signing_key_regenerations_total",
            "Total number of signing keys generated for the operator secret",
        )?;
        let trust_store_slots = IntGauge::new(
            "trust_controller_trust_store_slots",
            "Number of public keys in the trust store ConfigMap",
        )?;
        let service_account_issuers = IntGaugeVec::new(
            Opts::new(
                "trust_controller_service_account_issuers",
                "Number of accepted service account issuers by state",
            ),
            &["state"],
        )?;

        registry.register(Box::new(syncs_total.clone()))?;
        registry.register(Box::new(sync_errors_total.clone()))?;
        registry.register(Box::new(sync_duration.clone()))?;
        registry.register(Box::new(requeues_total.clone()))?;
        registry.register(Box::new(signing_key_promotions_total.clone()))?;
        registry.register(Box::new(signing_key_regenerations_total.clone()))?;
        registry.register(Box::new(trust_store_slots.clone()))?;
        registry.register(Box::new(service_account_issuers.clone()))?;

        Ok(Self {
            registry,
            syncs_total,
            sync_errors_total,
            sync_duration,
            requeues_total,
            signing_key_promotions_total,
            signing_key_regenerations_total,
            trust_store_slots,
            service_account_issuers,
        })
    }

    pub fn increment_syncs(&self, controller: &str) {
        self.syncs_total.with_label_values(&[controller]).inc();
    }

    pub fn increment_sync_errors(&self, controller: &str, reason: &str) {
        self.sync_errors_total
            .with_label_values(&[controller, reason])
            .inc();
    }

    pub fn sync_timer(&self, controller: &str) -> Histogram {
        self.sync_duration.with_label_values(&[controller])
    }

    pub fn increment_requeues(&self, controller: &str, reason: &str) {
        self.requeues_total
            .with_label_values(&[controller, reason])
            .inc();
    }

    pub fn increment_signing_key_promotions(&self) {
        self.signing_key_promotions_total.inc();
    }

    pub fn increment_signing_key_regenerations(&self) {
        self.signing_key_regenerations_total.inc();
    }

    pub fn set_trust_store_slots(&self, count: usize) {
        self.trust_store_slots
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    pub fn set_service_account_issuers(&self, active: usize, trusted: usize) {
        self.service_account_issuers
            .with_label_values(&["active"])
            .set(i64::try_from(active).unwrap_or(i64::MAX));
        self.service_account_issuers
            .with_label_values(&["trusted"])
            .set(i64::try_from(trusted).unwrap_or(i64::MAX));
    }

    /// Render every metric in the Prometheus text exposition format
    pub fn encode(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
