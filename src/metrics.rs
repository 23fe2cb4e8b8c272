//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic; the binary registers the instruments,
//! library users may export [`REGISTRY`] however they like.

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, IntCounterVec, IntGaugeVec, Opts, Registry};
use std::time::Duration;

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref CACHE_PASSES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("socialcache_passes_total", "Total number of completed cache passes"),
        &["cache_name", "kind", "status"]
    ).expect("metric can be created");
    pub static ref CACHE_PASS_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "socialcache_pass_duration_seconds",
            "Cache pass duration in seconds"
        ).buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["cache_name", "kind"]
    ).expect("metric can be created");
    pub static ref CACHE_PENDING_OPERATIONS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("socialcache_pending_operations", "Operations queued but not yet synced"),
        &["cache_name"]
    ).expect("metric can be created");
    pub static ref CACHE_RESULT_SIZE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("socialcache_result_size", "Records in the last completed result set"),
        &["cache_name"]
    ).expect("metric can be created");
    pub static ref SIDE_RESOURCE_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("socialcache_side_resource_failures_total", "Files that could not be removed"),
        &["cache_name"]
    ).expect("metric can be created");
}

/// Record one finished pass.
pub fn observe_pass(cache_name: &str, kind: &str, status: &str, elapsed: Duration) {
    CACHE_PASSES_TOTAL
        .with_label_values(&[cache_name, kind, status])
        .inc();
    CACHE_PASS_DURATION_SECONDS
        .with_label_values(&[cache_name, kind])
        .observe(elapsed.as_secs_f64());
}

/// Initialize metrics registry.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(CACHE_PASSES_TOTAL.clone()))
        .expect("CACHE_PASSES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(CACHE_PASS_DURATION_SECONDS.clone()))
        .expect("CACHE_PASS_DURATION_SECONDS can be registered");
    REGISTRY
        .register(Box::new(CACHE_PENDING_OPERATIONS.clone()))
        .expect("CACHE_PENDING_OPERATIONS can be registered");
    REGISTRY
        .register(Box::new(CACHE_RESULT_SIZE.clone()))
        .expect("CACHE_RESULT_SIZE can be registered");
    REGISTRY
        .register(Box::new(SIDE_RESOURCE_FAILURES_TOTAL.clone()))
        .expect("SIDE_RESOURCE_FAILURES_TOTAL can be registered");

    tracing::info!("Metrics registry initialized");
}
