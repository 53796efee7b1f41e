//! Prometheus metrics for zone and Corefile persistence

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter_vec, register_int_gauge, Encoder, IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    /// Write-path commits by operation and outcome
    pub static ref COMMITS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "coredns_api_commits_total",
        "Zone changes pushed through the write path",
        &["operation", "result"]
    ).unwrap();

    /// Compensating writes after a failed Corefile write
    pub static ref COMPENSATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "coredns_api_compensations_total",
        "Rollbacks of zone files after a failed Corefile write",
        &["result"]
    ).unwrap();

    /// Zone files read during bootstrap or on cache miss
    pub static ref ZONE_LOADS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "coredns_api_zone_loads_total",
        "Zone files parsed into the cache",
        &["result"]
    ).unwrap();

    /// Domains currently cached
    pub static ref DOMAINS: IntGauge = register_int_gauge!(
        "coredns_api_domains",
        "Number of domains in the cache"
    ).unwrap();
}

pub fn record_commit(operation: &str, success: bool) {
    COMMITS_TOTAL
        .with_label_values(&[operation, outcome(success)])
        .inc();
}

pub fn record_compensation(success: bool) {
    COMPENSATIONS_TOTAL
        .with_label_values(&[outcome(success)])
        .inc();
}

pub fn record_zone_load(success: bool) {
    ZONE_LOADS_TOTAL
        .with_label_values(&[outcome(success)])
        .inc();
}

pub fn set_domain_count(count: usize) {
    DOMAINS.set(count as i64);
}

fn outcome(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

/// Text exposition of every registered metric
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        log::warn!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
