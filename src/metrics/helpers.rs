//! Metrics helper structs for convenient metric recording

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use super::{
    BOOKKEEPING_FAILURES_TOTAL, DELIVERY_ATTEMPTS_TOTAL, DISPATCH_TOTAL, TRANSPORT_ERRORS_TOTAL,
    TRANSPORT_LATENCY,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording delivery metrics
pub struct DeliveryMetrics;

impl DeliveryMetrics {
    /// Record a finished channel attempt
    pub fn record_attempt(channel: &str, outcome: &str) {
        DELIVERY_ATTEMPTS_TOTAL
            .with_label_values(&[channel, outcome])
            .inc();
    }

    /// Record a dispatch that delivered on at least one channel
    pub fn record_delivered() {
        DISPATCH_TOTAL.with_label_values(&["delivered"]).inc();
    }

    /// Record a dispatch where every channel was skipped or failed
    pub fn record_failed() {
        DISPATCH_TOTAL.with_label_values(&["failed"]).inc();
    }

    /// Record a dispatch rejected before any send
    pub fn record_config_error() {
        DISPATCH_TOTAL.with_label_values(&["config_error"]).inc();
    }
}

/// Helper struct for recording bookkeeping metrics
pub struct BookkeepingMetrics;

impl BookkeepingMetrics {
    pub fn record_failure(kind: &str) {
        BOOKKEEPING_FAILURES_TOTAL.with_label_values(&[kind]).inc();
    }
}

/// Helper struct for recording transport metrics
pub struct TransportMetrics;

impl TransportMetrics {
    /// Record how long a provider call took
    pub fn record_latency(channel: &str, elapsed: Duration) {
        TRANSPORT_LATENCY
            .with_label_values(&[channel])
            .observe(elapsed.as_secs_f64());
    }

    /// Record a failed provider call
    pub fn record_error(channel: &str, kind: &str) {
        TRANSPORT_ERRORS_TOTAL
            .with_label_values(&[channel, kind])
            .inc();
    }
}
