//! Prometheus metrics for OTP delivery.
//!
//! - Delivery metrics (per-channel attempts by outcome, dispatch results)
//! - Bookkeeping metrics (failed `sent_to` writes by kind)
//! - Transport metrics (provider latency, provider errors by kind)

mod helpers;

pub use helpers::{encode_metrics, BookkeepingMetrics, DeliveryMetrics, TransportMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "otp";

lazy_static! {
    // ============================================================================
    // Delivery Metrics
    // ============================================================================

    /// Channel attempts by channel and outcome (sent, failed, skipped)
    pub static ref DELIVERY_ATTEMPTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_delivery_attempts_total", METRIC_PREFIX),
        "Total channel delivery attempts",
        &["channel", "outcome"]
    ).unwrap();

    /// Dispatch calls by result (delivered, failed, config_error)
    pub static ref DISPATCH_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_dispatch_total", METRIC_PREFIX),
        "Total OTP dispatch calls",
        &["result"]
    ).unwrap();

    // ============================================================================
    // Bookkeeping Metrics
    // ============================================================================

    /// Failed sent_to writes (not_found, lookup, save)
    pub static ref BOOKKEEPING_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_bookkeeping_failures_total", METRIC_PREFIX),
        "Total failures while recording the delivery destination",
        &["kind"]
    ).unwrap();

    // ============================================================================
    // Transport Metrics
    // ============================================================================

    /// Provider call latency per channel
    pub static ref TRANSPORT_LATENCY: HistogramVec = register_histogram_vec!(
        format!("{}_transport_latency_seconds", METRIC_PREFIX),
        "Provider call latency in seconds",
        &["channel"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).unwrap();

    /// Provider call errors per channel and kind (timeout, request, rejected, ...)
    pub static ref TRANSPORT_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_transport_errors_total", METRIC_PREFIX),
        "Total provider call errors",
        &["channel", "kind"]
    ).unwrap();
}
