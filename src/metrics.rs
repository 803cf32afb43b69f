//! Prometheus metrics for the bot connection and REST traffic.
//!
//! This module provides metrics for:
//! - REST request latency and failures
//! - Gateway message processing latency
//! - Gateway reconnects, heartbeats and dispatched events
//! - Commands answered

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::debug;

// === Metric Name Constants ===

/// REST request latency metric name.
pub const METRIC_HTTP_REQUEST_LATENCY: &str = "api_request_latency_ms";
/// Gateway message latency metric name.
pub const METRIC_WS_MESSAGE_LATENCY: &str = "ws_message_latency_ms";
/// REST requests counter metric name.
pub const METRIC_API_REQUESTS: &str = "api_requests_total";
/// REST failures counter metric name.
pub const METRIC_API_FAILURES: &str = "api_failures_total";
/// Gateway messages received counter metric name.
pub const METRIC_WS_MESSAGES_RECEIVED: &str = "ws_messages_received_total";
/// Gateway reconnects counter metric name.
pub const METRIC_WS_RECONNECTS: &str = "ws_reconnects_total";
/// Heartbeats sent counter metric name.
pub const METRIC_HEARTBEATS: &str = "ws_heartbeats_total";
/// Dispatched events counter metric name.
pub const METRIC_EVENTS_DISPATCHED: &str = "events_dispatched_total";
/// Commands answered counter metric name.
pub const METRIC_COMMANDS_ANSWERED: &str = "commands_answered_total";

/// Install the Prometheus recorder and describe all metrics.
/// Call this once at startup; the handle renders `/metrics`.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_histogram!(
        METRIC_HTTP_REQUEST_LATENCY,
        "Bot REST request latency in milliseconds"
    );
    describe_histogram!(
        METRIC_WS_MESSAGE_LATENCY,
        "Gateway message processing latency in milliseconds"
    );

    describe_counter!(METRIC_API_REQUESTS, "Total number of REST requests sent");
    describe_counter!(METRIC_API_FAILURES, "Total number of REST requests that failed");
    describe_counter!(
        METRIC_WS_MESSAGES_RECEIVED,
        "Total number of gateway messages received"
    );
    describe_counter!(METRIC_WS_RECONNECTS, "Total number of gateway reconnections");
    describe_counter!(METRIC_HEARTBEATS, "Total number of heartbeats sent");
    describe_counter!(
        METRIC_EVENTS_DISPATCHED,
        "Total number of gateway events handed to consumers"
    );
    describe_counter!(METRIC_COMMANDS_ANSWERED, "Total number of commands answered");

    debug!("Metrics initialized");
    Ok(handle)
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Record REST request latency.
pub fn record_http_latency(start: Instant, endpoint: &'static str) {
    histogram!(METRIC_HTTP_REQUEST_LATENCY, "endpoint" => endpoint).record(elapsed_ms(start));
}

/// Record gateway message processing latency.
pub fn record_ws_message_latency(start: Instant) {
    histogram!(METRIC_WS_MESSAGE_LATENCY).record(elapsed_ms(start));
}

/// Increment REST requests counter.
pub fn inc_api_requests(endpoint: &'static str) {
    counter!(METRIC_API_REQUESTS, "endpoint" => endpoint).increment(1);
}

/// Increment REST failures counter.
pub fn inc_api_failures(endpoint: &'static str) {
    counter!(METRIC_API_FAILURES, "endpoint" => endpoint).increment(1);
}

/// Increment gateway messages received counter.
pub fn inc_ws_messages_received() {
    counter!(METRIC_WS_MESSAGES_RECEIVED).increment(1);
}

/// Increment gateway reconnects counter.
pub fn inc_ws_reconnects() {
    counter!(METRIC_WS_RECONNECTS).increment(1);
}

/// Increment heartbeats counter.
pub fn inc_heartbeats() {
    counter!(METRIC_HEARTBEATS).increment(1);
}

/// Increment dispatched events counter.
pub fn inc_events_dispatched() {
    counter!(METRIC_EVENTS_DISPATCHED).increment(1);
}

/// Increment commands answered counter.
pub fn inc_commands_answered() {
    counter!(METRIC_COMMANDS_ANSWERED).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn elapsed_ms_measures_time() {
        let start = Instant::now();
        sleep(Duration::from_millis(10));
        assert!(elapsed_ms(start) >= 9.0);
    }

    #[test]
    fn recording_without_recorder_is_a_noop() {
        inc_api_requests("me");
        record_http_latency(Instant::now(), "me");
        inc_ws_reconnects();
    }
}
