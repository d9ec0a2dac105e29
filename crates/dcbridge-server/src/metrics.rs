//! Metrics collection and export for dcbridge.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use dcbridge_core::RelayStats;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const EVENTS_TOTAL: &str = "dcbridge_events_total";
    pub const EVENT_LATENCY_SECONDS: &str = "dcbridge_event_latency_seconds";
    pub const HUB_USERS: &str = "dcbridge_hub_users";
    pub const OPLIST_REBROADCASTS_TOTAL: &str = "dcbridge_oplist_rebroadcasts_total";
    pub const RELAY_CHUNKS_TOTAL: &str = "dcbridge_relay_chunks_total";
    pub const IRC_CONNECTIONS_TOTAL: &str = "dcbridge_irc_connections_total";
    pub const IRC_CONNECTED: &str = "dcbridge_irc_connected";
    pub const ERRORS_TOTAL: &str = "dcbridge_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(names::EVENTS_TOTAL, "IRC events dispatched, by kind");
    metrics::describe_histogram!(
        names::EVENT_LATENCY_SECONDS,
        "Event handling latency in seconds"
    );
    metrics::describe_gauge!(names::HUB_USERS, "Synthetic hub users currently materialized");
    metrics::describe_counter!(
        names::OPLIST_REBROADCASTS_TOTAL,
        "Operator list rebroadcasts to the hub"
    );
    metrics::describe_counter!(names::RELAY_CHUNKS_TOTAL, "Chunks relayed from hub to IRC");
    metrics::describe_counter!(
        names::IRC_CONNECTIONS_TOTAL,
        "IRC connections established since start"
    );
    metrics::describe_gauge!(names::IRC_CONNECTED, "1 while connected to IRC");
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a dispatched event.
pub fn record_event(kind: &'static str) {
    counter!(names::EVENTS_TOTAL, "kind" => kind).increment(1);
}

/// Record event handling latency.
pub fn record_latency(seconds: f64) {
    histogram!(names::EVENT_LATENCY_SECONDS).record(seconds);
}

/// Update the materialized user count.
pub fn set_hub_users(count: usize) {
    gauge!(names::HUB_USERS).set(count as f64);
}

/// Record operator list rebroadcasts.
pub fn record_oplist_rebroadcasts(count: u64) {
    if count > 0 {
        counter!(names::OPLIST_REBROADCASTS_TOTAL).increment(count);
    }
}

/// Record one relay tick.
pub fn record_relay(stats: RelayStats) {
    if stats.chunks > 0 {
        counter!(names::RELAY_CHUNKS_TOTAL).increment(stats.chunks as u64);
    }
}

/// Record an error.
pub fn record_error(error_type: &str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type.to_string()).increment(1);
}

/// Metrics guard that tracks an IRC connection's lifetime.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        counter!(names::IRC_CONNECTIONS_TOTAL).increment(1);
        gauge!(names::IRC_CONNECTED).set(1.0);
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        gauge!(names::IRC_CONNECTED).set(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorders_without_exporter() {
        // No recorder installed: every call is a no-op.
        let _guard = ConnectionMetricsGuard::new();
        record_event("join");
        record_relay(RelayStats {
            chunks: 2,
            chars: 10,
        });
        record_oplist_rebroadcasts(0);
        set_hub_users(3);
        record_error("missing_hub_user");
    }
}
