//! Metrics collection and export for Parley.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use parley_core::Fanout;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "parley_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "parley_connections_active";
    pub const EVENTS_TOTAL: &str = "parley_events_total";
    pub const DELIVERIES_TOTAL: &str = "parley_deliveries_total";
    pub const DELIVERY_FAILURES_TOTAL: &str = "parley_delivery_failures_total";
    pub const FRAME_BYTES: &str = "parley_frame_bytes";
    pub const CHANNELS_ACTIVE: &str = "parley_channels_active";
    pub const LATENCY_SECONDS: &str = "parley_latency_seconds";
    pub const ERRORS_TOTAL: &str = "parley_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_counter!(names::EVENTS_TOTAL, "Join, leave and message events applied");
    metrics::describe_counter!(names::DELIVERIES_TOTAL, "Events handed to recipient sinks");
    metrics::describe_counter!(
        names::DELIVERY_FAILURES_TOTAL,
        "Events that could not be handed to a recipient"
    );
    metrics::describe_counter!(names::FRAME_BYTES, "Total bytes of frames processed");
    metrics::describe_gauge!(names::CHANNELS_ACTIVE, "Current number of channels");
    metrics::describe_histogram!(
        names::LATENCY_SECONDS,
        "Inbound frame processing latency in seconds"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record an applied event and the outcome of its fan-out.
pub fn record_fanout(kind: &'static str, fanout: &Fanout) {
    counter!(names::EVENTS_TOTAL, "kind" => kind).increment(1);
    counter!(names::DELIVERIES_TOTAL).increment(fanout.delivered as u64);
    counter!(names::DELIVERY_FAILURES_TOTAL).increment(fanout.failures.len() as u64);
}

/// Record frame bytes.
pub fn record_frame(bytes: usize, direction: &'static str) {
    counter!(names::FRAME_BYTES, "direction" => direction).increment(bytes as u64);
}

/// Record frame processing latency.
pub fn record_latency(seconds: f64) {
    histogram!(names::LATENCY_SECONDS).record(seconds);
}

/// Update channel count.
pub fn set_active_channels(count: usize) {
    gauge!(names::CHANNELS_ACTIVE).set(count as f64);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
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
        record_disconnection();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::BroadcastHub;

    #[test]
    fn test_metrics_without_recorder() {
        // Recording is a no-op until an exporter is installed
        let _guard = ConnectionMetricsGuard::new();

        let hub = BroadcastHub::new();
        hub.create_channel("general").unwrap();
        let fanout = hub.on_join("general", "alice").unwrap();
        record_fanout("join", &fanout);
        record_frame(12, "inbound");
        set_active_channels(1);
    }
}
