//! Prometheus instrumentation for Parley.
//!
//! Session, traffic and channel figures go through the `metrics` facade; when
//! the exporter is disabled no recorder is installed and every call is a no-op.

use crate::handlers::ServerError;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const SESSIONS_OPENED: &str = "parley_sessions_opened_total";
    pub const SESSIONS_LIVE: &str = "parley_sessions_live";
    pub const LINES_QUEUED: &str = "parley_lines_queued_total";
    pub const BYTES_READ: &str = "parley_bytes_read_total";
    pub const CHANNELS: &str = "parley_channels";
    pub const EVENT_SECONDS: &str = "parley_event_seconds";
    pub const FAILURES: &str = "parley_failures_total";
}

/// Register descriptions for every Parley metric.
pub fn init_metrics() {
    metrics::describe_counter!(names::SESSIONS_OPENED, "Sessions accepted since start");
    metrics::describe_gauge!(names::SESSIONS_LIVE, "Sessions with an open socket");
    metrics::describe_counter!(names::LINES_QUEUED, "Lines queued for delivery to clients");
    metrics::describe_counter!(names::BYTES_READ, "Bytes read from client sockets");
    metrics::describe_gauge!(names::CHANNELS, "Channels in the directory");
    metrics::describe_histogram!(
        names::EVENT_SECONDS,
        "Time the event loop spent on one socket event"
    );
    metrics::describe_counter!(names::FAILURES, "Failures by kind");

    info!("Metrics described");
}

/// Install the Prometheus exporter on `port`.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed.
pub fn start_metrics_server(port: u16) -> Result<(), ServerError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| ServerError::Metrics(e.to_string()))?;

    info!(addr = %addr, "Prometheus exporter listening");
    Ok(())
}

/// Count bytes read from a client socket.
pub fn record_bytes(bytes: usize) {
    counter!(names::BYTES_READ).increment(bytes as u64);
}

/// Count a line queued for a client.
pub fn record_line() {
    counter!(names::LINES_QUEUED).increment(1);
}

/// Record how long one socket event took to handle.
pub fn record_event_latency(seconds: f64) {
    histogram!(names::EVENT_SECONDS).record(seconds);
}

/// Update the channel gauge.
pub fn set_channels(count: usize) {
    gauge!(names::CHANNELS).set(count as f64);
}

/// Count a failure, labelled by kind (`accept`, `server_full`, `sendq`).
pub fn record_failure(kind: &'static str) {
    counter!(names::FAILURES, "kind" => kind).increment(1);
}

/// Held by each live connection; the live-session gauge tracks its lifetime.
#[derive(Debug)]
pub struct SessionGauge(());

impl SessionGauge {
    #[must_use]
    pub fn open() -> Self {
        counter!(names::SESSIONS_OPENED).increment(1);
        gauge!(names::SESSIONS_LIVE).increment(1.0);
        Self(())
    }
}

impl Drop for SessionGauge {
    fn drop(&mut self) {
        gauge!(names::SESSIONS_LIVE).decrement(1.0);
    }
}
