//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gatehouse_routes_total` (counter): dispatched requests by outcome
//! - `gatehouse_route_duration_seconds` (histogram): time to a response head
//! - `gatehouse_handler_panics_total` (counter)
//! - `gatehouse_sessions_active` (gauge): live sessions in the store
//! - `gatehouse_streams_opened_total` / `gatehouse_streams_closed_total` (counters)
//! - `gatehouse_stream_panics_total` (counter): streams closed by a task panic
//! - `gatehouse_substreams_opened_total` (counter): by kind

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(address: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(address)
        .install()?;
    tracing::info!(%address, "Metrics endpoint listening");
    Ok(())
}

pub fn record_route(outcome: &'static str, start: Instant) {
    counter!("gatehouse_routes_total", "outcome" => outcome).increment(1);
    histogram!("gatehouse_route_duration_seconds", "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

pub fn handler_panicked() {
    counter!("gatehouse_handler_panics_total").increment(1);
}

pub fn set_sessions_active(count: usize) {
    gauge!("gatehouse_sessions_active").set(count as f64);
}

pub fn stream_opened() {
    counter!("gatehouse_streams_opened_total").increment(1);
}

pub fn stream_closed() {
    counter!("gatehouse_streams_closed_total").increment(1);
}

pub fn stream_panicked() {
    counter!("gatehouse_stream_panics_total").increment(1);
}

pub fn substream_opened(kind: &'static str) {
    counter!("gatehouse_substreams_opened_total", "kind" => kind).increment(1);
}
