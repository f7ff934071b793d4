//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_rejected_exiting_total` (counter): requests refused while draining
//! - `gateway_log_segments_opened_total` (counter): log rotations
//! - `gateway_log_sweep_total` (counter): retention results by outcome
//! - `gateway_sink_events_total` (counter): coordinator events by source, kind
//! - `gateway_shutdown_requests_total` (counter): exit requests by source, mode
//! - `gateway_supervised_panics_total` (counter): panics caught by task
//! - `gateway_lifecycle_state` (gauge): 0 starting .. 3 stopped
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::lifecycle::context::LifecycleState;
use crate::lifecycle::exit_mode::ExitMode;
use crate::lifecycle::sink::SinkSource;
use crate::observability::retention::SweepReport;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let method = method.to_string();
    let status = status.to_string();
    metrics::counter!(
        "gateway_requests_total",
        "method" => method.clone(),
        "status" => status.clone()
    )
    .increment(1);
    metrics::histogram!(
        "gateway_request_duration_seconds",
        "method" => method,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_rejected_exiting() {
    metrics::counter!("gateway_rejected_exiting_total").increment(1);
}

pub fn record_segment_opened() {
    metrics::counter!("gateway_log_segments_opened_total").increment(1);
}

pub fn record_sweep(report: &SweepReport) {
    metrics::counter!("gateway_log_sweep_total", "outcome" => "compressed")
        .increment(report.compressed as u64);
    metrics::counter!("gateway_log_sweep_total", "outcome" => "removed")
        .increment(report.removed as u64);
    metrics::counter!("gateway_log_sweep_total", "outcome" => "error")
        .increment(report.errors as u64);
}

pub fn record_sink_event(source: SinkSource, kind: &'static str) {
    metrics::counter!(
        "gateway_sink_events_total",
        "source" => source.as_str(),
        "kind" => kind
    )
    .increment(1);
}

pub fn record_shutdown_request(source: SinkSource, mode: ExitMode) {
    metrics::counter!(
        "gateway_shutdown_requests_total",
        "source" => source.as_str(),
        "mode" => mode.to_string()
    )
    .increment(1);
}

pub fn record_supervised_panic(task: &'static str) {
    metrics::counter!("gateway_supervised_panics_total", "task" => task).increment(1);
}

pub fn record_lifecycle_state(state: LifecycleState) {
    let value = match state {
        LifecycleState::Starting => 0.0,
        LifecycleState::Running => 1.0,
        LifecycleState::Draining => 2.0,
        LifecycleState::Stopped => 3.0,
    };
    metrics::gauge!("gateway_lifecycle_state").set(value);
}
