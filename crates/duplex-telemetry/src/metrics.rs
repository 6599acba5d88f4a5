//! Prometheus metrics.
//!
//! Metrics are recorded through the `metrics` facade. [`init_metrics`]
//! installs a Prometheus recorder without a listener of its own; the server
//! renders it on its metrics route via [`render_metrics`].
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `duplex_rpc_requests_total` | Counter | `method`, `code` |
//! | `duplex_rpc_request_duration_seconds` | Histogram | `method` |
//! | `duplex_http_requests_total` | Counter | `method`, `path`, `status` |
//! | `duplex_http_request_duration_seconds` | Histogram | `method`, `path` |
//! | `duplex_connections_active` | Gauge | - |
//! | `duplex_health_status` | Gauge | `service` |

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::error::TelemetryError;
use crate::TelemetryResult;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metric names.
pub mod names {
    /// RPC calls by method and code.
    pub const RPC_REQUESTS_TOTAL: &str = "duplex_rpc_requests_total";
    /// RPC call latency.
    pub const RPC_REQUEST_DURATION: &str = "duplex_rpc_request_duration_seconds";
    /// HTTP requests by method, path and status.
    pub const HTTP_REQUESTS_TOTAL: &str = "duplex_http_requests_total";
    /// HTTP request latency.
    pub const HTTP_REQUEST_DURATION: &str = "duplex_http_request_duration_seconds";
    /// Open connections.
    pub const CONNECTIONS_ACTIVE: &str = "duplex_connections_active";
    /// Last recorded serving status per health service (`""` is overall).
    pub const HEALTH_STATUS: &str = "duplex_health_status";
}

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsConfig {
    /// Whether a recorder is installed.
    pub enabled: bool,

    /// Histogram buckets for durations, in seconds.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // 1ms .. 10s
            duration_buckets: vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ],
        }
    }
}

/// Installs the Prometheus recorder.
///
/// Idempotent: a second call after a successful one returns `Ok(())`.
///
/// # Errors
///
/// Returns [`TelemetryError::MetricsInit`] if the buckets are invalid or
/// another recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled || METRICS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .set_buckets(&config.duration_buckets)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?
        .install_recorder()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    // A concurrent initializer may have won the race; its handle is equivalent.
    let _ = METRICS_HANDLE.set(handle);
    register_metric_descriptions();
    Ok(())
}

/// Returns the recorder handle if metrics were initialized.
pub fn metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

/// Renders all metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_counter!(names::RPC_REQUESTS_TOTAL, "Total number of RPC calls handled");
    describe_histogram!(names::RPC_REQUEST_DURATION, "RPC call duration in seconds");
    describe_counter!(names::HTTP_REQUESTS_TOTAL, "Total number of HTTP requests handled");
    describe_histogram!(names::HTTP_REQUEST_DURATION, "HTTP request duration in seconds");
    describe_gauge!(names::CONNECTIONS_ACTIVE, "Number of open client connections");
    describe_gauge!(names::HEALTH_STATUS, "Serving status per health service");
}

/// Records a completed RPC call.
pub fn record_rpc(method: &str, code: &str, duration: Duration) {
    counter!(
        names::RPC_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "code" => code.to_string()
    )
    .increment(1);
    histogram!(names::RPC_REQUEST_DURATION, "method" => method.to_string()).record(duration.as_secs_f64());
}

/// Records a completed HTTP request.
pub fn record_http(method: &str, path: &str, status: u16, duration: Duration) {
    counter!(
        names::HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(
        names::HTTP_REQUEST_DURATION,
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Records the serving status of a health service.
pub fn record_health_status(service: &str, status: i32) {
    gauge!(names::HEALTH_STATUS, "service" => service.to_string()).set(f64::from(status));
}

/// Tracks one open connection; decrements the gauge on drop.
#[derive(Debug)]
pub struct ConnectionGuard {
    _private: (),
}

impl ConnectionGuard {
    /// Increments the open-connection gauge.
    #[must_use]
    pub fn new() -> Self {
        gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
        Self { _private: () }
    }
}

impl Default for ConnectionGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
    }
}
