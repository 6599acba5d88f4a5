//! Observability for the duplex runtime.
//!
//! - **Logging**: `tracing-subscriber` with JSON or pretty output ([`logging`])
//! - **Metrics**: Prometheus-format metrics via the `metrics` crate ([`metrics`])
//!
//! # Example
//!
//! ```rust,no_run
//! use duplex_telemetry::{init_logging, init_metrics, LogConfig, MetricsConfig};
//!
//! init_logging(&LogConfig::development())?;
//! init_metrics(&MetricsConfig::default())?;
//! # Ok::<(), duplex_telemetry::TelemetryError>(())
//! ```
//!
//! # Metrics Route
//!
//! When enabled, the server's metrics route renders:
//!
//! ```text
//! # HELP duplex_rpc_requests_total Total number of RPC calls handled
//! # TYPE duplex_rpc_requests_total counter
//! duplex_rpc_requests_total{method="/users.v1.Users/Get",code="OK"} 1234
//! duplex_rpc_requests_total{method="/users.v1.Users/Get",code="NOT_FOUND"} 56
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig, LogFormat};
pub use metrics::{init_metrics, render_metrics, MetricsConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
