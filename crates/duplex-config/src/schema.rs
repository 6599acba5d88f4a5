//! Configuration schema types.
//!
//! Every section rejects unknown keys and fills missing ones from the
//! `default_*` functions below, so a partial file is always a complete
//! configuration.

use std::path::PathBuf;

use duplex_telemetry::logging::LogConfig;
use serde::{Deserialize, Serialize};

/// `[server]` section.
///
/// # Example
///
/// ```
/// use duplex_config::ServerSettings;
///
/// let settings = ServerSettings::default();
/// assert_eq!(settings.address, "0.0.0.0:8088");
/// assert_eq!(settings.health_path, "/internal/health");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerSettings {
    /// Service name, used in logs.
    #[serde(default = "default_name")]
    pub name: String,

    /// Listen address (e.g. `"0.0.0.0:8088"`).
    #[serde(default = "default_address")]
    pub address: String,

    /// PEM certificate chain. Set together with `tls_key_file`.
    #[serde(default)]
    pub tls_cert_file: Option<PathBuf>,

    /// PEM private key. Set together with `tls_cert_file`.
    #[serde(default)]
    pub tls_key_file: Option<PathBuf>,

    /// Request header and body read timeout in seconds.
    #[serde(default = "default_timeout")]
    pub read_timeout_secs: u64,

    /// Plain HTTP handler timeout in seconds.
    #[serde(default = "default_timeout")]
    pub write_timeout_secs: u64,

    /// Graceful shutdown budget in seconds.
    #[serde(default = "default_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Path prefix the REST gateway is mounted under.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// Sort overlapping HTTP routes by specificity.
    #[serde(default = "default_true")]
    pub routes_prioritization: bool,

    /// Development-only route that shuts the server down when requested.
    #[serde(default)]
    pub shutdown_hook: Option<String>,

    /// Path of the HTTP health route.
    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// Serve Prometheus metrics.
    #[serde(default)]
    pub metrics: bool,

    /// Path of the metrics route.
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,

    /// Install the correlation-id interceptor.
    #[serde(default = "default_true")]
    pub correlation_id: bool,

    /// Install the panic recovery interceptor.
    #[serde(default = "default_true")]
    pub recovery: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            name: default_name(),
            address: default_address(),
            tls_cert_file: None,
            tls_key_file: None,
            read_timeout_secs: default_timeout(),
            write_timeout_secs: default_timeout(),
            shutdown_timeout_secs: default_timeout(),
            api_prefix: default_api_prefix(),
            routes_prioritization: true,
            shutdown_hook: None,
            health_path: default_health_path(),
            metrics: false,
            metrics_path: default_metrics_path(),
            correlation_id: true,
            recovery: true,
        }
    }
}

impl ServerSettings {
    /// Whether both TLS files are configured.
    #[must_use]
    pub fn tls_enabled(&self) -> bool {
        self.tls_cert_file.is_some() && self.tls_key_file.is_some()
    }
}

fn default_name() -> String {
    "duplex".to_string()
}

fn default_address() -> String {
    "0.0.0.0:8088".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_api_prefix() -> String {
    "/".to_string()
}

fn default_health_path() -> String {
    "/internal/health".to_string()
}

fn default_metrics_path() -> String {
    "/internal/metrics".to_string()
}

fn default_true() -> bool {
    true
}

/// `[auth]` section.
///
/// Authentication is off unless `shared_secret` is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AuthSettings {
    /// Bearer token accepted by the shared-secret authenticator.
    #[serde(default)]
    pub shared_secret: Option<String>,

    /// Full RPC method names and HTTP paths that skip authentication.
    #[serde(default)]
    pub allow_list: Vec<String>,
}

impl AuthSettings {
    /// Whether an authenticator should be installed.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.shared_secret.is_some()
    }
}

/// `[health]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct HealthSettings {
    /// Seconds between background check passes.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Per-probe timeout in seconds.
    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            timeout_secs: default_probe_timeout(),
        }
    }
}

fn default_interval() -> u64 {
    60
}

fn default_probe_timeout() -> u64 {
    1
}

/// `[telemetry]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TelemetrySettings {
    /// `[telemetry.logging]`.
    #[serde(default)]
    pub logging: LogConfig,
}
