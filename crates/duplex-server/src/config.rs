//! Server configuration types.
//!
//! [`ServerConfig`] is immutable and always valid: it can only be obtained
//! from [`ServerConfigBuilder::build`] or [`ServerConfig::from_settings`],
//! both of which validate.
//!
//! # Example
//!
//! ```rust
//! use duplex_server::ServerConfig;
//! use std::time::Duration;
//!
//! let config = ServerConfig::builder()
//!     .address("127.0.0.1:0")
//!     .shutdown_timeout(Duration::from_secs(5))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
//! assert_eq!(config.health_path(), "/internal/health");
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use duplex_config::DuplexConfig;
use duplex_health::HealthConfig;
use duplex_rpc::frame::DEFAULT_MAX_MESSAGE_LEN;

use crate::error::ServerError;
use crate::tls::TlsFiles;

/// Default listen address.
pub const DEFAULT_ADDRESS: &str = "0.0.0.0:8088";

/// Default read, write and shutdown timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default HTTP health path.
pub const DEFAULT_HEALTH_PATH: &str = "/internal/health";

/// Default metrics path.
pub const DEFAULT_METRICS_PATH: &str = "/internal/metrics";

/// Validated server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    name: String,
    address: SocketAddr,
    tls: Option<TlsFiles>,
    read_timeout: Duration,
    write_timeout: Duration,
    shutdown_timeout: Duration,
    api_prefix: String,
    routes_prioritization: bool,
    shutdown_hook: Option<String>,
    health_path: String,
    metrics: bool,
    metrics_path: String,
    correlation_id: bool,
    recovery: bool,
    health: HealthConfig,
    max_message_len: usize,
}

impl ServerConfig {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::new()
    }

    /// Converts loaded settings into a runtime configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] if the settings are invalid.
    pub fn from_settings(settings: &DuplexConfig) -> Result<Self, ServerError> {
        settings.validate()?;
        let server = &settings.server;
        let mut builder = Self::builder()
            .name(&server.name)
            .address(&server.address)
            .read_timeout(Duration::from_secs(server.read_timeout_secs))
            .write_timeout(Duration::from_secs(server.write_timeout_secs))
            .shutdown_timeout(Duration::from_secs(server.shutdown_timeout_secs))
            .api_prefix(&server.api_prefix)
            .routes_prioritization(server.routes_prioritization)
            .health_path(&server.health_path)
            .metrics(server.metrics)
            .metrics_path(&server.metrics_path)
            .correlation_id(server.correlation_id)
            .recovery(server.recovery)
            .health(HealthConfig {
                interval: Duration::from_secs(settings.health.interval_secs),
                timeout: Duration::from_secs(settings.health.timeout_secs),
            });
        if let (Some(cert), Some(key)) = (&server.tls_cert_file, &server.tls_key_file) {
            builder = builder.tls(cert, key);
        }
        if let Some(hook) = &server.shutdown_hook {
            builder = builder.shutdown_hook(hook);
        }
        builder.build()
    }

    /// Service name used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Listen address.
    #[must_use]
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// TLS files, if TLS is enabled.
    #[must_use]
    pub fn tls(&self) -> Option<&TlsFiles> {
        self.tls.as_ref()
    }

    /// Bound on reading request headers and body.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Bound on plain HTTP handler execution.
    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Bound on the drain phase of shutdown.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Path prefix of the REST gateway.
    #[must_use]
    pub fn api_prefix(&self) -> &str {
        &self.api_prefix
    }

    /// Whether overlapping HTTP routes are sorted by specificity.
    #[must_use]
    pub fn routes_prioritization(&self) -> bool {
        self.routes_prioritization
    }

    /// Path of the development shutdown hook, if enabled.
    #[must_use]
    pub fn shutdown_hook(&self) -> Option<&str> {
        self.shutdown_hook.as_deref()
    }

    /// Path of the HTTP health route.
    #[must_use]
    pub fn health_path(&self) -> &str {
        &self.health_path
    }

    /// Whether the metrics route is served.
    #[must_use]
    pub fn metrics(&self) -> bool {
        self.metrics
    }

    /// Path of the metrics route.
    #[must_use]
    pub fn metrics_path(&self) -> &str {
        &self.metrics_path
    }

    /// Whether the correlation-id interceptor is installed.
    #[must_use]
    pub fn correlation_id(&self) -> bool {
        self.correlation_id
    }

    /// Whether the recovery interceptor is installed.
    #[must_use]
    pub fn recovery(&self) -> bool {
        self.recovery
    }

    /// Health check timing.
    #[must_use]
    pub fn health(&self) -> HealthConfig {
        self.health
    }

    /// Largest accepted RPC message, in bytes.
    #[must_use]
    pub fn max_message_len(&self) -> usize {
        self.max_message_len
    }

    fn validate(&self) -> Result<(), ServerError> {
        for (name, timeout) in [
            ("read timeout", self.read_timeout),
            ("write timeout", self.write_timeout),
            ("shutdown timeout", self.shutdown_timeout),
            ("health interval", self.health.interval),
            ("health timeout", self.health.timeout),
        ] {
            if timeout.is_zero() {
                return Err(ServerError::config(format!("{name} must be greater than 0")));
            }
        }
        let mut paths = vec![
            ("api prefix", self.api_prefix.as_str()),
            ("health path", self.health_path.as_str()),
            ("metrics path", self.metrics_path.as_str()),
        ];
        if let Some(hook) = &self.shutdown_hook {
            paths.push(("shutdown hook", hook));
        }
        for (name, path) in paths {
            if !path.starts_with('/') {
                return Err(ServerError::config(format!("{name} must start with '/': {path}")));
            }
        }
        if self.max_message_len == 0 {
            return Err(ServerError::config("max message length must be greater than 0"));
        }
        Ok(())
    }
}

/// Builder for [`ServerConfig`].
///
/// Setters only record values; everything is checked once in
/// [`build`](Self::build), so the order of calls does not matter.
#[derive(Debug, Clone)]
pub struct ServerConfigBuilder {
    name: String,
    address: String,
    tls: Option<TlsFiles>,
    read_timeout: Duration,
    write_timeout: Duration,
    shutdown_timeout: Duration,
    api_prefix: String,
    routes_prioritization: bool,
    shutdown_hook: Option<String>,
    health_path: String,
    metrics: bool,
    metrics_path: String,
    correlation_id: bool,
    recovery: bool,
    health: HealthConfig,
    max_message_len: usize,
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerConfigBuilder {
    /// Creates a builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: "duplex".to_string(),
            address: DEFAULT_ADDRESS.to_string(),
            tls: None,
            read_timeout: DEFAULT_TIMEOUT,
            write_timeout: DEFAULT_TIMEOUT,
            shutdown_timeout: DEFAULT_TIMEOUT,
            api_prefix: "/".to_string(),
            routes_prioritization: true,
            shutdown_hook: None,
            health_path: DEFAULT_HEALTH_PATH.to_string(),
            metrics: false,
            metrics_path: DEFAULT_METRICS_PATH.to_string(),
            correlation_id: true,
            recovery: true,
            health: HealthConfig::default(),
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
        }
    }

    /// Sets the service name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the listen address (e.g. `"0.0.0.0:8088"`, `"127.0.0.1:0"`).
    #[must_use]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Enables TLS with a PEM certificate chain and key.
    #[must_use]
    pub fn tls(mut self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.tls = Some(TlsFiles::new(cert, key));
        self
    }

    /// Sets the read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets the write timeout.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Sets the shutdown timeout.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Sets the gateway path prefix.
    #[must_use]
    pub fn api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into();
        self
    }

    /// Enables or disables route prioritization.
    #[must_use]
    pub fn routes_prioritization(mut self, enabled: bool) -> Self {
        self.routes_prioritization = enabled;
        self
    }

    /// Enables the development shutdown hook at `path`.
    #[must_use]
    pub fn shutdown_hook(mut self, path: impl Into<String>) -> Self {
        self.shutdown_hook = Some(path.into());
        self
    }

    /// Sets the HTTP health path.
    #[must_use]
    pub fn health_path(mut self, path: impl Into<String>) -> Self {
        self.health_path = path.into();
        self
    }

    /// Enables or disables the metrics route.
    #[must_use]
    pub fn metrics(mut self, enabled: bool) -> Self {
        self.metrics = enabled;
        self
    }

    /// Sets the metrics path.
    #[must_use]
    pub fn metrics_path(mut self, path: impl Into<String>) -> Self {
        self.metrics_path = path.into();
        self
    }

    /// Enables or disables the correlation-id interceptor.
    #[must_use]
    pub fn correlation_id(mut self, enabled: bool) -> Self {
        self.correlation_id = enabled;
        self
    }

    /// Enables or disables the recovery interceptor.
    #[must_use]
    pub fn recovery(mut self, enabled: bool) -> Self {
        self.recovery = enabled;
        self
    }

    /// Sets health check timing.
    #[must_use]
    pub fn health(mut self, health: HealthConfig) -> Self {
        self.health = health;
        self
    }

    /// Sets the largest accepted RPC message.
    #[must_use]
    pub fn max_message_len(mut self, len: usize) -> Self {
        self.max_message_len = len;
        self
    }

    /// Validates and builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] if the address does not parse, a
    /// timeout is zero, or a path does not start with `/`.
    pub fn build(self) -> Result<ServerConfig, ServerError> {
        let address = self
            .address
            .parse()
            .map_err(|e| ServerError::config(format!("invalid address '{}': {e}", self.address)))?;
        let config = ServerConfig {
            name: self.name,
            address,
            tls: self.tls,
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
            shutdown_timeout: self.shutdown_timeout,
            api_prefix: self.api_prefix,
            routes_prioritization: self.routes_prioritization,
            shutdown_hook: self.shutdown_hook,
            health_path: self.health_path,
            metrics: self.metrics,
            metrics_path: self.metrics_path,
            correlation_id: self.correlation_id,
            recovery: self.recovery,
            health: self.health,
            max_message_len: self.max_message_len,
        };
        config.validate()?;
        Ok(config)
    }
}
