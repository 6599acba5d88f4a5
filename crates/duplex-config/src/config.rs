//! Main configuration types.
//!
//! This module provides the top-level [`DuplexConfig`] struct and its builder.

use std::net::SocketAddr;

use duplex_telemetry::logging::{create_env_filter, LogConfig};
use serde::{Deserialize, Serialize};

use crate::{AuthSettings, ConfigError, HealthSettings, ServerSettings, TelemetrySettings};

/// Complete duplex configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and the
/// environment.
///
/// # Example
///
/// ```
/// use duplex_config::DuplexConfig;
///
/// let config = DuplexConfig::default();
/// assert_eq!(config.server.address, "0.0.0.0:8088");
/// assert_eq!(config.health.interval_secs, 60);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct DuplexConfig {
    /// Listener, timeouts and built-in routes.
    #[serde(default)]
    pub server: ServerSettings,

    /// Authentication.
    #[serde(default)]
    pub auth: AuthSettings,

    /// Health check scheduling.
    #[serde(default)]
    pub health: HealthSettings,

    /// Logging.
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

impl DuplexConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> DuplexConfigBuilder {
        DuplexConfigBuilder::new()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] or [`ConfigError::ValidationError`] if:
    /// - the server address is not a socket address
    /// - only one of the TLS files is set
    /// - a timeout or the health interval is zero
    /// - the API prefix or a built-in route path does not start with `/`
    /// - the shared secret is empty
    /// - the log level is not a valid filter directive
    pub fn validate(&self) -> Result<(), ConfigError> {
        let server = &self.server;

        if server.address.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::invalid_value(
                "server.address",
                format!("invalid socket address: {}", server.address),
            ));
        }

        if server.tls_cert_file.is_some() != server.tls_key_file.is_some() {
            return Err(ConfigError::validation_error(
                "server.tls_cert_file and server.tls_key_file must be set together",
            ));
        }

        for (field, value) in [
            ("server.read_timeout_secs", server.read_timeout_secs),
            ("server.write_timeout_secs", server.write_timeout_secs),
            ("server.shutdown_timeout_secs", server.shutdown_timeout_secs),
            ("health.interval_secs", self.health.interval_secs),
            ("health.timeout_secs", self.health.timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid_value(field, "must be greater than 0"));
            }
        }

        let mut paths = vec![
            ("server.api_prefix", server.api_prefix.as_str()),
            ("server.health_path", server.health_path.as_str()),
            ("server.metrics_path", server.metrics_path.as_str()),
        ];
        if let Some(hook) = &server.shutdown_hook {
            paths.push(("server.shutdown_hook", hook.as_str()));
        }
        for (field, path) in paths {
            if !path.starts_with('/') {
                return Err(ConfigError::invalid_value(field, format!("must start with '/': {path}")));
            }
        }

        if self.auth.shared_secret.as_deref() == Some("") {
            return Err(ConfigError::invalid_value("auth.shared_secret", "must not be empty"));
        }

        let logging = &self.telemetry.logging;
        if logging.enabled {
            create_env_filter(&logging.level)
                .map_err(|e| ConfigError::invalid_value("telemetry.logging.level", e.to_string()))?;
        }

        Ok(())
    }

    /// Development preset: pretty debug logs, metrics on, and a shutdown
    /// hook at `/internal/shutdown`.
    ///
    /// # Example
    ///
    /// ```
    /// use duplex_config::DuplexConfig;
    ///
    /// let config = DuplexConfig::development();
    /// assert_eq!(config.telemetry.logging.level, "debug");
    /// assert!(config.server.shutdown_hook.is_some());
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.telemetry.logging = LogConfig::development();
        config.server.metrics = true;
        config.server.shutdown_hook = Some("/internal/shutdown".to_string());
        config
    }

    /// Production preset: JSON logs at `info`, metrics on, no shutdown hook.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.telemetry.logging = LogConfig::production();
        config.server.metrics = true;
        config.server.shutdown_hook = None;
        config
    }
}

/// Builder for [`DuplexConfig`].
#[derive(Debug, Default)]
pub struct DuplexConfigBuilder {
    server: Option<ServerSettings>,
    auth: Option<AuthSettings>,
    health: Option<HealthSettings>,
    telemetry: Option<TelemetrySettings>,
}

impl DuplexConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server section.
    #[must_use]
    pub fn server(mut self, server: ServerSettings) -> Self {
        self.server = Some(server);
        self
    }

    /// Set the auth section.
    #[must_use]
    pub fn auth(mut self, auth: AuthSettings) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Set the health section.
    #[must_use]
    pub fn health(mut self, health: HealthSettings) -> Self {
        self.health = Some(health);
        self
    }

    /// Set the telemetry section.
    #[must_use]
    pub fn telemetry(mut self, telemetry: TelemetrySettings) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Build the configuration. Unset sections use their defaults.
    #[must_use]
    pub fn build(self) -> DuplexConfig {
        DuplexConfig {
            server: self.server.unwrap_or_default(),
            auth: self.auth.unwrap_or_default(),
            health: self.health.unwrap_or_default(),
            telemetry: self.telemetry.unwrap_or_default(),
        }
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if validation fails.
    pub fn build_validated(self) -> Result<DuplexConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}
