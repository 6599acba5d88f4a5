//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! multiple sources: defaults, files, strings, `.env` and environment
//! variables.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use duplex_telemetry::logging::LogFormat;
use serde_json::Value;

use crate::{ConfigError, DuplexConfig};

/// Default environment variable prefix.
pub const DEFAULT_ENV_PREFIX: &str = "DUPLEX";

/// Configuration loader with layered approach.
///
/// Later layers override earlier ones key by key, so a file that only sets
/// `[server] address` keeps every other value from the layers below it:
/// 1. Default values (or a preset)
/// 2. Configuration files and strings (TOML or JSON), in call order
/// 3. Environment variables `PREFIX__SECTION__KEY`, optionally seeded from `.env`
///
/// # Example
///
/// ```no_run
/// use duplex_config::ConfigLoader;
///
/// # fn main() -> Result<(), duplex_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_defaults()
///     .with_optional_file("duplex.toml")?
///     .with_dotenv()?
///     .with_env_prefix("DUPLEX")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: DuplexConfig,
    env_prefix: Option<String>,
    file_loaded: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader starting from defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: DuplexConfig::default(),
            env_prefix: None,
            file_loaded: false,
        }
    }

    /// Reset to default configuration values.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = DuplexConfig::default();
        self
    }

    /// Start from the development preset.
    ///
    /// # Example
    ///
    /// ```
    /// use duplex_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert_eq!(config.telemetry.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = DuplexConfig::development();
        self
    }

    /// Start from the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = DuplexConfig::production();
        self
    }

    /// Layer a configuration file on top of the current values.
    ///
    /// The format is chosen by extension: `.toml` or `.json`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The file does not exist
    /// - The file cannot be read
    /// - The extension is not supported
    /// - The file contains invalid TOML/JSON or unknown fields
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        let layer = Self::parse_layer(&content, &Self::format_of(path)?)?;
        self.merge_layer(layer)?;
        self.file_loaded = true;

        Ok(self)
    }

    /// Layer a configuration file if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be read or parsed.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Layer configuration from a string.
    ///
    /// `format` is `"toml"` or `"json"`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails.
    ///
    /// # Example
    ///
    /// ```
    /// use duplex_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [server]
    ///     address = "127.0.0.1:3000"
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.server.address, "127.0.0.1:3000");
    /// assert_eq!(config.server.health_path, "/internal/health");
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        let layer = Self::parse_layer(content, &format.to_lowercase())?;
        self.merge_layer(layer)?;
        Ok(self)
    }

    /// Set the environment variable prefix for overrides.
    ///
    /// Variables use the format `PREFIX__SECTION__KEY`, for example
    /// `DUPLEX__SERVER__ADDRESS=0.0.0.0:9000` or
    /// `DUPLEX__TELEMETRY__LOGGING__LEVEL=debug`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load variables from a `.env` file in the current directory or its
    /// parents into the process environment. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Dotenv`] if the file exists but is malformed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(ConfigError::Dotenv(e.to_string())),
        }
    }

    /// Load variables from a specific `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Dotenv`] if the file is missing or malformed.
    pub fn with_dotenv_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        dotenvy::from_path(path.as_ref()).map_err(|e| ConfigError::Dotenv(e.to_string()))?;
        Ok(self)
    }

    /// Whether at least one configuration file was loaded.
    #[must_use]
    pub fn file_loaded(&self) -> bool {
        self.file_loaded
    }

    /// Finalize: apply environment overrides (if a prefix was set) and
    /// validate.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an environment variable cannot be parsed or
    /// validation fails.
    pub fn load(mut self) -> Result<DuplexConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }

        self.config.validate()?;

        Ok(self.config)
    }

    /// Finalize without environment overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> DuplexConfig {
        self.config
    }

    fn format_of(path: &Path) -> Result<String, ConfigError> {
        path.extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .ok_or_else(|| ConfigError::UnsupportedFormat(path.display().to_string()))
    }

    // A layer must be a valid configuration on its own (unknown fields are
    // rejected here), but only the keys it spells out are merged.
    fn parse_layer(content: &str, format: &str) -> Result<Value, ConfigError> {
        match format {
            "toml" => {
                let _: DuplexConfig = toml::from_str(content)?;
                Ok(toml::from_str(content)?)
            }
            "json" => {
                let _: DuplexConfig = serde_json::from_str(content)?;
                Ok(serde_json::from_str(content)?)
            }
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }

    fn merge_layer(&mut self, layer: Value) -> Result<(), ConfigError> {
        let mut base = serde_json::to_value(&self.config)?;
        merge_values(&mut base, layer);
        self.config = serde_json::from_value(base)?;
        Ok(())
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        // Sorted so that failures are reported deterministically.
        let env_vars: BTreeMap<String, String> = env::vars()
            .filter(|(k, _)| k.starts_with(prefix) && k[prefix.len()..].starts_with("__"))
            .collect();

        for (key, value) in env_vars {
            self.apply_env_var(&key, &value, prefix)?;
        }

        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let key_without_prefix = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .ok_or_else(|| ConfigError::env_parse_error(key, "invalid key format"))?;

        let parts: Vec<&str> = key_without_prefix.split("__").collect();
        let server = &mut self.config.server;

        match parts.as_slice() {
            // Server section
            ["SERVER", "NAME"] => server.name = value.to_string(),
            ["SERVER", "ADDRESS"] => server.address = value.to_string(),
            ["SERVER", "TLS_CERT_FILE"] => server.tls_cert_file = optional(value).map(PathBuf::from),
            ["SERVER", "TLS_KEY_FILE"] => server.tls_key_file = optional(value).map(PathBuf::from),
            ["SERVER", "READ_TIMEOUT_SECS"] => server.read_timeout_secs = parse_u64(key, value)?,
            ["SERVER", "WRITE_TIMEOUT_SECS"] => server.write_timeout_secs = parse_u64(key, value)?,
            ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => server.shutdown_timeout_secs = parse_u64(key, value)?,
            ["SERVER", "API_PREFIX"] => server.api_prefix = value.to_string(),
            ["SERVER", "ROUTES_PRIORITIZATION"] => server.routes_prioritization = expect_bool(key, value)?,
            ["SERVER", "SHUTDOWN_HOOK"] => server.shutdown_hook = optional(value),
            ["SERVER", "HEALTH_PATH"] => server.health_path = value.to_string(),
            ["SERVER", "METRICS"] => server.metrics = expect_bool(key, value)?,
            ["SERVER", "METRICS_PATH"] => server.metrics_path = value.to_string(),
            ["SERVER", "CORRELATION_ID"] => server.correlation_id = expect_bool(key, value)?,
            ["SERVER", "RECOVERY"] => server.recovery = expect_bool(key, value)?,

            // Auth section
            ["AUTH", "SHARED_SECRET"] => self.config.auth.shared_secret = optional(value),
            ["AUTH", "ALLOW_LIST"] => {
                self.config.auth.allow_list = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToString::to_string)
                    .collect();
            }

            // Health section
            ["HEALTH", "INTERVAL_SECS"] => self.config.health.interval_secs = parse_u64(key, value)?,
            ["HEALTH", "TIMEOUT_SECS"] => self.config.health.timeout_secs = parse_u64(key, value)?,

            // Telemetry logging
            ["TELEMETRY", "LOGGING", "ENABLED"] => {
                self.config.telemetry.logging.enabled = expect_bool(key, value)?;
            }
            ["TELEMETRY", "LOGGING", "LEVEL"] => {
                self.config.telemetry.logging.level = value.to_string();
            }
            ["TELEMETRY", "LOGGING", "FORMAT"] => {
                self.config.telemetry.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => return Err(ConfigError::env_parse_error(key, "expected 'json' or 'pretty'")),
                };
            }

            _ => {
                return Err(ConfigError::env_parse_error(key, "unknown configuration key"));
            }
        }

        Ok(())
    }
}

/// Recursively merges `layer` into `base`; objects merge by key, anything
/// else replaces.
fn merge_values(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base), Value::Object(layer)) => {
            for (key, value) in layer {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, layer) => *base = layer,
    }
}

fn optional(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))
}

fn expect_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_loader_new() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config.server.address, "0.0.0.0:8088");
    }

    #[test]
    fn test_loader_with_development() {
        let config = ConfigLoader::new().with_development().load().unwrap();
        assert_eq!(config.telemetry.logging.format, LogFormat::Pretty);
        assert!(config.server.metrics);
    }

    #[test]
    fn test_layers_merge_by_key() {
        let config = ConfigLoader::new()
            .with_development()
            .with_string("[server]\naddress = \"127.0.0.1:7000\"", "toml")
            .unwrap()
            .with_string(r#"{"health": {"interval_secs": 5}}"#, "json")
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.server.address, "127.0.0.1:7000");
        assert_eq!(config.health.interval_secs, 5);
        // Untouched keys keep the preset's values.
        assert_eq!(config.server.shutdown_hook.as_deref(), Some("/internal/shutdown"));
        assert_eq!(config.telemetry.logging.level, "debug");
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = ConfigLoader::new().with_string("[server]\nhttp_addr = \"0.0.0.0:1\"", "toml");
        assert!(matches!(result, Err(ConfigError::TomlError(_))));

        let result = ConfigLoader::new().with_string(r#"{"tracing": {}}"#, "json");
        assert!(matches!(result, Err(ConfigError::JsonError(_))));
    }

    #[test]
    fn test_unsupported_format() {
        let result = ConfigLoader::new().with_string("server: {}", "yaml");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_loader_with_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            [server]
            name = "users"
            metrics = true

            [auth]
            shared_secret = "s3cret"
            allow_list = ["/grpc.health.v1.Health/Check", "/internal/health"]
            "#
        )
        .unwrap();

        let loader = ConfigLoader::new().with_file(file.path()).unwrap();
        assert!(loader.file_loaded());
        let config = loader.load().unwrap();
        assert_eq!(config.server.name, "users");
        assert!(config.server.metrics);
        assert_eq!(config.auth.shared_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.auth.allow_list.len(), 2);
    }

    #[test]
    fn test_loader_with_file_not_found() {
        let result = ConfigLoader::new().with_file("/nonexistent/duplex.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_loader_with_optional_file_not_found() {
        let loader = ConfigLoader::new().with_optional_file("/nonexistent/duplex.toml").unwrap();
        assert!(!loader.file_loaded());
    }

    #[test]
    fn test_load_validates() {
        let result = ConfigLoader::new()
            .with_string("[server]\nwrite_timeout_secs = 0", "toml")
            .unwrap()
            .load();
        assert!(result.is_err());

        let config = ConfigLoader::new()
            .with_string("[server]\nwrite_timeout_secs = 0", "toml")
            .unwrap()
            .load_unvalidated();
        assert_eq!(config.server.write_timeout_secs, 0);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("no"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }

    // Overrides go through apply_env_var directly; the process environment is
    // shared by all tests in the binary.

    #[test]
    fn test_apply_env_var_server() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("DUPLEX__SERVER__ADDRESS", "192.168.1.1:9000", "DUPLEX").unwrap();
        loader.apply_env_var("DUPLEX__SERVER__METRICS", "yes", "DUPLEX").unwrap();
        loader.apply_env_var("DUPLEX__SERVER__SHUTDOWN_HOOK", "/quit", "DUPLEX").unwrap();
        assert_eq!(loader.config.server.address, "192.168.1.1:9000");
        assert!(loader.config.server.metrics);
        assert_eq!(loader.config.server.shutdown_hook.as_deref(), Some("/quit"));

        loader.apply_env_var("DUPLEX__SERVER__SHUTDOWN_HOOK", "", "DUPLEX").unwrap();
        assert!(loader.config.server.shutdown_hook.is_none());
    }

    #[test]
    fn test_apply_env_var_auth_and_health() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_var("DUPLEX__AUTH__ALLOW_LIST", "/a.B/C, /internal/health,", "DUPLEX")
            .unwrap();
        loader.apply_env_var("DUPLEX__HEALTH__TIMEOUT_SECS", "3", "DUPLEX").unwrap();
        assert_eq!(loader.config.auth.allow_list, ["/a.B/C", "/internal/health"]);
        assert_eq!(loader.config.health.timeout_secs, 3);
    }

    #[test]
    fn test_apply_env_var_log_format() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("DUPLEX__TELEMETRY__LOGGING__FORMAT", "pretty", "DUPLEX").unwrap();
        assert_eq!(loader.config.telemetry.logging.format, LogFormat::Pretty);
        assert!(loader
            .apply_env_var("DUPLEX__TELEMETRY__LOGGING__FORMAT", "xml", "DUPLEX")
            .is_err());
    }

    #[test]
    fn test_apply_env_var_errors() {
        let mut loader = ConfigLoader::new();
        assert!(loader.apply_env_var("DUPLEX__SERVER__READ_TIMEOUT_SECS", "soon", "DUPLEX").is_err());
        assert!(loader.apply_env_var("DUPLEX__SERVER__HTTP_ADDR", "0.0.0.0:1", "DUPLEX").is_err());
        assert!(loader.apply_env_var("DUPLEXSERVER__ADDRESS", "0.0.0.0:1", "DUPLEX").is_err());
    }

    #[test]
    fn test_complete_toml_config() {
        let toml = r#"
            [server]
            name = "users"
            address = "0.0.0.0:8443"
            tls_cert_file = "/etc/duplex/tls.crt"
            tls_key_file = "/etc/duplex/tls.key"
            read_timeout_secs = 10
            write_timeout_secs = 20
            shutdown_timeout_secs = 5
            api_prefix = "/api"
            routes_prioritization = false
            health_path = "/healthz"
            metrics = true
            metrics_path = "/metrics"
            correlation_id = true
            recovery = true

            [auth]
            shared_secret = "s3cret"
            allow_list = ["/grpc.health.v1.Health/Check"]

            [health]
            interval_secs = 15
            timeout_secs = 2

            [telemetry.logging]
            enabled = true
            level = "info,hyper=warn"
            format = "json"
        "#;

        let config = ConfigLoader::new().with_string(toml, "toml").unwrap().load().unwrap();

        assert!(config.server.tls_enabled());
        assert_eq!(config.server.api_prefix, "/api");
        assert!(!config.server.routes_prioritization);
        assert_eq!(config.server.health_path, "/healthz");
        assert_eq!(config.health.interval_secs, 15);
        assert_eq!(config.telemetry.logging.level, "info,hyper=warn");
    }
}
