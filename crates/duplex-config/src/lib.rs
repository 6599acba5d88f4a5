//! Typed configuration for duplex servers.
//!
//! - TOML and JSON configuration files
//! - Environment variable overrides (`DUPLEX__SECTION__KEY`)
//! - `.env` files via `dotenvy`
//! - Strict parsing: unknown fields are errors
//! - Layered, key-by-key merging (defaults → files → env)
//!
//! # Example
//!
//! ```no_run
//! use duplex_config::{ConfigLoader, DEFAULT_ENV_PREFIX};
//!
//! # fn main() -> Result<(), duplex_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_optional_file("duplex.toml")?
//!     .with_dotenv()?
//!     .with_env_prefix(DEFAULT_ENV_PREFIX)
//!     .load()?;
//!
//! println!("listening on {}", config.server.address);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! name = "users"
//! address = "0.0.0.0:8088"
//! # tls_cert_file = "/etc/duplex/tls.crt"
//! # tls_key_file = "/etc/duplex/tls.key"
//! read_timeout_secs = 30
//! write_timeout_secs = 30
//! shutdown_timeout_secs = 30
//! api_prefix = "/"
//! routes_prioritization = true
//! # shutdown_hook = "/internal/shutdown"
//! health_path = "/internal/health"
//! metrics = false
//! metrics_path = "/internal/metrics"
//! correlation_id = true
//! recovery = true
//!
//! [auth]
//! # shared_secret = "s3cret"
//! allow_list = ["/grpc.health.v1.Health/Check", "/internal/health"]
//!
//! [health]
//! interval_secs = 60
//! timeout_secs = 1
//!
//! [telemetry.logging]
//! enabled = true
//! level = "info"
//! format = "json"
//! ```

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::*;
pub use error::ConfigError;
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};
pub use schema::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DuplexConfig::default();
        assert_eq!(config.server.address, "0.0.0.0:8088");
        assert_eq!(config.server.shutdown_timeout_secs, 30);
    }

    #[test]
    fn test_documented_file_parses() {
        let config = ConfigLoader::new()
            .with_string(
                r#"
                [server]
                address = "0.0.0.0:8088"
                metrics = false

                [auth]
                allow_list = ["/grpc.health.v1.Health/Check", "/internal/health"]

                [telemetry.logging]
                level = "info"
                format = "json"
                "#,
                "toml",
            )
            .unwrap()
            .load()
            .unwrap();
        assert!(!config.auth.enabled());
    }
}
