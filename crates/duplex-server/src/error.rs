//! Server error types.

use std::net::SocketAddr;
use std::path::PathBuf;

use duplex_health::HealthError;
use thiserror::Error;

/// Fatal server errors.
///
/// Per-request failures never surface here; they are answered on the wire.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The listener could not be bound.
    #[error("failed to bind {addr}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// TLS credentials could not be loaded.
    #[error("invalid TLS credentials in {path}: {reason}")]
    Tls {
        /// File that failed.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// The configuration is invalid.
    #[error("invalid server configuration: {0}")]
    Config(String),

    /// The listener failed while serving.
    #[error("serve failed")]
    Serve(#[source] std::io::Error),

    /// The health subsystem could not be started.
    #[error("health subsystem failed to start")]
    Health(#[from] HealthError),
}

impl ServerError {
    /// Create a TLS error.
    pub fn tls(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Tls {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl From<duplex_config::ConfigError> for ServerError {
    fn from(err: duplex_config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn bind_error_keeps_source() {
        let err = ServerError::Bind {
            addr: "127.0.0.1:80".parse().unwrap(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert_eq!(err.to_string(), "failed to bind 127.0.0.1:80");
        assert!(err.source().is_some());
    }

    #[test]
    fn helpers() {
        assert!(ServerError::tls("/tmp/key.pem", "no private key")
            .to_string()
            .contains("no private key"));
        assert!(matches!(ServerError::config("x"), ServerError::Config(_)));
        assert!(matches!(ServerError::from(HealthError::Closed), ServerError::Health(_)));
    }
}
