//! Health errors.

use std::time::Duration;

use duplex_core::{BoxError, Status};
use thiserror::Error;

/// Errors of health probes and queries.
#[derive(Debug, Error)]
pub enum HealthError {
    /// A probe reported its dependency unavailable.
    #[error("{message}")]
    Failed {
        /// Reason.
        message: String,
        /// Underlying error.
        #[source]
        source: Option<BoxError>,
    },

    /// A probe did not finish within its timeout.
    #[error("health check exceeded timeout of {0:?}")]
    Timeout(Duration),

    /// A probe panicked.
    #[error("health check panicked: {0}")]
    Panicked(String),

    /// The health server was closed.
    #[error("health server is closed")]
    Closed,

    /// The service name is not registered.
    #[error("unknown service: {0:?}")]
    ServiceUnknown(String),
}

impl HealthError {
    /// Creates a probe failure with a message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a probe failure wrapping an error.
    pub fn from_source<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Failed {
            message: error.to_string(),
            source: Some(Box::new(error)),
        }
    }
}

impl From<HealthError> for Status {
    fn from(err: HealthError) -> Self {
        match err {
            HealthError::ServiceUnknown(_) => Self::not_found("unknown service"),
            HealthError::Closed => Self::unavailable(err.to_string()),
            other => Self::internal(other.to_string()),
        }
    }
}
