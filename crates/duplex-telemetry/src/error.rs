//! Telemetry error types.

use thiserror::Error;

/// Errors raised while installing telemetry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to install the metrics recorder.
    #[error("failed to initialize metrics: {0}")]
    MetricsInit(String),

    /// Failed to install the log subscriber.
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = TelemetryError::MetricsInit("failed".to_string());
        assert_eq!(err.to_string(), "failed to initialize metrics: failed");
        let err = TelemetryError::LoggingInit("bad level".to_string());
        assert_eq!(err.to_string(), "failed to initialize logging: bad level");
    }
}
