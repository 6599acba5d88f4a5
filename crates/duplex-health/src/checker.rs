//! Dependency probes.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use duplex_core::BoxFuture;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::HealthError;

/// Probes one dependency.
///
/// A probe runs on its own task and is bounded by the health timeout. When
/// the timeout expires the probe's [`ProbeContext`] is cancelled and its task
/// aborted; long-running probes should still watch
/// [`ProbeContext::cancelled`] to release resources promptly.
pub trait Checker: Send + Sync + 'static {
    /// Checks the dependency. `Ok(())` means serving.
    fn check(&self, ctx: ProbeContext) -> BoxFuture<'_, Result<(), HealthError>>;
}

/// Context handed to a probe.
#[derive(Debug, Clone)]
pub struct ProbeContext {
    service: String,
    deadline: Instant,
    cancel: CancellationToken,
}

impl ProbeContext {
    /// Creates a context that expires after `timeout`.
    pub fn new(service: impl Into<String>, timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            service: service.into(),
            deadline: Instant::now() + timeout,
            cancel,
        }
    }

    /// Name of the probed service.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Instant after which the probe counts as failed.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Returns `true` once the probe was abandoned.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Completes when the probe is abandoned.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }
}

/// A [`Checker`] backed by a closure.
pub struct FnChecker<F> {
    func: F,
}

impl<F> fmt::Debug for FnChecker<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnChecker").finish_non_exhaustive()
    }
}

impl<F, Fut> Checker for FnChecker<F>
where
    F: Fn(ProbeContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HealthError>> + Send + 'static,
{
    fn check(&self, ctx: ProbeContext) -> BoxFuture<'_, Result<(), HealthError>> {
        Box::pin((self.func)(ctx))
    }
}

/// Wraps a closure as a [`Checker`].
///
/// # Example
///
/// ```rust
/// use duplex_health::{checker_fn, HealthError};
///
/// let db = checker_fn(|_ctx| async { Ok::<_, HealthError>(()) });
/// ```
pub fn checker_fn<F, Fut>(func: F) -> FnChecker<F>
where
    F: Fn(ProbeContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HealthError>> + Send + 'static,
{
    FnChecker { func }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn probe_context_tracks_deadline() {
        let ctx = ProbeContext::new("db", Duration::from_secs(2), CancellationToken::new());
        assert_eq!(ctx.service(), "db");
        assert_eq!(ctx.remaining(), Duration::from_secs(2));
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(ctx.remaining(), Duration::ZERO);
    }

    #[tokio::test]
    async fn closure_checker() {
        let checker = checker_fn(|ctx: ProbeContext| async move {
            if ctx.service() == "db" {
                Ok(())
            } else {
                Err(HealthError::failed("unreachable"))
            }
        });
        let token = CancellationToken::new();
        assert!(checker
            .check(ProbeContext::new("db", Duration::from_secs(1), token.clone()))
            .await
            .is_ok());
        assert!(checker
            .check(ProbeContext::new("cache", Duration::from_secs(1), token))
            .await
            .is_err());
    }
}
