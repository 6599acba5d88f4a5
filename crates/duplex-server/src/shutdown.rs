//! Graceful shutdown signal handling.
//!
//! A [`ShutdownSignal`] is a cloneable trigger shared by everything that may
//! end the server: the caller's cancellation, OS signals and the development
//! shutdown hook route. A [`ConnectionTracker`] counts open connections so the
//! drain phase knows when the last one is gone.
//!
//! # Example
//!
//! ```rust
//! use duplex_server::ShutdownSignal;
//!
//! let shutdown = ShutdownSignal::new();
//! let remote = shutdown.clone();
//! remote.trigger();
//! assert!(shutdown.is_shutdown());
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

/// A signal that can be used to trigger and await graceful shutdown.
///
/// All clones observe the same trigger. Triggering is idempotent.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    /// Creates a new, untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing cancellation token; cancelling it triggers shutdown.
    #[must_use]
    pub fn from_token(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Triggers shutdown.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Returns `true` if shutdown has been triggered.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns a future that completes when shutdown is triggered,
    /// immediately if it already was.
    pub fn recv(&self) -> WaitForCancellationFutureOwned {
        self.token.clone().cancelled_owned()
    }

    /// Returns the underlying token.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Creates a signal that also triggers on SIGTERM or SIGINT (Ctrl+C).
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn with_os_signals() -> Self {
        let signal = Self::new();
        let trigger = signal.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = wait_for_os_signal() => trigger.trigger(),
                () = trigger.recv() => {}
            }
        });
        signal
    }
}

/// Waits for an OS shutdown signal: SIGTERM or SIGINT on Unix, Ctrl+C
/// elsewhere. Never completes if the handlers cannot be installed.
pub async fn wait_for_os_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!(error = %e, "failed to install signal handlers");
                return std::future::pending().await;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
            _ = sigint.recv() => tracing::info!("received SIGINT, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            return std::future::pending().await;
        }
        tracing::info!("received Ctrl+C, shutting down");
    }
}

/// Counts active connections during shutdown.
///
/// ```rust
/// use duplex_server::ConnectionTracker;
///
/// let tracker = ConnectionTracker::new();
/// let token = tracker.acquire();
/// assert_eq!(tracker.active_connections(), 1);
/// drop(token);
/// assert_eq!(tracker.active_connections(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl ConnectionTracker {
    /// Creates a new connection tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires a token held for the lifetime of one connection.
    #[must_use]
    pub fn acquire(&self) -> ConnectionToken {
        self.active.fetch_add(1, Ordering::SeqCst);
        ConnectionToken {
            active: Arc::clone(&self.active),
            notify: Arc::clone(&self.notify),
        }
    }

    /// Returns the number of active connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Waits until all connections are closed.
    pub async fn wait_for_shutdown(&self) {
        loop {
            // Registered before the check so a concurrent last drop is not missed.
            let notified = self.notify.notified();
            if self.active.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// A token representing an active connection.
#[derive(Debug)]
pub struct ConnectionToken {
    active: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl Drop for ConnectionToken {
    fn drop(&mut self) {
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notify.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_shutdown_signal_trigger_idempotent() {
        let shutdown = ShutdownSignal::new();
        assert!(!shutdown.is_shutdown());
        shutdown.trigger();
        shutdown.trigger();
        assert!(shutdown.is_shutdown());
    }

    #[test]
    fn test_shutdown_signal_shares_token() {
        let token = CancellationToken::new();
        let shutdown = ShutdownSignal::from_token(token.clone());
        token.cancel();
        assert!(shutdown.clone().is_shutdown());
    }

    #[tokio::test]
    async fn test_shutdown_recv_completes_when_triggered() {
        let shutdown = ShutdownSignal::new();
        let waiter = tokio::spawn(shutdown.recv());
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_recv_completes_immediately_if_triggered() {
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();
        tokio::time::timeout(Duration::from_millis(100), shutdown.recv()).await.unwrap();
    }

    #[test]
    fn test_connection_tracker_multiple() {
        let tracker = ConnectionTracker::new();
        let a = tracker.acquire();
        let b = tracker.acquire();
        assert_eq!(tracker.active_connections(), 2);
        drop(a);
        assert_eq!(tracker.active_connections(), 1);
        drop(b);
        assert_eq!(tracker.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_connection_tracker_wait_for_shutdown_immediate() {
        let tracker = ConnectionTracker::new();
        tokio::time::timeout(Duration::from_millis(100), tracker.wait_for_shutdown())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_connection_tracker_wait_for_shutdown_delayed() {
        let tracker = ConnectionTracker::new();
        let token = tracker.acquire();
        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.wait_for_shutdown().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());
        drop(token);
        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    }
}
