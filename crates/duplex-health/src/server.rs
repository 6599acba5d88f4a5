//! The health server.
//!
//! [`HealthServer`] owns the recorded statuses and the periodic check loop:
//!
//! ```text
//! UNKNOWN --init--> NOT_SERVING --pass--> SERVING / NOT_SERVING --close--> NOT_SERVING (frozen)
//! ```
//!
//! Each pass probes every registered [`Checker`] on its own task, bounded by
//! the configured timeout. Per-service statuses are written as each probe
//! resolves; the overall status is written after all of them have.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use duplex_middleware::stages::recovery::panic_message;
use duplex_telemetry::metrics::record_health_status;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};
use uuid::Uuid;

use crate::checker::{Checker, ProbeContext};
use crate::error::HealthError;
use crate::state::HealthState;
use crate::status::{ServingStatus, OVERALL};

/// Default interval between check passes.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Default timeout of one probe.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Check loop timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthConfig {
    /// Interval between check passes.
    pub interval: Duration,
    /// Timeout of each probe.
    pub timeout: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

struct Inner {
    checkers: BTreeMap<String, Arc<dyn Checker>>,
    config: HealthConfig,
    state: RwLock<HealthState>,
    cancel: CancellationToken,
    periodic: Mutex<Option<JoinHandle<()>>>,
    span: Span,
}

/// Health subsystem handle. Cheap to clone.
#[derive(Clone)]
pub struct HealthServer {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for HealthServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthServer")
            .field("checkers", &self.inner.checkers.keys().collect::<Vec<_>>())
            .field("config", &self.inner.config)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Default for HealthServer {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builds a [`HealthServer`].
#[derive(Default)]
pub struct HealthServerBuilder {
    checkers: BTreeMap<String, Arc<dyn Checker>>,
    config: HealthConfig,
    span: Option<Span>,
}

impl HealthServerBuilder {
    /// Registers a checker under a service name.
    #[must_use]
    pub fn checker(mut self, service: impl Into<String>, checker: impl Checker) -> Self {
        self.checkers.insert(service.into(), Arc::new(checker));
        self
    }

    /// Registers a shared checker under a service name.
    #[must_use]
    pub fn shared_checker(mut self, service: impl Into<String>, checker: Arc<dyn Checker>) -> Self {
        self.checkers.insert(service.into(), checker);
        self
    }

    /// Sets the interval between passes.
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Sets the per-probe timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Sets both timings.
    #[must_use]
    pub fn config(mut self, config: HealthConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the span the check loop logs in.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Builds the server. Checkers start `UNKNOWN`; overall starts `SERVING`.
    pub fn build(self) -> HealthServer {
        let state = HealthState::new(self.checkers.keys().map(String::as_str));
        HealthServer {
            inner: Arc::new(Inner {
                checkers: self.checkers,
                config: self.config,
                state: RwLock::new(state),
                cancel: CancellationToken::new(),
                periodic: Mutex::new(None),
                span: self.span.unwrap_or_else(Span::current),
            }),
        }
    }
}

impl HealthServer {
    /// Returns a builder.
    pub fn builder() -> HealthServerBuilder {
        HealthServerBuilder::default()
    }

    /// Returns the check loop timing.
    pub fn config(&self) -> HealthConfig {
        self.inner.config
    }

    /// Returns the names of the registered checkers.
    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.inner.checkers.keys().map(String::as_str)
    }

    /// Returns `true` after [`close`](Self::close).
    pub fn is_closed(&self) -> bool {
        self.inner.state.read().is_closed()
    }

    /// Sets the overall status and, when checkers are registered, marks
    /// everything `NOT_SERVING`, runs one pass and starts the periodic loop.
    ///
    /// # Errors
    ///
    /// Returns [`HealthError::Closed`] after [`close`](Self::close).
    pub async fn init(&self, status: ServingStatus) -> Result<(), HealthError> {
        if self.is_closed() {
            return Err(HealthError::Closed);
        }
        self.record(OVERALL, status);
        if self.inner.checkers.is_empty() {
            return Ok(());
        }

        self.record(OVERALL, ServingStatus::NotServing);
        for service in self.inner.checkers.keys() {
            self.record(service, ServingStatus::NotServing);
        }
        self.check_all().await;
        self.start_periodic();
        Ok(())
    }

    fn start_periodic(&self) {
        let mut periodic = self.inner.periodic.lock();
        if periodic.is_some() {
            tracing::warn!("health check loop already running");
            return;
        }
        let interval = self.inner.config.interval;
        let cancel = self.inner.cancel.clone();
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let task = async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        HealthServer { inner }.check_all().await;
                    }
                }
            }
            tracing::debug!("health check loop stopped");
        };
        *periodic = Some(tokio::spawn(task.instrument(self.inner.span.clone())));
    }

    /// Runs one check pass and returns the resulting overall status.
    ///
    /// Every probe runs concurrently on its own task. A probe that fails,
    /// panics or outlives the timeout marks its service `NOT_SERVING`. The
    /// overall status is `SERVING` iff every probe succeeded.
    pub async fn check_all(&self) -> ServingStatus {
        let correlation_id = Uuid::now_v7().to_string();
        let span = tracing::info_span!(parent: &self.inner.span, "health_check", correlation_id = %correlation_id);
        let started = Instant::now();

        let probes = self
            .inner
            .checkers
            .iter()
            .map(|(service, checker)| self.probe(service, Arc::clone(checker)));
        let results = futures_util::future::join_all(probes).instrument(span.clone()).await;

        let overall = if results.iter().all(|status| status.is_serving()) {
            ServingStatus::Serving
        } else {
            ServingStatus::NotServing
        };
        self.record(OVERALL, overall);

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        span.in_scope(|| {
            tracing::info!(
                correlation_id = %correlation_id,
                status = %overall,
                duration_ms,
                "health check completed"
            );
        });
        overall
    }

    async fn probe(&self, service: &str, checker: Arc<dyn Checker>) -> ServingStatus {
        let timeout = self.inner.config.timeout;
        let token = self.inner.cancel.child_token();
        let ctx = ProbeContext::new(service, timeout, token.clone());
        let mut task = tokio::spawn(async move { checker.check(ctx).await });

        let result = match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) if join.is_panic() => Err(HealthError::Panicked(panic_message(join.into_panic().as_ref()).to_string())),
            Ok(Err(_)) => Err(HealthError::failed("health check was cancelled")),
            Err(_) => {
                token.cancel();
                task.abort();
                Err(HealthError::Timeout(timeout))
            }
        };

        let status = match result {
            Ok(()) => ServingStatus::Serving,
            Err(err) => {
                tracing::warn!(service, error = %err, "health check failed");
                ServingStatus::NotServing
            }
        };
        self.record(service, status);
        status
    }

    /// Returns the recorded status of a service; `""` is the overall status.
    ///
    /// # Errors
    ///
    /// Returns [`HealthError::ServiceUnknown`] for names never recorded.
    pub fn check(&self, service: &str) -> Result<ServingStatus, HealthError> {
        self.inner
            .state
            .read()
            .get(service)
            .ok_or_else(|| HealthError::ServiceUnknown(service.to_string()))
    }

    /// Returns the status of a service, with unknown names as `SERVICE_UNKNOWN`.
    pub fn status(&self, service: &str) -> ServingStatus {
        self.check(service).unwrap_or(ServingStatus::ServiceUnknown)
    }

    /// Returns every recorded status, including the overall one under `""`.
    pub fn statuses(&self) -> BTreeMap<String, ServingStatus> {
        self.inner.state.read().snapshot()
    }

    /// Streams the status of a service: the current value first, then every
    /// change, until the server closes. Dropping the stream stops watching.
    pub fn watch(&self, service: &str) -> BoxStream<'static, ServingStatus> {
        let mut state = self.inner.state.write();
        if state.is_closed() {
            let last = state.get(service).unwrap_or(ServingStatus::ServiceUnknown);
            return stream::once(async move { last }).boxed();
        }
        let receiver = state.subscribe(service);
        stream::unfold((receiver, true), |(mut receiver, first)| async move {
            if !first && receiver.changed().await.is_err() {
                return None;
            }
            let status = *receiver.borrow_and_update();
            Some((status, (receiver, false)))
        })
        .boxed()
    }

    /// Overrides the status of a service. No effect after [`close`](Self::close).
    pub fn set_status(&self, service: &str, status: ServingStatus) {
        if self.record(service, status) {
            tracing::debug!(service, status = %status, "serving status set");
        }
    }

    fn record(&self, service: &str, status: ServingStatus) -> bool {
        let recorded = self.inner.state.write().set(service, status);
        if recorded {
            record_health_status(service, status.as_i32());
        }
        recorded
    }

    /// Stops the periodic loop, abandons running probes, marks every
    /// service `NOT_SERVING` and freezes the state. Idempotent.
    pub fn close(&self) {
        self.inner.cancel.cancel();
        if let Some(task) = self.inner.periodic.lock().take() {
            task.abort();
        }
        let mut state = self.inner.state.write();
        if state.is_closed() {
            return;
        }
        for service in state.close() {
            record_health_status(&service, ServingStatus::NotServing.as_i32());
        }
        drop(state);
        tracing::info!("health server closed");
    }
}
