//! Per-call context types.
//!
//! The [`CallContext`] travels through the interceptor chain into handlers.
//! Interceptors augment it (correlation id, identity); handlers read it.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use http::HeaderMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::Identity;
use crate::metadata;

/// An opaque correlation identifier.
///
/// Incoming identifiers are kept verbatim; generated ones are UUID v7 so they
/// sort by creation time in logs.
///
/// # Example
///
/// ```
/// use duplex_core::CorrelationId;
///
/// let id = CorrelationId::generate();
/// assert_eq!(id.as_str().len(), 36);
///
/// let incoming = CorrelationId::from("req-42");
/// assert_eq!(incoming.as_str(), "req-42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generates a new identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CorrelationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Per-call context that flows through the interceptor chain.
///
/// A context is created by the transport (RPC server or gateway) from the
/// incoming request metadata. Interceptors receive it by value and forward a
/// possibly augmented copy to the next step.
///
/// # Example
///
/// ```
/// use duplex_core::{CallContext, Identity};
///
/// let ctx = CallContext::new("/greeter.Greeter/SayHello")
///     .with_identity(Identity::service("billing"));
///
/// assert_eq!(ctx.method(), "/greeter.Greeter/SayHello");
/// assert!(ctx.correlation_id().is_none());
/// ```
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Full RPC method (`/pkg.Service/Method`) or HTTP path.
    method: String,

    /// Incoming request metadata.
    metadata: HeaderMap,

    /// Correlation id, once resolved by the correlation interceptor.
    correlation_id: Option<CorrelationId>,

    /// Authenticated caller.
    identity: Identity,

    /// Remote address of the connection, when known.
    peer: Option<SocketAddr>,

    /// Absolute deadline for the call, when the caller set one.
    deadline: Option<Instant>,

    started_at: Instant,
}

impl CallContext {
    /// Creates a context for the given method with empty metadata.
    #[must_use]
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            metadata: HeaderMap::new(),
            correlation_id: None,
            identity: Identity::Anonymous,
            peer: None,
            deadline: None,
            started_at: Instant::now(),
        }
    }

    /// Returns the called method or path.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the request metadata.
    #[must_use]
    pub fn metadata(&self) -> &HeaderMap {
        &self.metadata
    }

    /// Returns the request metadata mutably.
    pub fn metadata_mut(&mut self) -> &mut HeaderMap {
        &mut self.metadata
    }

    /// Returns a context carrying the given metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: HeaderMap) -> Self {
        self.metadata = metadata;
        self
    }

    /// Returns the first metadata value for `key`.
    #[must_use]
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        metadata::get(&self.metadata, key)
    }

    /// Returns the correlation id, if resolved.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        self.correlation_id.as_ref()
    }

    /// Sets the correlation id.
    pub fn set_correlation_id(&mut self, id: CorrelationId) {
        self.correlation_id = Some(id);
    }

    /// Returns a context carrying the given correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, id: CorrelationId) -> Self {
        self.correlation_id = Some(id);
        self
    }

    /// Returns the caller identity.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Sets the caller identity.
    pub fn set_identity(&mut self, identity: Identity) {
        self.identity = identity;
    }

    /// Returns a context carrying the given identity.
    #[must_use]
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    /// Returns the peer address.
    #[must_use]
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Returns a context carrying the given peer address.
    #[must_use]
    pub fn with_peer(mut self, peer: Option<SocketAddr>) -> Self {
        self.peer = peer;
        self
    }

    /// Returns the call deadline.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns a context that must complete within `timeout` from now.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Returns the time remaining before the deadline, if one is set.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns the elapsed time since the call started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Returns the correlation id for log fields, or `"-"` when unresolved.
    #[must_use]
    pub fn log_correlation_id(&self) -> &str {
        self.correlation_id
            .as_ref()
            .map_or("-", CorrelationId::as_str)
    }
}
