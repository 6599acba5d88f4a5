//! Interceptor chains.
//!
//! A [`Chain`] is an immutable, ordered list of interceptors for one call
//! kind. The first interceptor is the outermost: it sees the call first and
//! the output last.
//!
//! [`ChainBuilder`] assembles the stock order:
//!
//! ```text
//! correlation id → auth → recovery → application interceptors → handler
//! ```

use std::fmt;
use std::sync::Arc;

use duplex_core::BoxFuture;

use crate::auth::Authenticator;
use crate::interceptor::{Interceptor, Next};
use crate::kind::CallKind;
use crate::stages::{AuthInterceptor, CorrelationIdInterceptor, RecoveryInterceptor};

/// An ordered interceptor chain for calls of kind `K`.
pub struct Chain<K: CallKind> {
    interceptors: Arc<[Arc<dyn Interceptor<K>>]>,
}

impl<K: CallKind> Clone for Chain<K> {
    fn clone(&self) -> Self {
        Self {
            interceptors: Arc::clone(&self.interceptors),
        }
    }
}

impl<K: CallKind> fmt::Debug for Chain<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl<K: CallKind> Default for Chain<K> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<K: CallKind> Chain<K> {
    /// Creates a chain running `interceptors` in order.
    pub fn new(interceptors: Vec<Arc<dyn Interceptor<K>>>) -> Self {
        Self {
            interceptors: interceptors.into(),
        }
    }

    /// Creates a chain that calls the handler directly.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Returns a chain running `self` and then `inner`.
    #[must_use]
    pub fn then(&self, inner: &Chain<K>) -> Self {
        if inner.is_empty() {
            return self.clone();
        }
        Self::new(self.interceptors.iter().chain(inner.interceptors.iter()).cloned().collect())
    }

    /// Returns the interceptor names, outermost first.
    pub fn names(&self) -> Vec<&'static str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }

    /// Returns the number of interceptors.
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    /// Returns `true` if the chain has no interceptors.
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Runs `input` through the chain and finally `handler`.
    pub async fn run<'a, F>(&'a self, input: K::Input, handler: F) -> K::Output
    where
        F: FnOnce(K::Input) -> BoxFuture<'a, K::Output> + Send + 'a,
    {
        let mut next = Next::handler(handler);
        for interceptor in self.interceptors.iter().rev() {
            next = Next::new(interceptor.as_ref(), next);
        }
        next.run(input).await
    }
}

/// Builds a [`Chain`] in the stock order.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use duplex_middleware::auth::SharedSecretAuthenticator;
/// use duplex_middleware::stages::{LoggingInterceptor, RecoveryInterceptor};
/// use duplex_middleware::{ChainBuilder, Unary};
///
/// let chain = ChainBuilder::<Unary>::new()
///     .with(LoggingInterceptor::new())
///     .recovery(RecoveryInterceptor::new())
///     .authenticator(Arc::new(SharedSecretAuthenticator::new("s3cret")))
///     .build();
/// assert_eq!(chain.names(), ["correlation_id", "auth", "recovery", "logging"]);
/// ```
pub struct ChainBuilder<K: CallKind> {
    correlation_id: bool,
    auth: Option<Arc<dyn Interceptor<K>>>,
    recovery: Option<Arc<dyn Interceptor<K>>>,
    interceptors: Vec<Arc<dyn Interceptor<K>>>,
}

impl<K: CallKind> Default for ChainBuilder<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: CallKind> fmt::Debug for ChainBuilder<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainBuilder")
            .field("correlation_id", &self.correlation_id)
            .field("auth", &self.auth.as_ref().map(|i| i.name()))
            .field("recovery", &self.recovery.is_some())
            .field("interceptors", &self.interceptors.iter().map(|i| i.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl<K: CallKind> ChainBuilder<K> {
    /// Creates a builder with correlation ids enabled and nothing else.
    pub fn new() -> Self {
        Self {
            correlation_id: true,
            auth: None,
            recovery: None,
            interceptors: Vec::new(),
        }
    }

    /// Enables or disables the correlation-id interceptor.
    #[must_use]
    pub fn correlation_id(mut self, enabled: bool) -> Self {
        self.correlation_id = enabled;
        self
    }

    /// Authenticates calls with `auth`.
    #[must_use]
    pub fn authenticator(self, auth: Arc<dyn Authenticator>) -> Self {
        self.auth(AuthInterceptor::new(auth))
    }

    /// Sets the interceptor occupying the authentication slot.
    #[must_use]
    pub fn auth(mut self, interceptor: impl Interceptor<K>) -> Self {
        self.auth = Some(Arc::new(interceptor));
        self
    }

    /// Enables panic recovery.
    #[must_use]
    pub fn recovery(mut self, recovery: RecoveryInterceptor) -> Self
    where
        RecoveryInterceptor: Interceptor<K>,
    {
        self.recovery = Some(Arc::new(recovery));
        self
    }

    /// Appends an application interceptor.
    #[must_use]
    pub fn with(self, interceptor: impl Interceptor<K>) -> Self {
        self.with_shared(Arc::new(interceptor))
    }

    /// Appends an already shared application interceptor.
    #[must_use]
    pub fn with_shared(mut self, interceptor: Arc<dyn Interceptor<K>>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Builds the chain.
    pub fn build(self) -> Chain<K> {
        let mut interceptors: Vec<Arc<dyn Interceptor<K>>> = Vec::with_capacity(self.interceptors.len() + 3);
        if self.correlation_id {
            interceptors.push(Arc::new(CorrelationIdInterceptor::new()));
        }
        interceptors.extend(self.auth);
        interceptors.extend(self.recovery);
        interceptors.extend(self.interceptors);
        Chain::new(interceptors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::{Call, Unary};
    use bytes::Bytes;
    use duplex_core::{CallContext, Status};
    use std::sync::Mutex;

    struct Recording {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Interceptor<Unary> for Recording {
        fn name(&self) -> &'static str {
            self.name
        }

        fn intercept<'a>(&'a self, call: Call, next: Next<'a, Unary>) -> BoxFuture<'a, Result<Bytes, Status>> {
            Box::pin(async move {
                self.log.lock().unwrap().push(format!("{}:before", self.name));
                let out = next.run(call).await;
                self.log.lock().unwrap().push(format!("{}:after", self.name));
                out
            })
        }
    }

    fn recording(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Arc<dyn Interceptor<Unary>> {
        Arc::new(Recording {
            name,
            log: Arc::clone(log),
        })
    }

    #[tokio::test]
    async fn runs_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = Chain::<Unary>::new(vec![recording("first", &log), recording("second", &log)]);

        let handler_log = Arc::clone(&log);
        let out = chain
            .run(Call::new(CallContext::new("/a.B/C"), "x"), move |call| {
                Box::pin(async move {
                    handler_log.lock().unwrap().push("handler".to_string());
                    Ok(call.payload)
                })
            })
            .await;

        assert_eq!(out.unwrap(), Bytes::from("x"));
        assert_eq!(
            *log.lock().unwrap(),
            ["first:before", "second:before", "handler", "second:after", "first:after"]
        );
    }

    #[test]
    fn stock_order() {
        let chain = ChainBuilder::<Unary>::new()
            .with(crate::stages::MetricsInterceptor::new())
            .recovery(RecoveryInterceptor::new())
            .build();
        assert_eq!(chain.names(), ["correlation_id", "recovery", "metrics"]);

        let bare = ChainBuilder::<Unary>::new().correlation_id(false).build();
        assert!(bare.is_empty());
    }

    #[test]
    fn then_appends() {
        let outer = ChainBuilder::<Unary>::new().build();
        let inner = ChainBuilder::<Unary>::new()
            .correlation_id(false)
            .with(crate::stages::LoggingInterceptor::new())
            .build();
        assert_eq!(outer.then(&inner).names(), ["correlation_id", "logging"]);
        assert_eq!(outer.then(&Chain::empty()).len(), 1);
    }
}
