//! Core interceptor trait and types.
//!
//! An [`Interceptor`] receives the chain input and a [`Next`] continuation. It
//! may inspect or augment the input, forward it with `next.run(input)`, and
//! post-process the output, or short-circuit by returning an output itself.
//!
//! # Example
//!
//! ```
//! use duplex_core::BoxFuture;
//! use duplex_middleware::{Interceptor, Next, Unary, CallKind};
//!
//! struct Tagging;
//!
//! impl Interceptor<Unary> for Tagging {
//!     fn name(&self) -> &'static str {
//!         "tagging"
//!     }
//!
//!     fn intercept<'a>(
//!         &'a self,
//!         mut call: <Unary as CallKind>::Input,
//!         next: Next<'a, Unary>,
//!     ) -> BoxFuture<'a, <Unary as CallKind>::Output> {
//!         Box::pin(async move {
//!             call.ctx.metadata_mut().insert("x-tag", "1".parse().unwrap());
//!             next.run(call).await
//!         })
//!     }
//! }
//! ```

use std::marker::PhantomData;

use duplex_core::BoxFuture;

use crate::kind::CallKind;

/// A request-processing step of kind `K`.
///
/// # Invariants
///
/// - An interceptor calls `next.run()` at most once
/// - An interceptor that does not call `next.run()` short-circuits the chain
/// - Shared state is only mutated behind synchronization
pub trait Interceptor<K: CallKind>: Send + Sync + 'static {
    /// Returns the name of this interceptor, used in logs and debugging.
    fn name(&self) -> &'static str;

    /// Processes a call.
    fn intercept<'a>(&'a self, input: K::Input, next: Next<'a, K>) -> BoxFuture<'a, K::Output>;
}

/// Continuation invoking the rest of the chain.
///
/// Consumed by [`Next::run`], so it can only be called once.
pub struct Next<'a, K: CallKind> {
    inner: NextInner<'a, K>,
}

enum NextInner<'a, K: CallKind> {
    /// More interceptors to run.
    Chain {
        interceptor: &'a dyn Interceptor<K>,
        next: Box<Next<'a, K>>,
    },
    /// End of chain: the handler.
    Handler(Box<dyn FnOnce(K::Input) -> BoxFuture<'a, K::Output> + Send + 'a>),
}

impl<'a, K: CallKind> Next<'a, K> {
    /// Creates a continuation that runs `interceptor` and then `next`.
    pub(crate) fn new(interceptor: &'a dyn Interceptor<K>, next: Next<'a, K>) -> Self {
        Self {
            inner: NextInner::Chain {
                interceptor,
                next: Box::new(next),
            },
        }
    }

    /// Creates a terminal continuation that invokes the handler.
    pub fn handler<F>(f: F) -> Self
    where
        F: FnOnce(K::Input) -> BoxFuture<'a, K::Output> + Send + 'a,
    {
        Self {
            inner: NextInner::Handler(Box::new(f)),
        }
    }

    /// Invokes the next interceptor or the handler.
    pub async fn run(self, input: K::Input) -> K::Output {
        match self.inner {
            NextInner::Chain { interceptor, next } => interceptor.intercept(input, *next).await,
            NextInner::Handler(handler) => handler(input).await,
        }
    }
}

/// An interceptor built from a function.
///
/// # Example
///
/// ```
/// use duplex_middleware::{FnInterceptor, Unary};
///
/// let timing = FnInterceptor::<Unary, _>::new("timing", |call, next| {
///     Box::pin(async move {
///         let start = std::time::Instant::now();
///         let out = next.run(call).await;
///         tracing::debug!(elapsed = ?start.elapsed(), "call timed");
///         out
///     })
/// });
/// ```
pub struct FnInterceptor<K, F> {
    name: &'static str,
    func: F,
    _kind: PhantomData<fn() -> K>,
}

impl<K, F> FnInterceptor<K, F>
where
    K: CallKind,
    F: for<'a> Fn(K::Input, Next<'a, K>) -> BoxFuture<'a, K::Output> + Send + Sync + 'static,
{
    /// Creates a function-based interceptor.
    pub fn new(name: &'static str, func: F) -> Self {
        Self {
            name,
            func,
            _kind: PhantomData,
        }
    }
}

impl<K, F> Interceptor<K> for FnInterceptor<K, F>
where
    K: CallKind,
    F: for<'a> Fn(K::Input, Next<'a, K>) -> BoxFuture<'a, K::Output> + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn intercept<'a>(&'a self, input: K::Input, next: Next<'a, K>) -> BoxFuture<'a, K::Output> {
        (self.func)(input, next)
    }
}
