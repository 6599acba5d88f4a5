//! Panic recovery.
//!
//! Catches panics raised by downstream interceptors and handlers, logs them
//! with the call context, and turns them into an `INTERNAL` status (a `500`
//! JSON response for HTTP calls). For server-streaming calls, panics while
//! producing stream items are caught too and end the stream with the same
//! status.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use duplex_core::{BoxFuture, CallContext, Status};
use futures_util::{FutureExt, StreamExt};

use crate::interceptor::{Interceptor, Next};
use crate::kind::{Call, CallKind, Http, HttpCall, MessageStream, ServerStream, Unary};
use crate::types::status_response;

/// Converts a recovered panic into the status returned to the caller.
pub type PanicHandler = Arc<dyn Fn(&CallContext, &str) -> Status + Send + Sync>;

/// Interceptor converting panics into internal errors.
#[derive(Clone, Default)]
pub struct RecoveryInterceptor {
    handler: Option<PanicHandler>,
}

impl std::fmt::Debug for RecoveryInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryInterceptor")
            .field("custom_handler", &self.handler.is_some())
            .finish()
    }
}

impl RecoveryInterceptor {
    /// Creates the interceptor with the default handler, which answers
    /// `INTERNAL: internal server error`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the interceptor with a custom panic handler.
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&CallContext, &str) -> Status + Send + Sync + 'static,
    {
        Self {
            handler: Some(Arc::new(handler)),
        }
    }

    fn recover(&self, ctx: &CallContext, panic: &(dyn Any + Send)) -> Status {
        let message = panic_message(panic);
        tracing::error!(
            correlation_id = ctx.log_correlation_id(),
            method = ctx.method(),
            panic = message,
            "panic recovered"
        );
        match &self.handler {
            Some(handler) => handler(ctx, message),
            None => Status::internal("internal server error"),
        }
    }
}

/// Extracts the message of a panic payload.
pub fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

impl Interceptor<Unary> for RecoveryInterceptor {
    fn name(&self) -> &'static str {
        "recovery"
    }

    fn intercept<'a>(&'a self, call: Call, next: Next<'a, Unary>) -> BoxFuture<'a, <Unary as CallKind>::Output> {
        Box::pin(async move {
            let ctx = call.ctx.clone();
            match AssertUnwindSafe(next.run(call)).catch_unwind().await {
                Ok(output) => output,
                Err(panic) => Err(self.recover(&ctx, panic.as_ref())),
            }
        })
    }
}

impl Interceptor<ServerStream> for RecoveryInterceptor {
    fn name(&self) -> &'static str {
        "recovery"
    }

    fn intercept<'a>(
        &'a self,
        call: Call,
        next: Next<'a, ServerStream>,
    ) -> BoxFuture<'a, <ServerStream as CallKind>::Output> {
        Box::pin(async move {
            let ctx = call.ctx.clone();
            let stream = match AssertUnwindSafe(next.run(call)).catch_unwind().await {
                Ok(output) => output?,
                Err(panic) => return Err(self.recover(&ctx, panic.as_ref())),
            };

            let recovery = self.clone();
            let guarded: MessageStream = AssertUnwindSafe(stream)
                .catch_unwind()
                .map(move |item| match item {
                    Ok(item) => item,
                    Err(panic) => Err(recovery.recover(&ctx, panic.as_ref())),
                })
                .boxed();
            Ok(guarded)
        })
    }
}

impl Interceptor<Http> for RecoveryInterceptor {
    fn name(&self) -> &'static str {
        "recovery"
    }

    fn intercept<'a>(&'a self, call: HttpCall, next: Next<'a, Http>) -> BoxFuture<'a, <Http as CallKind>::Output> {
        Box::pin(async move {
            let ctx = call.ctx.clone();
            match AssertUnwindSafe(next.run(call)).catch_unwind().await {
                Ok(response) => response,
                Err(panic) => status_response(&self.recover(&ctx, panic.as_ref())),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use duplex_core::Code;
    use http::StatusCode;

    fn call() -> Call {
        Call::new(CallContext::new("/pkg.Svc/Boom"), Bytes::new())
    }

    fn boom(message: &str) -> Result<Bytes, Status> {
        panic!("{message}")
    }

    #[tokio::test]
    async fn unary_panic_becomes_internal() {
        let recovery = RecoveryInterceptor::new();
        let next = Next::<Unary>::handler(|_call| Box::pin(async { boom("boom") }));
        let err = Interceptor::<Unary>::intercept(&recovery, call(), next)
            .await
            .unwrap_err();
        assert_eq!(err, Status::internal("internal server error"));
    }

    #[tokio::test]
    async fn custom_handler_sees_message() {
        let recovery = RecoveryInterceptor::with_handler(|ctx, message| {
            Status::unavailable(format!("{} failed: {message}", ctx.method()))
        });
        let next = Next::<Unary>::handler(|_call| Box::pin(async { boom("kaput") }));
        let err = Interceptor::<Unary>::intercept(&recovery, call(), next).await.unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);
        assert_eq!(err.message(), "/pkg.Svc/Boom failed: kaput");
    }

    #[tokio::test]
    async fn passes_through_without_panic() {
        let recovery = RecoveryInterceptor::new();
        let next = Next::<Unary>::handler(|call: Call| Box::pin(async move { Ok(call.payload) }));
        let out = Interceptor::<Unary>::intercept(&recovery, call(), next).await;
        assert!(out.is_ok());
    }

    #[tokio::test]
    async fn stream_item_panic_ends_stream() {
        let recovery = RecoveryInterceptor::new();
        let next = Next::<ServerStream>::handler(|_call| {
            Box::pin(async {
                let items = futures_util::stream::iter(0_u8..3).map(|i| {
                    assert!(i < 1, "item {i}");
                    Ok(Bytes::from(vec![i]))
                });
                Ok(items.boxed())
            })
        });
        let stream = Interceptor::<ServerStream>::intercept(&recovery, call(), next)
            .await
            .unwrap();
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert_eq!(items[1].as_ref().unwrap_err().code(), Code::Internal);
    }

    #[tokio::test]
    async fn http_panic_is_500() {
        let recovery = RecoveryInterceptor::new();
        let request = http::Request::get("/boom").body(Bytes::new()).unwrap();
        let next = Next::<Http>::handler(|_call| {
            Box::pin(async {
                let _ = boom("boom");
                crate::types::empty_response(StatusCode::OK)
            })
        });
        let response =
            Interceptor::<Http>::intercept(&recovery, HttpCall::new(request), next).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn panic_messages() {
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
