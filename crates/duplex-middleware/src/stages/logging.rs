//! Call logging.
//!
//! Emits one record per completed call with its kind, method, outcome and
//! duration. Failed calls (non-OK codes, 5xx responses) log at `warn`.

use std::time::Instant;

use duplex_core::BoxFuture;

use crate::interceptor::{Interceptor, Next};
use crate::kind::{CallKind, HasContext};

/// Interceptor logging every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInterceptor;

impl LoggingInterceptor {
    /// Creates the interceptor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl<K: CallKind> Interceptor<K> for LoggingInterceptor {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn intercept<'a>(&'a self, input: K::Input, next: Next<'a, K>) -> BoxFuture<'a, K::Output> {
        Box::pin(async move {
            let info = K::describe(&input);
            let correlation_id = input.context().log_correlation_id().to_string();
            let http_method = info.http_method.as_ref().map_or("", |m| m.as_str()).to_string();
            let start = Instant::now();

            let output = next.run(input).await;

            let status = K::status(&output);
            let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
            if status.is_error() {
                tracing::warn!(
                    kind = info.kind,
                    method = %info.method,
                    http.method = %http_method,
                    status = %status,
                    duration_ms,
                    correlation_id = %correlation_id,
                    "call failed"
                );
            } else {
                tracing::info!(
                    kind = info.kind,
                    method = %info.method,
                    http.method = %http_method,
                    status = %status,
                    duration_ms,
                    correlation_id = %correlation_id,
                    "call completed"
                );
            }
            output
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::{Call, Unary};
    use bytes::Bytes;
    use duplex_core::{CallContext, Status};

    #[tokio::test]
    async fn output_is_untouched() {
        let next = Next::<Unary>::handler(|_call: Call| Box::pin(async { Err(Status::not_found("gone")) }));
        let out = Interceptor::<Unary>::intercept(
            &LoggingInterceptor,
            Call::new(CallContext::new("/pkg.Svc/Get"), Bytes::new()),
            next,
        )
        .await;
        assert_eq!(out.unwrap_err(), Status::not_found("gone"));
    }
}
