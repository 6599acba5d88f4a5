//! Correlation ID interceptor.
//!
//! Resolves the correlation id of every call before any other interceptor
//! runs:
//!
//! 1. **`X-Correlation-ID` metadata**: used unchanged if present
//! 2. **`X-Request-ID` metadata**: accepted as an alias
//! 3. **Generated UUID v7**: otherwise
//!
//! The id is stored in the [`CallContext`](duplex_core::CallContext) and
//! written back into the call metadata as `x-correlation-id`, so handlers and
//! downstream clients see it even when it was generated here. HTTP responses
//! echo it in the `X-Correlation-ID` header.

use duplex_core::metadata::{self, X_CORRELATION_ID, X_REQUEST_ID};
use duplex_core::{BoxFuture, CorrelationId};
use http::{HeaderMap, HeaderValue};

use crate::interceptor::{Interceptor, Next};
use crate::kind::{CallKind, HasContext};

/// Interceptor that propagates or generates correlation ids.
///
/// Must be the outermost interceptor so the id reaches every later step.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelationIdInterceptor;

impl CorrelationIdInterceptor {
    /// Creates the interceptor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Returns the incoming correlation id, if the caller sent one.
    pub fn incoming(headers: &HeaderMap) -> Option<CorrelationId> {
        [X_CORRELATION_ID, X_REQUEST_ID]
            .into_iter()
            .filter_map(|key| metadata::get(headers, key))
            .map(str::trim)
            .find(|value| !value.is_empty())
            .map(CorrelationId::from)
    }
}

impl<K: CallKind> Interceptor<K> for CorrelationIdInterceptor {
    fn name(&self) -> &'static str {
        "correlation_id"
    }

    fn intercept<'a>(&'a self, mut input: K::Input, next: Next<'a, K>) -> BoxFuture<'a, K::Output> {
        Box::pin(async move {
            let ctx = input.context_mut();
            let id = Self::incoming(ctx.metadata()).unwrap_or_else(CorrelationId::generate);
            let header = HeaderValue::from_str(id.as_str()).ok();

            if let Some(value) = &header {
                ctx.metadata_mut().insert(X_CORRELATION_ID, value.clone());
            }
            ctx.set_correlation_id(id);

            let mut output = next.run(input).await;
            if let Some(value) = header {
                K::set_header(&mut output, X_CORRELATION_ID, value);
            }
            output
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::{Call, Http, HttpCall, Unary};
    use crate::types::empty_response;
    use bytes::Bytes;
    use duplex_core::{CallContext, Status};
    use http::StatusCode;
    use uuid::Uuid;

    fn capture<'a>() -> Next<'a, Unary> {
        Next::handler(|call: Call| {
            Box::pin(async move {
                let id = call.ctx.correlation_id().map(|id| id.to_string()).unwrap_or_default();
                let header = call.ctx.metadata_value(X_CORRELATION_ID).unwrap_or_default().to_string();
                assert_eq!(id, header);
                Ok::<_, Status>(Bytes::from(id))
            })
        })
    }

    fn call_with(headers: &[(&'static str, &'static str)]) -> Call {
        let mut map = HeaderMap::new();
        for (k, v) in headers {
            map.insert(*k, v.parse().unwrap());
        }
        Call::new(CallContext::new("/pkg.Svc/Do").with_metadata(map), Bytes::new())
    }

    #[tokio::test]
    async fn generates_when_missing() {
        let out = Interceptor::<Unary>::intercept(&CorrelationIdInterceptor, call_with(&[]), capture())
            .await
            .unwrap();
        let id = String::from_utf8(out.to_vec()).unwrap();
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[tokio::test]
    async fn passes_incoming_through_unchanged() {
        let out = Interceptor::<Unary>::intercept(
            &CorrelationIdInterceptor,
            call_with(&[("x-correlation-id", "abc-123")]),
            capture(),
        )
        .await
        .unwrap();
        assert_eq!(out, Bytes::from("abc-123"));
    }

    #[tokio::test]
    async fn accepts_request_id_alias() {
        let out = Interceptor::<Unary>::intercept(
            &CorrelationIdInterceptor,
            call_with(&[("x-request-id", "req-9")]),
            capture(),
        )
        .await
        .unwrap();
        assert_eq!(out, Bytes::from("req-9"));
    }

    #[tokio::test]
    async fn http_response_echoes_id() {
        let request = http::Request::get("/x")
            .header("x-correlation-id", "c-1")
            .body(Bytes::new())
            .unwrap();
        let next = Next::<Http>::handler(|_call: HttpCall| {
            Box::pin(async { empty_response(StatusCode::OK) })
        });
        let response =
            Interceptor::<Http>::intercept(&CorrelationIdInterceptor, HttpCall::new(request), next).await;
        assert_eq!(response.headers()[X_CORRELATION_ID], "c-1");
    }

    #[test]
    fn name() {
        assert_eq!(Interceptor::<Unary>::name(&CorrelationIdInterceptor), "correlation_id");
    }
}
