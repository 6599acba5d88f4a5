//! Authentication interceptors.
//!
//! [`AuthInterceptor`] works for every call kind: allow-listed methods pass
//! through untouched, everything else must be accepted by the
//! [`Authenticator`], whose returned context replaces the incoming one.
//! Rejections become `UNAUTHENTICATED` (`401` for HTTP calls).
//!
//! [`HttpAuthInterceptor`] is the HTTP-route variant: it also accepts the token
//! from an `authorization` cookie.

use std::sync::Arc;

use duplex_core::metadata::AUTHORIZATION;
use duplex_core::{BoxFuture, Status};
use http::header::COOKIE;
use http::HeaderValue;

use crate::auth::{authorize, cookie_value, Authenticator};
use crate::interceptor::{Interceptor, Next};
use crate::kind::{CallKind, HasContext, Http, HttpCall};

/// Interceptor that authenticates calls.
#[derive(Clone)]
pub struct AuthInterceptor {
    auth: Arc<dyn Authenticator>,
}

impl AuthInterceptor {
    /// Creates the interceptor.
    pub fn new(auth: Arc<dyn Authenticator>) -> Self {
        Self { auth }
    }
}

impl std::fmt::Debug for AuthInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthInterceptor")
            .field("allow_list", &self.auth.allow_list().is_some())
            .finish()
    }
}

impl<K: CallKind> Interceptor<K> for AuthInterceptor {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn intercept<'a>(&'a self, mut input: K::Input, next: Next<'a, K>) -> BoxFuture<'a, K::Output> {
        Box::pin(async move {
            let ctx = input.context().clone();
            match authorize(self.auth.as_ref(), ctx).await {
                Ok(ctx) => {
                    *input.context_mut() = ctx;
                    next.run(input).await
                }
                Err(err) => {
                    let ctx = input.context();
                    tracing::debug!(
                        correlation_id = ctx.log_correlation_id(),
                        method = ctx.method(),
                        error = %err,
                        "authentication failed"
                    );
                    K::reject(Status::from(err))
                }
            }
        })
    }
}

/// HTTP authentication interceptor.
///
/// The token is read from the `authorization` header or, failing that, from
/// the `authorization` cookie. Failures answer `401 {"code":16,"message":"..."}`.
#[derive(Clone, Debug)]
pub struct HttpAuthInterceptor {
    inner: AuthInterceptor,
}

impl HttpAuthInterceptor {
    /// Creates the interceptor.
    pub fn new(auth: Arc<dyn Authenticator>) -> Self {
        Self {
            inner: AuthInterceptor::new(auth),
        }
    }
}

impl Interceptor<Http> for HttpAuthInterceptor {
    fn name(&self) -> &'static str {
        "http_auth"
    }

    fn intercept<'a>(&'a self, mut call: HttpCall, next: Next<'a, Http>) -> BoxFuture<'a, <Http as CallKind>::Output> {
        let cookie_token = if call.ctx.metadata().contains_key(AUTHORIZATION) {
            None
        } else {
            call.request
                .headers()
                .get_all(COOKIE)
                .iter()
                .filter_map(|value| value.to_str().ok())
                .find_map(|cookies| cookie_value(cookies, AUTHORIZATION))
                .and_then(|token| HeaderValue::from_str(token).ok())
        };
        if let Some(token) = cookie_token {
            call.ctx.metadata_mut().insert(AUTHORIZATION, token);
        }
        Interceptor::<Http>::intercept(&self.inner, call, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AllowListed, SharedSecretAuthenticator};
    use crate::kind::{Call, Unary};
    use crate::types::{empty_response, HttpRequest};
    use bytes::Bytes;
    use duplex_core::{CallContext, Code, Identity};
    use http::{HeaderMap, StatusCode};

    fn authenticator() -> Arc<dyn Authenticator> {
        Arc::new(AllowListed::new(
            SharedSecretAuthenticator::new("s3cret"),
            ["/pkg.Svc/Public", "/public"],
        ))
    }

    fn unary_call(method: &str, token: Option<&'static str>) -> Call {
        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", "r".parse().unwrap());
        if let Some(token) = token {
            headers.insert("authorization", token.parse().unwrap());
        }
        Call::new(CallContext::new(method).with_metadata(headers), Bytes::new())
    }

    fn identity_echo<'a>() -> Next<'a, Unary> {
        Next::handler(|call: Call| {
            Box::pin(async move { Ok(Bytes::from(call.ctx.identity().log_id())) })
        })
    }

    #[tokio::test]
    async fn accepted_calls_carry_identity() {
        let interceptor = AuthInterceptor::new(authenticator());
        let out = Interceptor::<Unary>::intercept(
            &interceptor,
            unary_call("/pkg.Svc/Private", Some("Bearer s3cret")),
            identity_echo(),
        )
        .await
        .unwrap();
        assert_eq!(out, Bytes::from(Identity::service("shared-secret").log_id()));
    }

    #[tokio::test]
    async fn rejected_calls_are_unauthenticated() {
        let interceptor = AuthInterceptor::new(authenticator());
        let err = Interceptor::<Unary>::intercept(
            &interceptor,
            unary_call("/pkg.Svc/Private", Some("Bearer wrong")),
            identity_echo(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), Code::Unauthenticated);
    }

    #[tokio::test]
    async fn allow_listed_calls_skip_authentication() {
        let interceptor = AuthInterceptor::new(authenticator());
        let out = Interceptor::<Unary>::intercept(
            &interceptor,
            unary_call("/pkg.Svc/Public", None),
            identity_echo(),
        )
        .await
        .unwrap();
        assert_eq!(out, Bytes::from("anonymous"));
    }

    fn http_call(path: &str, header: Option<(&'static str, &'static str)>) -> HttpCall {
        let mut builder = http::Request::get(path);
        if let Some((name, value)) = header {
            builder = builder.header(name, value);
        }
        let request: HttpRequest = builder.body(Bytes::new()).unwrap();
        HttpCall::new(request)
    }

    fn ok<'a>() -> Next<'a, Http> {
        Next::handler(|_call: HttpCall| Box::pin(async { empty_response(StatusCode::OK) }))
    }

    #[tokio::test]
    async fn http_token_from_cookie() {
        let interceptor = HttpAuthInterceptor::new(authenticator());
        let response = interceptor
            .intercept(http_call("/private", Some(("cookie", "theme=dark; authorization=s3cret"))), ok())
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = interceptor
            .intercept(http_call("/private", Some(("cookie", "token=s3cret"))), ok())
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn http_failure_is_401() {
        let interceptor = HttpAuthInterceptor::new(authenticator());
        let response = interceptor
            .intercept(http_call("/private", Some(("authorization", "Bearer no"))), ok())
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = interceptor.intercept(http_call("/public", None), ok()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
