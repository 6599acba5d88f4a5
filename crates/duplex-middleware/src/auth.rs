//! Authenticators.
//!
//! An [`Authenticator`] turns an incoming [`CallContext`] into an
//! authenticated one (typically by setting its [`Identity`]) or rejects it.
//! The optional [`AllowList`] capability lets an authenticator exempt methods
//! or paths from authentication altogether.

use std::collections::HashSet;
use std::sync::Arc;

use duplex_core::{metadata, BoxFuture, CallContext, Identity, Status};
use thiserror::Error;

/// Authentication failures. All of them surface as `UNAUTHENTICATED`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The call carries no metadata at all.
    #[error("auth: could not locate request metadata")]
    MetadataMissing,

    /// No authorization entry was found.
    #[error("auth: could not locate authorization metadata")]
    AuthorizationMissing,

    /// The presented token is not valid.
    #[error("auth: invalid token")]
    InvalidToken,

    /// More than one authorization entry was found.
    #[error("auth: too many authorization entries")]
    MultipleAuthFound,

    /// Authenticator-specific rejection.
    #[error("auth: {0}")]
    Denied(String),
}

impl From<AuthError> for Status {
    fn from(err: AuthError) -> Self {
        Status::unauthenticated(err.to_string())
    }
}

/// Authenticates calls.
pub trait Authenticator: Send + Sync + 'static {
    /// Authenticates a call, returning the (possibly augmented) context.
    fn authenticate<'a>(&'a self, ctx: CallContext) -> BoxFuture<'a, Result<CallContext, AuthError>>;

    /// Returns the allow-list capability, if this authenticator has one.
    fn allow_list(&self) -> Option<&dyn AllowList> {
        None
    }
}

/// Exempts methods or paths from authentication.
pub trait AllowList: Send + Sync {
    /// Returns `true` if `method` (full RPC method or HTTP path) skips
    /// authentication.
    fn is_allow_listed(&self, method: &str) -> bool;
}

impl AllowList for HashSet<String> {
    fn is_allow_listed(&self, method: &str) -> bool {
        self.contains(method)
    }
}

impl<A: Authenticator + ?Sized> Authenticator for Arc<A> {
    fn authenticate<'a>(&'a self, ctx: CallContext) -> BoxFuture<'a, Result<CallContext, AuthError>> {
        (**self).authenticate(ctx)
    }

    fn allow_list(&self) -> Option<&dyn AllowList> {
        (**self).allow_list()
    }
}

/// Runs the allow-list check and then the authenticator.
pub async fn authorize<A>(auth: &A, ctx: CallContext) -> Result<CallContext, AuthError>
where
    A: Authenticator + ?Sized,
{
    if auth
        .allow_list()
        .is_some_and(|list| list.is_allow_listed(ctx.method()))
    {
        return Ok(ctx);
    }
    auth.authenticate(ctx).await
}

/// Extracts the single bearer token of a call.
///
/// Looks at the `authorization` metadata first and falls back to the
/// `authorization` cookie forwarded by the gateway.
pub fn bearer_token(ctx: &CallContext) -> Result<String, AuthError> {
    if ctx.metadata().is_empty() {
        return Err(AuthError::MetadataMissing);
    }

    let values = metadata::get_all(ctx.metadata(), metadata::AUTHORIZATION);
    match values.as_slice() {
        [value] => return Ok(strip_bearer(value).to_string()),
        [] => {}
        _ => return Err(AuthError::MultipleAuthFound),
    }

    metadata::get(ctx.metadata(), metadata::GATEWAY_COOKIE)
        .and_then(|cookies| cookie_value(cookies, metadata::AUTHORIZATION))
        .map(str::to_string)
        .ok_or(AuthError::AuthorizationMissing)
}

/// Returns the value of a cookie from a `Cookie` header value.
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then_some(value)
    })
}

fn strip_bearer(value: &str) -> &str {
    let value = value.trim();
    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => token.trim(),
        _ => value,
    }
}

/// Authenticates calls presenting a shared secret as bearer token.
///
/// Successful calls get a service identity.
#[derive(Clone)]
pub struct SharedSecretAuthenticator {
    secret: String,
    identity: String,
}

impl SharedSecretAuthenticator {
    /// Creates an authenticator accepting `secret`.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            identity: "shared-secret".to_string(),
        }
    }

    /// Sets the service name given to authenticated callers.
    #[must_use]
    pub fn with_identity(mut self, name: impl Into<String>) -> Self {
        self.identity = name.into();
        self
    }
}

impl std::fmt::Debug for SharedSecretAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSecretAuthenticator")
            .field("secret", &"<redacted>")
            .field("identity", &self.identity)
            .finish()
    }
}

impl Authenticator for SharedSecretAuthenticator {
    fn authenticate<'a>(&'a self, ctx: CallContext) -> BoxFuture<'a, Result<CallContext, AuthError>> {
        Box::pin(async move {
            let token = bearer_token(&ctx)?;
            if !constant_time_eq(token.as_bytes(), self.secret.as_bytes()) {
                return Err(AuthError::InvalidToken);
            }
            Ok(ctx.with_identity(Identity::service(self.identity.as_str())))
        })
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// An authenticator built from a function.
pub struct FnAuthenticator<F> {
    func: F,
}

impl<F> FnAuthenticator<F>
where
    F: Fn(CallContext) -> BoxFuture<'static, Result<CallContext, AuthError>> + Send + Sync + 'static,
{
    /// Creates a function-based authenticator.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Authenticator for FnAuthenticator<F>
where
    F: Fn(CallContext) -> BoxFuture<'static, Result<CallContext, AuthError>> + Send + Sync + 'static,
{
    fn authenticate<'a>(&'a self, ctx: CallContext) -> BoxFuture<'a, Result<CallContext, AuthError>> {
        (self.func)(ctx)
    }
}

/// Adds an allow-list to another authenticator.
///
/// # Example
///
/// ```
/// use duplex_middleware::auth::{AllowList, AllowListed, Authenticator, SharedSecretAuthenticator};
///
/// let auth = AllowListed::new(
///     SharedSecretAuthenticator::new("s3cret"),
///     ["/grpc.health.v1.Health/Check", "/internal/health"],
/// );
/// assert!(auth.allow_list().unwrap().is_allow_listed("/internal/health"));
/// ```
#[derive(Debug, Clone)]
pub struct AllowListed<A> {
    inner: A,
    methods: HashSet<String>,
}

impl<A: Authenticator> AllowListed<A> {
    /// Wraps `inner`, exempting `methods`.
    pub fn new<I, S>(inner: A, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inner,
            methods: methods.into_iter().map(Into::into).collect(),
        }
    }
}

impl<A: Authenticator> Authenticator for AllowListed<A> {
    fn authenticate<'a>(&'a self, ctx: CallContext) -> BoxFuture<'a, Result<CallContext, AuthError>> {
        self.inner.authenticate(ctx)
    }

    fn allow_list(&self) -> Option<&dyn AllowList> {
        Some(&self.methods)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderMap;

    fn ctx_with(pairs: &[(&'static str, &'static str)]) -> CallContext {
        let mut headers = HeaderMap::new();
        for (k, v) in pairs {
            headers.append(*k, v.parse().unwrap());
        }
        CallContext::new("/pkg.Svc/Do").with_metadata(headers)
    }

    #[tokio::test]
    async fn shared_secret_accepts_bearer() {
        let auth = SharedSecretAuthenticator::new("s3cret");
        let ctx = auth
            .authenticate(ctx_with(&[("authorization", "Bearer s3cret")]))
            .await
            .unwrap();
        assert_eq!(ctx.identity(), &Identity::service("shared-secret"));
    }

    #[tokio::test]
    async fn shared_secret_errors() {
        let auth = SharedSecretAuthenticator::new("s3cret");
        assert_eq!(
            auth.authenticate(CallContext::new("/x")).await.unwrap_err(),
            AuthError::MetadataMissing
        );
        assert_eq!(
            auth.authenticate(ctx_with(&[("x-request-id", "1")])).await.unwrap_err(),
            AuthError::AuthorizationMissing
        );
        assert_eq!(
            auth.authenticate(ctx_with(&[("authorization", "Bearer nope")]))
                .await
                .unwrap_err(),
            AuthError::InvalidToken
        );
        assert_eq!(
            auth.authenticate(ctx_with(&[
                ("authorization", "Bearer a"),
                ("authorization", "Bearer b"),
            ]))
            .await
            .unwrap_err(),
            AuthError::MultipleAuthFound
        );
    }

    #[tokio::test]
    async fn authorization_cookie_fallback() {
        let auth = SharedSecretAuthenticator::new("s3cret");
        let ctx = ctx_with(&[("grpcgateway-cookie", "theme=dark; authorization=s3cret")]);
        assert!(auth.authenticate(ctx).await.is_ok());

        let ctx = ctx_with(&[("grpcgateway-cookie", "token=s3cret")]);
        assert_eq!(auth.authenticate(ctx).await.unwrap_err(), AuthError::AuthorizationMissing);
    }

    #[tokio::test]
    async fn allow_listed_methods_skip_authentication() {
        let auth = AllowListed::new(SharedSecretAuthenticator::new("s3cret"), ["/pkg.Svc/Do"]);
        assert!(authorize(&auth, CallContext::new("/pkg.Svc/Do")).await.is_ok());
        assert!(authorize(&auth, CallContext::new("/pkg.Svc/Other")).await.is_err());
    }

    #[tokio::test]
    async fn fn_authenticator() {
        let auth = FnAuthenticator::new(|ctx: CallContext| {
            Box::pin(async move {
                if ctx.metadata_value("api-key") == Some("k1") {
                    Ok(ctx.with_identity(Identity::api_key("k1")))
                } else {
                    Err(AuthError::Denied("unknown key".into()))
                }
            })
        });
        let ok = auth.authenticate(ctx_with(&[("api-key", "k1")])).await.unwrap();
        assert_eq!(ok.identity().log_id(), "apikey:k1");
        let err = auth.authenticate(ctx_with(&[("api-key", "k2")])).await.unwrap_err();
        assert_eq!(Status::from(err).code(), duplex_core::Code::Unauthenticated);
    }

    #[test]
    fn cookie_parsing() {
        assert_eq!(cookie_value("a=1; token=xyz", "token"), Some("xyz"));
        assert_eq!(cookie_value("a=1", "token"), None);
    }
}
