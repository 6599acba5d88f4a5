//! CORS (Cross-Origin Resource Sharing) interceptor for plain HTTP routes.
//!
//! Preflight `OPTIONS` requests are answered directly with `204 No Content`
//! and never reach the route handler. Other requests run normally and get the
//! `Access-Control-*` headers added when their `Origin` is allowed.
//!
//! ## Example
//!
//! ```
//! use duplex_middleware::stages::CorsInterceptor;
//! use http::Method;
//! use std::time::Duration;
//!
//! let cors = CorsInterceptor::builder()
//!     .allow_origin("https://app.example.com")
//!     .allow_methods([Method::GET, Method::POST])
//!     .allow_headers(["Content-Type", "Authorization"])
//!     .max_age(Duration::from_secs(3600))
//!     .build();
//! assert!(cors.config().allowed_origins().is_allowed("https://app.example.com"));
//! ```

use std::collections::BTreeSet;
use std::time::Duration;

use duplex_core::BoxFuture;
use http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};

use crate::interceptor::{Interceptor, Next};
use crate::kind::{Http, HttpCall};
use crate::types::{empty, full, HttpResponse};

/// Set of allowed origins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    /// Any origin (`*`).
    Any,
    /// Listed origins only.
    List(BTreeSet<String>),
}

impl AllowedOrigins {
    /// Returns `true` if `origin` is allowed.
    pub fn is_allowed(&self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::List(origins) => origins.contains(origin),
        }
    }

    fn header_value(&self, origin: &str) -> Option<HeaderValue> {
        match self {
            Self::Any => Some(HeaderValue::from_static("*")),
            Self::List(origins) if origins.contains(origin) => HeaderValue::from_str(origin).ok(),
            Self::List(_) => None,
        }
    }
}

/// CORS settings.
#[derive(Debug, Clone)]
pub struct CorsConfig {
    allowed_origins: AllowedOrigins,
    allowed_methods: Vec<Method>,
    allowed_headers: BTreeSet<String>,
    expose_headers: BTreeSet<String>,
    allow_credentials: bool,
    max_age: Option<Duration>,
}

impl CorsConfig {
    /// Returns the allowed origins.
    pub fn allowed_origins(&self) -> &AllowedOrigins {
        &self.allowed_origins
    }

    /// Returns the allowed methods.
    pub fn allowed_methods(&self) -> &[Method] {
        &self.allowed_methods
    }

    /// Returns whether credentials are allowed.
    pub fn allow_credentials(&self) -> bool {
        self.allow_credentials
    }

    /// Returns the preflight cache duration.
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: AllowedOrigins::List(BTreeSet::new()),
            allowed_methods: vec![
                Method::GET,
                Method::HEAD,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::PATCH,
            ],
            allowed_headers: ["content-type", "authorization", "x-request-id", "x-correlation-id"]
                .into_iter()
                .map(String::from)
                .collect(),
            expose_headers: BTreeSet::new(),
            allow_credentials: false,
            max_age: Some(Duration::from_secs(86400)),
        }
    }
}

/// Builder for [`CorsInterceptor`].
#[derive(Debug, Clone, Default)]
pub struct CorsBuilder {
    config: CorsConfig,
}

impl CorsBuilder {
    /// Creates a builder with default settings (no origins allowed).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows any origin.
    ///
    /// Browsers reject `*` together with credentials.
    #[must_use]
    pub fn allow_any_origin(mut self) -> Self {
        self.config.allowed_origins = AllowedOrigins::Any;
        self
    }

    /// Adds an allowed origin. No-op after [`allow_any_origin`](Self::allow_any_origin).
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        if let AllowedOrigins::List(origins) = &mut self.config.allowed_origins {
            origins.insert(origin.into());
        }
        self
    }

    /// Replaces the allowed origins. `"*"` anywhere in the list allows any origin.
    #[must_use]
    pub fn allow_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let origins: BTreeSet<String> = origins.into_iter().map(Into::into).collect();
        self.config.allowed_origins = if origins.contains("*") {
            AllowedOrigins::Any
        } else {
            AllowedOrigins::List(origins)
        };
        self
    }

    /// Sets the allowed methods.
    #[must_use]
    pub fn allow_methods<I>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = Method>,
    {
        self.config.allowed_methods = methods.into_iter().collect();
        self
    }

    /// Sets the allowed request headers. `"*"` allows any header.
    #[must_use]
    pub fn allow_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.allowed_headers = headers
            .into_iter()
            .map(|h| h.into().to_ascii_lowercase())
            .collect();
        self
    }

    /// Sets headers exposed to scripts.
    #[must_use]
    pub fn expose_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.expose_headers = headers
            .into_iter()
            .map(|h| h.into().to_ascii_lowercase())
            .collect();
        self
    }

    /// Sets whether credentials are allowed.
    #[must_use]
    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.config.allow_credentials = allow;
        self
    }

    /// Sets the preflight cache duration.
    #[must_use]
    pub fn max_age(mut self, duration: Duration) -> Self {
        self.config.max_age = Some(duration);
        self
    }

    /// Builds the interceptor.
    #[must_use]
    pub fn build(self) -> CorsInterceptor {
        CorsInterceptor { config: self.config }
    }
}

/// Interceptor answering CORS preflights and decorating responses.
///
/// Place it before authentication so preflights (which carry no
/// credentials) are not rejected.
#[derive(Debug, Clone)]
pub struct CorsInterceptor {
    config: CorsConfig,
}

impl CorsInterceptor {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> CorsBuilder {
        CorsBuilder::new()
    }

    /// Returns the settings.
    pub fn config(&self) -> &CorsConfig {
        &self.config
    }

    fn is_preflight(call: &HttpCall) -> bool {
        let headers = call.request.headers();
        call.request.method() == Method::OPTIONS
            && headers.contains_key(header::ORIGIN)
            && headers.contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
    }

    fn preflight(&self, origin: &str, request: &HeaderMap) -> HttpResponse {
        if !self.config.allowed_origins.is_allowed(origin) {
            return forbidden("origin not allowed");
        }

        let requested_method = request
            .get(header::ACCESS_CONTROL_REQUEST_METHOD)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<Method>().ok());
        if let Some(method) = requested_method {
            if !self.config.allowed_methods.contains(&method) {
                return forbidden("method not allowed");
            }
        }

        if !self.config.allowed_headers.contains("*") {
            let requested = request
                .get(header::ACCESS_CONTROL_REQUEST_HEADERS)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            let denied = requested
                .split(',')
                .map(|h| h.trim().to_ascii_lowercase())
                .find(|h| !h.is_empty() && !self.config.allowed_headers.contains(h));
            if let Some(header) = denied {
                return forbidden(&format!("header '{header}' not allowed"));
            }
        }

        let mut response = HttpResponse::new(empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        let out = response.headers_mut();
        if let Some(value) = self.config.allowed_origins.header_value(origin) {
            out.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
        insert_list(out, header::ACCESS_CONTROL_ALLOW_METHODS, self.config.allowed_methods.iter().map(Method::as_str));
        insert_list(out, header::ACCESS_CONTROL_ALLOW_HEADERS, self.config.allowed_headers.iter().map(String::as_str));
        if self.config.allow_credentials {
            out.insert(header::ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        }
        if let Some(max_age) = self.config.max_age {
            out.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from(max_age.as_secs()));
        }
        out.insert(
            header::VARY,
            HeaderValue::from_static("Origin, Access-Control-Request-Method, Access-Control-Request-Headers"),
        );
        response
    }

    fn decorate(&self, response: &mut HttpResponse, origin: &str) {
        let out = response.headers_mut();
        if let Some(value) = self.config.allowed_origins.header_value(origin) {
            out.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
        if self.config.allow_credentials {
            out.insert(header::ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        }
        insert_list(out, header::ACCESS_CONTROL_EXPOSE_HEADERS, self.config.expose_headers.iter().map(String::as_str));
        out.append(header::VARY, HeaderValue::from_static("Origin"));
    }
}

fn insert_list<'a>(headers: &mut HeaderMap, name: HeaderName, values: impl Iterator<Item = &'a str>) {
    let joined = values.collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(&joined) {
        headers.insert(name, value);
    }
}

fn forbidden(message: &str) -> HttpResponse {
    let mut response = HttpResponse::new(full(message.to_string()));
    *response.status_mut() = StatusCode::FORBIDDEN;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}

impl Interceptor<Http> for CorsInterceptor {
    fn name(&self) -> &'static str {
        "cors"
    }

    fn intercept<'a>(&'a self, call: HttpCall, next: Next<'a, Http>) -> BoxFuture<'a, HttpResponse> {
        Box::pin(async move {
            let origin = call
                .request
                .headers()
                .get(header::ORIGIN)
                .and_then(|v| v.to_str().ok())
                .map(String::from);

            if Self::is_preflight(&call) {
                if let Some(origin) = &origin {
                    return self.preflight(origin, call.request.headers());
                }
            }

            let mut response = next.run(call).await;
            if let Some(origin) = origin.filter(|o| self.config.allowed_origins.is_allowed(o)) {
                self.decorate(&mut response, &origin);
            }
            response
        })
    }
}
