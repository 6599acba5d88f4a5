//! Plain HTTP routes registered by the application.
//!
//! A route pairs a [`RouteSpec`] with a handler and, optionally, its own
//! interceptors. Route interceptors run after the server-wide HTTP chain.
//! Captured path and query variables are stored in the request extensions
//! as [`Params`](duplex_router::Params).
//!
//! # Example
//!
//! ```rust
//! use duplex_middleware::types::json_response;
//! use duplex_router::Params;
//! use duplex_server::HttpRoute;
//! use http::{Method, StatusCode};
//!
//! let route = HttpRoute::new("/users/{id}", |call| async move {
//!     let id = call
//!         .request
//!         .extensions()
//!         .get::<Params>()
//!         .and_then(|p| p.get("id"))
//!         .unwrap_or_default()
//!         .to_string();
//!     json_response(StatusCode::OK, format!(r#"{{"id":"{id}"}}"#))
//! })
//! .methods([Method::GET]);
//!
//! assert_eq!(route.spec().path(), "/users/{id}");
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use duplex_core::BoxFuture;
use duplex_middleware::{Chain, Http, HttpCall, HttpResponse, Interceptor};
use duplex_router::{Route, RouteSpec};
use http::Method;

/// Type-erased HTTP handler.
pub type HttpHandler = Arc<dyn Fn(HttpCall) -> BoxFuture<'static, HttpResponse> + Send + Sync>;

/// Wraps an async function as an [`HttpHandler`].
pub fn handler_fn<F, Fut>(f: F) -> HttpHandler
where
    F: Fn(HttpCall) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HttpResponse> + Send + 'static,
{
    Arc::new(move |call| Box::pin(f(call)))
}

/// An HTTP route: match rules, handler and route-level interceptors.
pub struct HttpRoute {
    spec: RouteSpec,
    handler: HttpHandler,
    interceptors: Vec<Arc<dyn Interceptor<Http>>>,
}

impl fmt::Debug for HttpRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRoute")
            .field("spec", &self.spec)
            .field("interceptors", &self.interceptors.iter().map(|i| i.name()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl HttpRoute {
    /// Creates an exact-path route accepting any method.
    pub fn new<F, Fut>(path: &str, handler: F) -> Self
    where
        F: Fn(HttpCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HttpResponse> + Send + 'static,
    {
        Self::from_handler(RouteSpec::new(path), handler_fn(handler))
    }

    /// Creates a route from a spec and an already erased handler.
    pub fn from_handler(spec: RouteSpec, handler: HttpHandler) -> Self {
        Self {
            spec,
            handler,
            interceptors: Vec::new(),
        }
    }

    /// Matches every path under this route's path.
    #[must_use]
    pub fn prefix(mut self) -> Self {
        self.spec = self.spec.prefix();
        self
    }

    /// Restricts the allowed methods.
    #[must_use]
    pub fn methods<I>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = Method>,
    {
        self.spec = self.spec.methods(methods);
        self
    }

    /// Requires query parameters.
    #[must_use]
    pub fn queries<I, K, V>(mut self, queries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.spec = self.spec.queries(queries);
        self
    }

    /// Requires headers.
    #[must_use]
    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.spec = self.spec.headers(headers);
        self
    }

    /// Adds an interceptor that only wraps this route.
    #[must_use]
    pub fn interceptor(mut self, interceptor: impl Interceptor<Http>) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Returns the match rules.
    pub fn spec(&self) -> &RouteSpec {
        &self.spec
    }

    /// Converts into a router entry whose chain is `outer` followed by the
    /// route's own interceptors.
    pub(crate) fn into_route(self, outer: &Chain<Http>) -> Route<RouteEntry> {
        let chain = outer.then(&Chain::new(self.interceptors));
        Route::new(
            self.spec,
            RouteEntry {
                handler: self.handler,
                chain,
            },
        )
    }
}

/// What the dispatcher stores per route.
#[derive(Clone)]
pub(crate) struct RouteEntry {
    pub(crate) handler: HttpHandler,
    pub(crate) chain: Chain<Http>,
}

impl RouteEntry {
    /// Runs the call through the route chain and handler.
    pub(crate) async fn call(&self, call: HttpCall) -> HttpResponse {
        let handler = Arc::clone(&self.handler);
        self.chain.run(call, move |call| handler(call)).await
    }
}

impl fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteEntry").field("chain", &self.chain).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use duplex_middleware::types::empty_response;
    use duplex_middleware::Next;
    use http::StatusCode;

    struct Tag(&'static str);

    impl Interceptor<Http> for Tag {
        fn name(&self) -> &'static str {
            "tag"
        }

        fn intercept<'a>(&'a self, call: HttpCall, next: Next<'a, Http>) -> BoxFuture<'a, HttpResponse> {
            Box::pin(async move {
                let mut response = next.run(call).await;
                response.headers_mut().append("x-tag", self.0.parse().unwrap());
                response
            })
        }
    }

    fn request(path: &str) -> HttpCall {
        HttpCall::new(http::Request::get(path).body(Bytes::new()).unwrap())
    }

    #[test]
    fn builder_updates_spec() {
        let route = HttpRoute::new("/files", |_| async { empty_response(StatusCode::OK) })
            .prefix()
            .methods([Method::GET, Method::HEAD]);
        assert!(route.spec().is_prefix());
        assert_eq!(route.spec().allowed_methods(), &[Method::GET, Method::HEAD]);
    }

    #[tokio::test]
    async fn route_interceptors_run_inside_outer_chain() {
        let outer_tag: Arc<dyn Interceptor<Http>> = Arc::new(Tag("outer"));
        let outer = Chain::new(vec![outer_tag]);
        let route = HttpRoute::new("/x", |_| async { empty_response(StatusCode::NO_CONTENT) })
            .interceptor(Tag("route"))
            .into_route(&outer);

        let entry = route.handler();
        assert_eq!(entry.chain.len(), 2);

        let response = entry.call(request("/x")).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let tags: Vec<_> = response.headers().get_all("x-tag").iter().collect();
        // The innermost interceptor sees the response first.
        assert_eq!(tags, ["route", "outer"]);
    }
}
