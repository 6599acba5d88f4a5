//! The route table: prioritized routes plus a not-found fallback.

use http::{HeaderMap, Method, Request};

use crate::compare::prioritize;
use crate::params::Params;
use crate::route::Route;

/// A successful lookup.
#[derive(Debug)]
pub struct RouteMatch<'a, H> {
    /// The matched route.
    pub route: &'a Route<H>,
    /// Captured path and query variables.
    pub params: Params,
}

/// An ordered set of routes.
///
/// Routes are evaluated in order and the first match wins. When
/// prioritization is enabled the order is fixed once, at construction.
///
/// # Example
///
/// ```rust
/// use duplex_router::{RouteSpec, RouteTable, Route};
/// use http::{HeaderMap, Method};
///
/// let table = RouteTable::new(
///     vec![
///         Route::new(RouteSpec::new("/").prefix(), "gateway"),
///         Route::new(RouteSpec::new("/internal/health"), "health"),
///     ],
///     true,
/// );
///
/// let found = table.find(&Method::GET, "/internal/health", None, &HeaderMap::new());
/// assert_eq!(found.map(|m| *m.route.handler()), Some("health"));
/// ```
#[derive(Debug, Clone)]
pub struct RouteTable<H> {
    routes: Vec<Route<H>>,
    not_found: Option<H>,
}

impl<H> RouteTable<H> {
    /// Builds a table, sorting the routes when `prioritize_routes` is set.
    pub fn new(mut routes: Vec<Route<H>>, prioritize_routes: bool) -> Self {
        if prioritize_routes {
            prioritize(&mut routes);
        }
        for route in &routes {
            let spec = route.spec();
            tracing::debug!(
                path = spec.path(),
                prefix = spec.is_prefix(),
                methods = ?spec.allowed_methods(),
                queries = ?spec.required_queries(),
                headers = ?spec.required_headers(),
                "registered HTTP handler"
            );
        }
        Self {
            routes,
            not_found: None,
        }
    }

    /// Sets the handler used when no route matches.
    #[must_use]
    pub fn with_not_found(mut self, handler: H) -> Self {
        self.not_found = Some(handler);
        self
    }

    /// Returns the routes in evaluation order.
    pub fn routes(&self) -> &[Route<H>] {
        &self.routes
    }

    /// Returns the not-found handler, if one was set.
    pub fn not_found(&self) -> Option<&H> {
        self.not_found.as_ref()
    }

    /// Finds the first route matching the request parts.
    pub fn find(
        &self,
        method: &Method,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap,
    ) -> Option<RouteMatch<'_, H>> {
        self.routes.iter().find_map(|route| {
            route
                .spec()
                .matches(method, path, query, headers)
                .map(|params| RouteMatch { route, params })
        })
    }

    /// Finds the first route matching a request.
    pub fn find_request<B>(&self, request: &Request<B>) -> Option<RouteMatch<'_, H>> {
        let uri = request.uri();
        self.find(request.method(), uri.path(), uri.query(), request.headers())
    }

    /// Returns the number of routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if the table has no routes.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RouteSpec;

    fn table(prioritized: bool) -> RouteTable<&'static str> {
        RouteTable::new(
            vec![
                Route::new(RouteSpec::new("/").prefix(), "gateway"),
                Route::new(RouteSpec::new("/users"), "list"),
                Route::new(RouteSpec::new("/users/{id}").methods([Method::GET]), "get"),
                Route::new(RouteSpec::new("/users/me"), "me"),
            ],
            prioritized,
        )
        .with_not_found("fallback")
    }

    fn lookup(table: &RouteTable<&'static str>, method: Method, path: &str) -> Option<&'static str> {
        table
            .find(&method, path, None, &HeaderMap::new())
            .map(|m| *m.route.handler())
    }

    #[test]
    fn routes_follow_priority_order() {
        let table = table(true);
        // `{` sorts after letters, so the variable route is tried first.
        assert_eq!(lookup(&table, Method::GET, "/users/me"), Some("get"));
        assert_eq!(lookup(&table, Method::PUT, "/users/me"), Some("me"));
        assert_eq!(lookup(&table, Method::GET, "/users/42"), Some("get"));
        assert_eq!(lookup(&table, Method::GET, "/users"), Some("list"));
        assert_eq!(lookup(&table, Method::GET, "/v1/cards"), Some("gateway"));
        assert_eq!(lookup(&table, Method::POST, "/users/42"), Some("gateway"));
    }

    #[test]
    fn registration_order_without_prioritization() {
        let table = table(false);
        assert_eq!(lookup(&table, Method::GET, "/users/me"), Some("gateway"));
        assert_eq!(table.routes()[0].spec().path(), "/");
    }

    #[test]
    fn params_are_returned() {
        let table = table(true);
        let found = table
            .find(&Method::GET, "/users/42", None, &HeaderMap::new())
            .unwrap();
        assert_eq!(found.params.get("id"), Some("42"));
    }

    #[test]
    fn not_found_when_nothing_matches() {
        let table = RouteTable::new(vec![Route::new(RouteSpec::new("/a"), "a")], true)
            .with_not_found("fallback");
        assert!(lookup(&table, Method::GET, "/b").is_none());
        assert_eq!(table.not_found(), Some(&"fallback"));
    }

    #[test]
    fn find_request_uses_query() {
        let table = RouteTable::new(
            vec![Route::new(RouteSpec::new("/s").queries([("q", "{q}")]), "search")],
            true,
        );
        let request = Request::get("/s?q=rust").body(()).unwrap();
        let found = table.find_request(&request).unwrap();
        assert_eq!(found.params.get("q"), Some("rust"));
    }
}
