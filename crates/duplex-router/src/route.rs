//! Route descriptors.

use http::{HeaderMap, Method};

use crate::params::Params;
use crate::template::{placeholder, PathTemplate};

/// The match predicates of a route, independent of its handler.
///
/// This is what the prioritizer compares and what the matcher evaluates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSpec {
    template: PathTemplate,
    prefix: bool,
    methods: Vec<Method>,
    queries: Vec<(String, String)>,
    headers: Vec<(String, String)>,
}

impl RouteSpec {
    /// Creates an exact-path spec matching any method.
    #[must_use]
    pub fn new(path: &str) -> Self {
        Self {
            template: PathTemplate::parse(path),
            prefix: false,
            methods: Vec::new(),
            queries: Vec::new(),
            headers: Vec::new(),
        }
    }

    /// Marks the spec as a prefix route.
    #[must_use]
    pub fn prefix(mut self) -> Self {
        self.prefix = true;
        self
    }

    /// Restricts the spec to the given methods. An empty set allows any method.
    #[must_use]
    pub fn methods<I>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = Method>,
    {
        self.methods = methods.into_iter().collect();
        self
    }

    /// Requires query parameters. A value of `""` or `{name}` only requires
    /// the key to be present; `{name}` also captures the value as a parameter.
    #[must_use]
    pub fn queries<I, K, V>(mut self, queries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.queries = queries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Requires headers. A value of `""` only requires the header to be present.
    #[must_use]
    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers = headers
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Returns the path pattern.
    #[must_use]
    pub fn path(&self) -> &str {
        self.template.as_str()
    }

    /// Returns the parsed template.
    #[must_use]
    pub fn template(&self) -> &PathTemplate {
        &self.template
    }

    /// Returns `true` for prefix routes.
    #[must_use]
    pub fn is_prefix(&self) -> bool {
        self.prefix
    }

    /// Returns the allowed methods.
    #[must_use]
    pub fn allowed_methods(&self) -> &[Method] {
        &self.methods
    }

    /// Returns the required query matchers.
    #[must_use]
    pub fn required_queries(&self) -> &[(String, String)] {
        &self.queries
    }

    /// Returns the required header matchers.
    #[must_use]
    pub fn required_headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Evaluates the spec against a request.
    ///
    /// `query` is the raw query string without the leading `?`. Returns the
    /// captured path and query parameters on a match.
    #[must_use]
    pub fn matches(
        &self,
        method: &Method,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap,
    ) -> Option<Params> {
        if !self.methods.is_empty() && !self.methods.contains(method) {
            return None;
        }

        let mut params = if self.prefix {
            self.template.match_prefix(path)?
        } else {
            self.template.match_exact(path)?
        };

        if !self.headers.is_empty() && !self.headers_match(headers) {
            return None;
        }

        if !self.queries.is_empty() {
            let pairs: Vec<(String, String)> =
                serde_urlencoded::from_str(query.unwrap_or_default()).ok()?;
            for (key, expected) in &self.queries {
                let (_, actual) = pairs.iter().find(|(k, v)| {
                    k == key
                        && (expected.is_empty() || placeholder(expected).is_some() || v == expected)
                })?;
                if let Some(name) = placeholder(expected) {
                    params.push(name, actual.as_str());
                }
            }
        }

        Some(params)
    }

    fn headers_match(&self, headers: &HeaderMap) -> bool {
        self.headers.iter().all(|(name, expected)| {
            headers.get_all(name.as_str()).iter().any(|value| {
                expected.is_empty() || value.to_str().is_ok_and(|v| v == expected)
            })
        })
    }
}

/// A route: match predicates plus a handler.
#[derive(Debug, Clone)]
pub struct Route<H> {
    spec: RouteSpec,
    handler: H,
}

impl<H> Route<H> {
    /// Creates a route from a spec and a handler.
    pub fn new(spec: RouteSpec, handler: H) -> Self {
        Self { spec, handler }
    }

    /// Returns the match predicates.
    pub fn spec(&self) -> &RouteSpec {
        &self.spec
    }

    /// Returns the handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Maps the handler, keeping the predicates.
    pub fn map<T>(self, f: impl FnOnce(H) -> T) -> Route<T> {
        Route {
            spec: self.spec,
            handler: f(self.handler),
        }
    }
}
