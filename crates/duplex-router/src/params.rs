//! Values captured from `{name}` template segments.

use std::str::FromStr;

use smallvec::SmallVec;

/// Templates rarely capture more than this many segments.
const INLINE: usize = 4;

/// Path parameters captured by a route match, in template order.
///
/// Values are already percent-decoded. Handlers find them in the request
/// extensions; the gateway copies them into the request message.
///
/// ```rust
/// use duplex_router::Params;
///
/// let mut params = Params::new();
/// params.push("user", "ada");
/// params.push("page", "3");
///
/// assert_eq!(params.get("user"), Some("ada"));
/// assert_eq!(params.parse::<u32>("page"), Some(Ok(3)));
/// assert!(params.parse::<u32>("missing").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Params {
    captured: SmallVec<[(String, String); INLINE]>,
}

impl Params {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a captured value. Lookups return the first capture of a name.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.captured.push((name.into(), value.into()));
    }

    /// Returns the value captured for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.captured
            .iter()
            .find_map(|(key, value)| (key == name).then_some(value.as_str()))
    }

    /// Parses the value captured for `name`; `None` if nothing was captured.
    pub fn parse<T: FromStr>(&self, name: &str) -> Option<Result<T, T::Err>> {
        self.get(name).map(str::parse)
    }

    /// Returns `true` if `name` was captured.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of captures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.captured.len()
    }

    /// Returns `true` if the route captured nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.captured.is_empty()
    }

    /// Iterates `(name, value)` pairs in capture order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.captured.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            captured: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_follow_capture_order() {
        let params: Params = [("org", "acme"), ("repo", "duplex"), ("org", "other")].into_iter().collect();
        assert_eq!(params.len(), 3);
        assert_eq!(params.get("org"), Some("acme"));
        assert!(params.contains("repo"));
        assert!(!params.contains("branch"));
        assert_eq!(
            params.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            ["org", "repo", "org"]
        );
    }

    #[test]
    fn parse_reports_missing_and_invalid_separately() {
        let mut params = Params::new();
        params.push("id", "42");
        params.push("page", "two");

        assert_eq!(params.parse::<u64>("id"), Some(Ok(42)));
        assert!(matches!(params.parse::<u64>("page"), Some(Err(_))));
        assert!(params.parse::<u64>("limit").is_none());
    }

    #[test]
    fn spills_past_inline_capacity() {
        let params: Params = (0..10).map(|i| (format!("p{i}"), i.to_string())).collect();
        assert_eq!(params.len(), 10);
        assert_eq!(params.get("p9"), Some("9"));
        assert!(!params.is_empty());
        assert!(Params::new().is_empty());
    }
}
