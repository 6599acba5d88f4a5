//! Path templates.
//!
//! A template is a `/`-separated path where a segment written as `{name}`
//! captures exactly one request segment. Everything else matches literally.

use crate::params::Params;

/// One segment of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal segment (e.g. `users`).
    Static(String),
    /// Named variable (e.g. `{id}`).
    Param(String),
}

/// A parsed path template.
///
/// # Example
///
/// ```rust
/// use duplex_router::PathTemplate;
///
/// let template = PathTemplate::parse("/users/{id}");
///
/// let params = template.match_exact("/users/42").unwrap();
/// assert_eq!(params.get("id"), Some("42"));
///
/// assert!(template.match_exact("/users/42/cards").is_none());
/// assert!(template.match_prefix("/users/42/cards").is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Parses a template. Empty segments are ignored, so `/a//b/` and `/a/b`
    /// match the same paths.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let segments = split(raw)
            .map(|s| {
                if let Some(name) = s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                    Segment::Param(name.to_string())
                } else {
                    Segment::Static(s.to_string())
                }
            })
            .collect();

        Self {
            raw: raw.to_string(),
            segments,
        }
    }

    /// Returns the template as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the parsed segments.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns the names of the variables in declaration order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Static(_) => None,
        })
    }

    /// Matches the whole path against the template.
    #[must_use]
    pub fn match_exact(&self, path: &str) -> Option<Params> {
        let parts: Vec<&str> = split(path).collect();
        if parts.len() != self.segments.len() {
            return None;
        }
        self.capture(&parts)
    }

    /// Matches the leading segments of the path against the template.
    #[must_use]
    pub fn match_prefix(&self, path: &str) -> Option<Params> {
        let parts: Vec<&str> = split(path).collect();
        if parts.len() < self.segments.len() {
            return None;
        }
        self.capture(&parts[..self.segments.len()])
    }

    fn capture(&self, parts: &[&str]) -> Option<Params> {
        let mut params = Params::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Static(literal) if literal == part => {}
                Segment::Static(_) => return None,
                Segment::Param(name) => {
                    let value = urlencoding::decode(part).ok()?;
                    params.push(name.as_str(), value.into_owned());
                }
            }
        }
        Some(params)
    }
}

/// Returns the variable name if `value` is a `{name}` placeholder.
pub(crate) fn placeholder(value: &str) -> Option<&str> {
    value.strip_prefix('{').and_then(|s| s.strip_suffix('}'))
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_segments() {
        let template = PathTemplate::parse("/orgs/{org}/users/{user}");
        assert_eq!(
            template.segments(),
            &[
                Segment::Static("orgs".into()),
                Segment::Param("org".into()),
                Segment::Static("users".into()),
                Segment::Param("user".into()),
            ]
        );
        assert_eq!(template.param_names().collect::<Vec<_>>(), vec!["org", "user"]);
    }

    #[test]
    fn exact_match() {
        let template = PathTemplate::parse("/users");
        assert!(template.match_exact("/users").is_some());
        assert!(template.match_exact("/users/").is_some());
        assert!(template.match_exact("/user").is_none());
        assert!(template.match_exact("/users/1").is_none());
    }

    #[test]
    fn params_are_percent_decoded() {
        let template = PathTemplate::parse("/files/{name}");
        let params = template.match_exact("/files/a%20b").unwrap();
        assert_eq!(params.get("name"), Some("a b"));
    }

    #[test]
    fn prefix_match() {
        let template = PathTemplate::parse("/api");
        assert!(template.match_prefix("/api").is_some());
        assert!(template.match_prefix("/api/v1/users").is_some());
        assert!(template.match_prefix("/apix").is_none());
        assert!(template.match_prefix("/").is_none());
    }

    #[test]
    fn root_prefix_matches_everything() {
        let template = PathTemplate::parse("/");
        assert!(template.match_prefix("/").is_some());
        assert!(template.match_prefix("/anything/at/all").is_some());
        assert!(template.match_exact("/").is_some());
        assert!(template.match_exact("/x").is_none());
    }

    #[test]
    fn placeholders() {
        assert_eq!(placeholder("{id}"), Some("id"));
        assert_eq!(placeholder("id"), None);
    }
}
