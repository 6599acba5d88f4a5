//! Route prioritization.
//!
//! [`compare`] is a total order over [`RouteSpec`]s where `Less` means
//! "evaluated first". Rules, first decisive one wins:
//!
//! 1. More path segments (split on `/`) first.
//! 2. Exact routes before prefix routes.
//! 3. Lexicographically greater path first.
//! 4. More required methods first.
//! 5. More required query matchers first.
//! 6. More required header matchers first.
//!
//! Segment count is decided before the exact/prefix rule: a prefix route can
//! only shadow an exact route whose path it covers, which never happens when
//! the exact route has fewer segments.

use std::cmp::Ordering;

use crate::route::{Route, RouteSpec};

/// Compares two specs by evaluation priority.
///
/// # Example
///
/// ```rust
/// use std::cmp::Ordering;
/// use duplex_router::{compare, RouteSpec};
///
/// let deep = RouteSpec::new("/a/b");
/// let shallow = RouteSpec::new("/a");
/// assert_eq!(compare(&deep, &shallow), Ordering::Less);
/// ```
#[must_use]
pub fn compare(a: &RouteSpec, b: &RouteSpec) -> Ordering {
    segment_count(b.path())
        .cmp(&segment_count(a.path()))
        .then_with(|| a.is_prefix().cmp(&b.is_prefix()))
        .then_with(|| b.path().cmp(a.path()))
        .then_with(|| b.allowed_methods().len().cmp(&a.allowed_methods().len()))
        .then_with(|| b.required_queries().len().cmp(&a.required_queries().len()))
        .then_with(|| b.required_headers().len().cmp(&a.required_headers().len()))
}

/// Sorts routes into evaluation order. The sort is stable, so routes that
/// compare equal keep their registration order.
pub fn prioritize<H>(routes: &mut [Route<H>]) {
    routes.sort_by(|a, b| compare(a.spec(), b.spec()));
}

fn segment_count(path: &str) -> usize {
    path.split('/').count()
}
