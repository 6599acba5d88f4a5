//! HTTP route registry and prioritizer for duplex.
//!
//! Routes are described by a [`RouteSpec`] (path template, exact/prefix,
//! methods, query and header matchers) and carry an arbitrary handler type.
//! A [`RouteTable`] sorts them once with the pure [`compare`] function and
//! evaluates them in order; the first match wins.
//!
//! # Example
//!
//! ```rust
//! use duplex_router::{Route, RouteSpec, RouteTable};
//! use http::{HeaderMap, Method};
//!
//! let table = RouteTable::new(
//!     vec![
//!         Route::new(RouteSpec::new("/a"), "a"),
//!         Route::new(RouteSpec::new("/a/b"), "a/b"),
//!         Route::new(RouteSpec::new("/a/{x}").prefix(), "a/x/*"),
//!     ],
//!     true,
//! );
//!
//! let order: Vec<_> = table.routes().iter().map(|r| *r.handler()).collect();
//! assert_eq!(order, vec!["a/b", "a/x/*", "a"]);
//!
//! let found = table.find(&Method::GET, "/a/c/d", None, &HeaderMap::new()).unwrap();
//! assert_eq!(found.params.get("x"), Some("c"));
//! ```

mod compare;
mod params;
mod route;
mod table;
mod template;

pub use compare::{compare, prioritize};
pub use params::Params;
pub use route::{Route, RouteSpec};
pub use table::{RouteMatch, RouteTable};
pub use template::{PathTemplate, Segment};
