//! Stock interceptors.
//!
//! The chain builder places them in this order, outermost first:
//!
//! 1. [`correlation_id`] - Propagate or generate the correlation id
//! 2. [`auth`] - Authenticate, honoring the allow-list
//! 3. [`recovery`] - Convert panics into internal errors
//! 4. Application interceptors, for example [`logging`] and [`metrics`]
//!
//! [`cors`] applies to plain HTTP routes only.

pub mod auth;
pub mod correlation_id;
pub mod cors;
pub mod logging;
pub mod metrics;
pub mod recovery;

pub use auth::{AuthInterceptor, HttpAuthInterceptor};
pub use correlation_id::CorrelationIdInterceptor;
pub use cors::{CorsBuilder, CorsInterceptor};
pub use logging::LoggingInterceptor;
pub use metrics::MetricsInterceptor;
pub use recovery::{PanicHandler, RecoveryInterceptor};
