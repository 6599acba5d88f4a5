//! # Duplex Middleware
//!
//! Composable interceptor chains applied to every call the runtime serves.
//!
//! Interceptors are generic over a [`CallKind`]: [`Unary`] and
//! [`ServerStream`] RPC calls, and plain [`Http`] requests. Each kind gets its
//! own [`Chain`], executed in registration order with the first interceptor
//! outermost.
//!
//! ## Stock order
//!
//! ```text
//! Call → CorrelationId → Auth → Recovery → app interceptors → Handler
//!                                                                ↓
//! Output ←──────────────────────────────────────────────────────┘
//! ```
//!
//! | Step | Interceptor | Purpose |
//! |------|-------------|---------|
//! | 1 | [`CorrelationIdInterceptor`] | Propagate or generate the correlation id |
//! | 2 | [`AuthInterceptor`] | Authenticate unless the method is allow-listed |
//! | 3 | [`RecoveryInterceptor`] | Turn panics into `INTERNAL` errors |
//! | 4 | application | e.g. [`LoggingInterceptor`], [`MetricsInterceptor`] |
//!
//! ## Example
//!
//! ```
//! use duplex_middleware::stages::RecoveryInterceptor;
//! use duplex_middleware::{ChainBuilder, Unary};
//!
//! let chain = ChainBuilder::<Unary>::new()
//!     .recovery(RecoveryInterceptor::new())
//!     .build();
//! assert_eq!(chain.names(), ["correlation_id", "recovery"]);
//! ```

#![doc(html_root_url = "https://docs.rs/duplex-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod chain;
pub mod interceptor;
pub mod kind;
pub mod stages;
pub mod types;

pub use auth::{AllowList, AuthError, Authenticator};
pub use chain::{Chain, ChainBuilder};
pub use interceptor::{FnInterceptor, Interceptor, Next};
pub use kind::{Call, CallInfo, CallKind, CallStatus, HasContext, Http, HttpCall, MessageStream, ServerStream, Unary};
pub use stages::{
    AuthInterceptor, CorrelationIdInterceptor, CorsInterceptor, HttpAuthInterceptor, LoggingInterceptor,
    MetricsInterceptor, RecoveryInterceptor,
};
pub use types::{HttpRequest, HttpResponse, ResponseBody};
