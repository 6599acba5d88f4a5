//! # Duplex
//!
//! **A single-port RPC + HTTP service runtime.**
//!
//! - **One listener**: RPC calls and plain HTTP share a port; each request is
//!   dispatched on its protocol version and content type
//! - **Interceptor chains**: correlation ids, authentication with an
//!   allow-list, panic recovery, logging and metrics, in a fixed order
//! - **Health**: periodic dependency probes served over RPC and HTTP
//! - **Gateway**: REST/JSON bindings in front of RPC methods
//! - **Lifecycle**: ordered startup, graceful and bounded shutdown
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use duplex::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = ConfigLoader::new()
//!         .with_optional_file("duplex.toml")?
//!         .with_env_prefix(DEFAULT_ENV_PREFIX)
//!         .load()?;
//!     init_logging(&settings.telemetry.logging)?;
//!
//!     ServerBuilder::from_settings(&settings)?
//!         .route(HttpRoute::new("/hello", |_| async {
//!             json_response(StatusCode::OK, r#"{"hello":"world"}"#)
//!         }))
//!         .checker("disk", checker_fn(|_ctx| async { Ok(()) }))
//!         .build()?
//!         .run()
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Request Flow
//!
//! ```text
//!                 ┌─ HTTP/2 + application/grpc* ─→ RPC chain ─→ method
//! connection ─→ dispatch
//!                 └─ anything else ─→ CORS ─→ route table ─→ HTTP chain ─→ handler
//!                                                        └─→ gateway ─→ RPC chain ─→ method
//! ```

#![doc(html_root_url = "https://docs.rs/duplex/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub use duplex_config as config;
pub use duplex_core as core;
pub use duplex_health as health;
pub use duplex_middleware as middleware;
pub use duplex_router as router;
pub use duplex_rpc as rpc;
pub use duplex_server as server;
pub use duplex_telemetry as telemetry;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use duplex::prelude::*;
///
/// let config = ServerConfig::builder().address("127.0.0.1:0").build().unwrap();
/// assert_eq!(config.api_prefix(), "/");
/// ```
pub mod prelude {
    pub use duplex_config::{ConfigLoader, DuplexConfig, DEFAULT_ENV_PREFIX};
    pub use duplex_core::{CallContext, Code, Status};
    pub use duplex_health::{checker_fn, Checker, HealthError, HealthServer, ProbeContext, ServingStatus};
    pub use duplex_middleware::auth::{AllowListed, SharedSecretAuthenticator};
    pub use duplex_middleware::stages::CorsInterceptor;
    pub use duplex_middleware::types::{json_response, status_response};
    pub use duplex_middleware::{Authenticator, HttpCall, HttpResponse, Interceptor, Next};
    pub use duplex_router::Params;
    pub use duplex_rpc::{EndpointService, GatewayBinding, Service, ServiceRegistrar};
    pub use duplex_server::{HttpRoute, Server, ServerBuilder, ServerConfig, ServerError, ShutdownSignal, StaticFiles};
    pub use duplex_telemetry::{init_logging, LogConfig};
    pub use http::{Method, StatusCode};
}
