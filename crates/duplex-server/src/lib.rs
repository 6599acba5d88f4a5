//! # Duplex Server
//!
//! Serves RPC and plain HTTP on a single port.
//!
//! - Per-request protocol dispatch: HTTP/2 requests with an
//!   `application/grpc` content type go to the RPC server, everything else
//!   to the HTTP routes
//! - TLS with ALPN, or cleartext HTTP/1.1 and h2c
//! - Built-in health, metrics and development shutdown routes
//! - REST/JSON gateway in front of RPC services
//! - Static files and single-page apps under a path prefix
//! - Ordered startup and graceful, bounded shutdown
//!
//! ## Example
//!
//! ```rust,no_run
//! use duplex_config::ConfigLoader;
//! use duplex_server::ServerBuilder;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = ConfigLoader::new()
//!         .with_optional_file("duplex.toml")?
//!         .with_env_prefix("DUPLEX")
//!         .load()?;
//!
//!     ServerBuilder::from_settings(&settings)?.build()?.run().await?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/duplex-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod builtin;
mod config;
mod conn;
mod dispatch;
mod error;
mod lifecycle;
mod route;
mod server;
mod shutdown;
mod static_files;
mod tls;

pub use config::{
    ServerConfig, ServerConfigBuilder, DEFAULT_ADDRESS, DEFAULT_HEALTH_PATH, DEFAULT_METRICS_PATH, DEFAULT_TIMEOUT,
};
pub use dispatch::{is_rpc, RPC_CONTENT_TYPE};
pub use error::ServerError;
pub use lifecycle::BoundServer;
pub use route::{handler_fn, HttpHandler, HttpRoute};
pub use server::{Server, ServerBuilder};
pub use shutdown::{wait_for_os_signal, ConnectionToken, ConnectionTracker, ShutdownSignal};
pub use static_files::{StaticFileError, StaticFiles};
pub use tls::{TlsFiles, ALPN_PROTOCOLS};
