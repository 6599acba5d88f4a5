//! # Duplex Health
//!
//! The health subsystem: per-service serving statuses kept current by
//! periodic, timeout-bounded dependency probes, and served over RPC
//! (`grpc.health.v1.Health`) and HTTP.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use duplex_health::{checker_fn, HealthError, HealthServer, ServingStatus};
//!
//! # async fn run() -> Result<(), HealthError> {
//! let health = HealthServer::builder()
//!     .checker("db", checker_fn(|_ctx| async { Ok(()) }))
//!     .interval(Duration::from_secs(30))
//!     .timeout(Duration::from_secs(2))
//!     .build();
//!
//! health.init(ServingStatus::Serving).await?;
//! assert_eq!(health.check("")?, ServingStatus::Serving);
//! health.close();
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/duplex-health/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod checker;
mod error;
pub mod report;
pub mod rpc;
mod server;
mod state;
mod status;

pub use checker::{checker_fn, Checker, FnChecker, ProbeContext};
pub use error::HealthError;
pub use report::HealthReport;
pub use rpc::HealthService;
pub use server::{HealthConfig, HealthServer, HealthServerBuilder, DEFAULT_INTERVAL, DEFAULT_TIMEOUT};
pub use status::{ServingStatus, OVERALL};
