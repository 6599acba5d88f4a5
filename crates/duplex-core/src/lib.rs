//! # Duplex Core
//!
//! Core types shared by every layer of the duplex runtime.
//!
//! - [`CallContext`] - Per-call context carrying metadata, correlation id and identity
//! - [`CorrelationId`] - Opaque identifier propagated for log correlation
//! - [`Identity`] - Authenticated caller identity
//! - [`Status`] / [`Code`] - Per-call error value shared by RPC and the gateway
//! - [`metadata`] - Well-known metadata keys

#![doc(html_root_url = "https://docs.rs/duplex-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod error;
mod identity;
pub mod metadata;

use std::future::Future;
use std::pin::Pin;

pub use context::{CallContext, CorrelationId};
pub use error::{Code, Status, StatusResult};
pub use identity::Identity;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A boxed, sendable error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
