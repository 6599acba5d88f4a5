//! # Duplex RPC
//!
//! The RPC half of the duplex runtime:
//!
//! - [`frame`] - 5-byte length-prefixed framing and status trailers
//! - [`Codec`] - protobuf (`prost`) and JSON (`serde_json`) message codecs
//! - [`RpcRegistry`] - typed unary and server-streaming handlers, erased
//! - [`Service`] / [`EndpointService`] - service declarations and their
//!   optional REST bindings
//! - [`RpcServer`] - serves RPC requests through the interceptor chains
//! - [`Gateway`] - REST/JSON front end to the same methods
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut registry = RpcRegistry::new();
//! registry.add_service(Users::new(store));
//!
//! let server = Arc::new(RpcServer::new(registry).with_unary_chain(unary_chain));
//! let gateway = Gateway::new(Arc::clone(&server), "/api");
//! ```

#![doc(html_root_url = "https://docs.rs/duplex-rpc/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod codec;
pub mod frame;
pub mod gateway;
pub mod registry;
pub mod server;
pub mod service;

pub use codec::{Codec, RpcMessage};
pub use frame::{FrameCodec, FrameError};
pub use gateway::Gateway;
pub use registry::{MethodHandler, MethodKind, RpcRegistry, ServiceRegistrar, StreamHandler, UnaryHandler};
pub use server::RpcServer;
pub use service::{EndpointService, GatewayBinding, GatewayBody, Service};
