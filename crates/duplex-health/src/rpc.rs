//! The `grpc.health.v1.Health` service.

use std::sync::Arc;

use duplex_core::{CallContext, Status};
use duplex_rpc::{Service, ServiceRegistrar};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use crate::server::HealthServer;

/// Fully qualified name of the health service.
pub const SERVICE_NAME: &str = "grpc.health.v1.Health";

/// Full name of the `Check` method.
pub const CHECK_METHOD: &str = "/grpc.health.v1.Health/Check";

/// Full name of the `Watch` method.
pub const WATCH_METHOD: &str = "/grpc.health.v1.Health/Watch";

/// `HealthCheckRequest`.
#[derive(Clone, PartialEq, Eq, prost::Message, Serialize, Deserialize)]
pub struct HealthCheckRequest {
    /// Service name; empty for the overall status.
    #[prost(string, tag = "1")]
    #[serde(default)]
    pub service: String,
}

/// `HealthCheckResponse`.
#[derive(Clone, PartialEq, Eq, prost::Message, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    /// [`ServingStatus`](crate::ServingStatus) value.
    #[prost(int32, tag = "1")]
    #[serde(default)]
    pub status: i32,
}

/// Serves the health protocol over RPC.
#[derive(Debug, Clone)]
pub struct HealthService {
    health: HealthServer,
}

impl HealthService {
    /// Wraps a health server.
    pub fn new(health: HealthServer) -> Self {
        Self { health }
    }
}

impl Service for HealthService {
    fn name(&self) -> &str {
        SERVICE_NAME
    }

    fn register(self: Arc<Self>, registrar: &mut ServiceRegistrar<'_>) {
        let check = self.health.clone();
        let watch = self.health.clone();
        registrar
            .unary("Check", move |_ctx: CallContext, req: HealthCheckRequest| {
                let result = check
                    .check(&req.service)
                    .map(|status| HealthCheckResponse {
                        status: status.as_i32(),
                    })
                    .map_err(Status::from);
                async move { result }
            })
            .server_streaming("Watch", move |_ctx: CallContext, req: HealthCheckRequest| {
                let updates = watch.watch(&req.service).map(|status| {
                    Ok(HealthCheckResponse {
                        status: status.as_i32(),
                    })
                });
                async move { Ok::<_, Status>(updates) }
            });
    }
}
