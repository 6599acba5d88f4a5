//! Demo service: a greeter reachable over RPC and through the gateway, a
//! plain HTTP route and one health checker.
//!
//! ```text
//! duplex-demo [config.toml]
//!
//! curl localhost:8088/v1/hello/ada
//! curl localhost:8088/v1/greetings/ada?count=3
//! curl localhost:8088/whoami
//! curl localhost:8088/internal/health
//! ```
//!
//! Settings come from the optional file, `.env` and `DUPLEX__*` variables,
//! on top of the development defaults.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use duplex::prelude::*;
use futures_util::stream;
use serde::{Deserialize, Serialize};

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
struct HelloRequest {
    #[prost(string, tag = "1")]
    #[serde(default)]
    name: String,
    #[prost(uint32, tag = "2")]
    #[serde(default)]
    count: u32,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
struct HelloReply {
    #[prost(string, tag = "1")]
    #[serde(default)]
    message: String,
}

const MAX_GREETINGS: u32 = 10;

struct Greeter;

impl Greeter {
    fn greet(name: &str) -> Result<HelloReply, Status> {
        if name.is_empty() {
            return Err(Status::invalid_argument("name is required"));
        }
        Ok(HelloReply {
            message: format!("hello, {name}"),
        })
    }
}

impl Service for Greeter {
    fn name(&self) -> &str {
        "demo.v1.Greeter"
    }

    fn register(self: Arc<Self>, registrar: &mut ServiceRegistrar<'_>) {
        registrar
            .unary("SayHello", |ctx: CallContext, req: HelloRequest| async move {
                tracing::debug!(correlation_id = ctx.log_correlation_id(), name = %req.name, "greeting");
                Greeter::greet(&req.name)
            })
            .server_streaming("StreamGreetings", |_ctx: CallContext, req: HelloRequest| async move {
                let reply = Greeter::greet(&req.name)?;
                let count = req.count.clamp(1, MAX_GREETINGS);
                let replies = (1..=count).map(move |n| {
                    Ok(HelloReply {
                        message: format!("{} (#{n})", reply.message),
                    })
                });
                Ok(stream::iter(replies.collect::<Vec<_>>()))
            });
    }

    fn as_endpoint(&self) -> Option<&dyn EndpointService> {
        Some(self)
    }
}

impl EndpointService for Greeter {
    fn gateway_bindings(&self) -> Vec<GatewayBinding> {
        vec![
            GatewayBinding::get("/v1/hello/{name}", "SayHello"),
            GatewayBinding::get("/v1/greetings/{name}", "StreamGreetings"),
        ]
    }
}

fn whoami() -> HttpRoute {
    HttpRoute::new("/whoami", |call| async move {
        let body = serde_json::json!({
            "identity": call.ctx.identity(),
            "correlation_id": call.ctx.log_correlation_id(),
        });
        json_response(StatusCode::OK, body.to_string())
    })
    .methods([Method::GET])
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut loader = ConfigLoader::new().with_development().with_dotenv()?;
    if let Some(path) = std::env::args().nth(1) {
        loader = loader
            .with_file(&path)
            .with_context(|| format!("loading {path}"))?;
    }
    let settings = loader.with_env_prefix(DEFAULT_ENV_PREFIX).load()?;
    init_logging(&settings.telemetry.logging)?;

    let started = Instant::now();
    let uptime = checker_fn(move |_ctx| async move {
        if started.elapsed() < Duration::from_secs(1) {
            return Err(HealthError::failed("warming up"));
        }
        Ok(())
    });

    let server = ServerBuilder::from_settings(&settings)?
        .service(Greeter)
        .route(whoami())
        .checker("uptime", uptime)
        .build()?;

    tracing::info!(config = ?server.config(), "starting demo");
    server.run().await?;
    Ok(())
}
