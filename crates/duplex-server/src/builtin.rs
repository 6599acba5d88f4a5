//! Routes the server mounts on its own: health, metrics and the
//! development shutdown hook.

use duplex_core::Status;
use duplex_health::HealthServer;
use duplex_middleware::types::{full, status_response};
use duplex_middleware::HttpResponse;
use duplex_router::RouteSpec;
use http::header::CONTENT_TYPE;
use http::{Method, Response, StatusCode};

use crate::route::{handler_fn, HttpRoute};
use crate::shutdown::ShutdownSignal;

const PROMETHEUS_TEXT: &str = "text/plain; version=0.0.4";

/// `GET <path>` answering with the health report.
pub(crate) fn health_route(path: &str, health: HealthServer) -> HttpRoute {
    let handler = handler_fn(move |call| {
        let response = health.http_response(call.request.uri().query());
        async move { response }
    });
    HttpRoute::from_handler(RouteSpec::new(path).methods([Method::GET]), handler)
}

/// `GET <path>` rendering the Prometheus registry.
pub(crate) fn metrics_route(path: &str) -> HttpRoute {
    HttpRoute::new(path, |_call| async { metrics_response() }).methods([Method::GET])
}

fn metrics_response() -> HttpResponse {
    match duplex_telemetry::render_metrics() {
        Some(text) => Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, PROMETHEUS_TEXT)
            .body(full(text))
            .unwrap_or_else(|_| status_response(&Status::internal("failed to build response"))),
        None => status_response(&Status::unavailable("metrics are not initialized")),
    }
}

/// Any method on `<path>` triggers a graceful shutdown.
pub(crate) fn shutdown_hook_route(path: &str, signal: ShutdownSignal) -> HttpRoute {
    HttpRoute::new(path, move |call| {
        let signal = signal.clone();
        async move {
            tracing::warn!(
                correlation_id = call.ctx.log_correlation_id(),
                "shutdown requested through hook"
            );
            signal.trigger();
            Response::builder()
                .status(StatusCode::OK)
                .body(full("shutting down\n"))
                .unwrap_or_else(|_| status_response(&Status::internal("failed to build response")))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use duplex_health::ServingStatus;
    use duplex_middleware::{Chain, HttpCall};
    use http_body_util::BodyExt;

    fn get(path: &str) -> HttpCall {
        HttpCall::new(http::Request::get(path).body(Bytes::new()).unwrap())
    }

    async fn body(response: HttpResponse) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn health_route_reports_status() {
        let health = HealthServer::default();
        health.set_status("db", ServingStatus::NotServing);
        let route = health_route("/internal/health", health).into_route(&Chain::empty());

        let response = route.handler().call(get("/internal/health?service=db")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body(response).await).unwrap();
        assert_eq!(json["status"], ServingStatus::NotServing.as_i32());
        assert_eq!(route.spec().allowed_methods(), &[Method::GET]);
    }

    #[tokio::test]
    async fn hook_triggers_shutdown() {
        let signal = ShutdownSignal::new();
        let route = shutdown_hook_route("/internal/shutdown", signal.clone()).into_route(&Chain::empty());

        let response = route.handler().call(get("/internal/shutdown")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(signal.is_shutdown());
    }

    #[test]
    fn metrics_route_is_get_only() {
        let route = metrics_route("/internal/metrics");
        assert_eq!(route.spec().path(), "/internal/metrics");
        assert_eq!(route.spec().allowed_methods(), &[Method::GET]);
    }
}
