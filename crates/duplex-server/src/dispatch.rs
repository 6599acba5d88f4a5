//! Protocol dispatch.
//!
//! Every request arriving on the shared listener is routed to one of two
//! handlers: the RPC server when [`is_rpc`] holds, the HTTP route table
//! otherwise. The decision is made per request, so a single HTTP/2
//! connection may carry both kinds.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use duplex_core::{BoxFuture, Status};
use duplex_middleware::types::{json_response, status_response};
use duplex_middleware::{Chain, Http, HttpCall, HttpResponse};
use duplex_router::{RouteMatch, RouteTable};
use duplex_rpc::frame::HEADER_LEN;
use duplex_rpc::RpcServer;
use http::header::CONTENT_TYPE;
use http::{Request, StatusCode, Version};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Body;

use crate::route::RouteEntry;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Content-type prefix of RPC requests.
pub const RPC_CONTENT_TYPE: &str = "application/grpc";

/// Returns `true` if the request is an RPC call: HTTP/2 with a content type
/// starting with `application/grpc`.
///
/// ```rust
/// use duplex_server::is_rpc;
/// use http::{Request, Version};
///
/// let rpc = Request::post("/pkg.Svc/Method")
///     .version(Version::HTTP_2)
///     .header("content-type", "application/grpc+proto")
///     .body(())
///     .unwrap();
/// assert!(is_rpc(&rpc));
///
/// let json = Request::post("/v1/items")
///     .version(Version::HTTP_2)
///     .header("content-type", "application/json")
///     .body(())
///     .unwrap();
/// assert!(!is_rpc(&json));
/// ```
pub fn is_rpc<B>(request: &Request<B>) -> bool {
    request.version() == Version::HTTP_2
        && request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|content_type| content_type.starts_with(RPC_CONTENT_TYPE))
}

/// Routes requests to the RPC server or the HTTP routes.
pub(crate) struct Dispatcher {
    rpc: Arc<RpcServer>,
    routes: RouteTable<RouteEntry>,
    edge: Chain<Http>,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl Dispatcher {
    pub(crate) fn new(
        rpc: Arc<RpcServer>,
        routes: RouteTable<RouteEntry>,
        edge: Chain<Http>,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> Self {
        Self {
            rpc,
            routes,
            edge,
            read_timeout,
            write_timeout,
        }
    }

    /// Reads the body and serves the request.
    ///
    /// Bodies are capped at one maximum-size RPC frame. Larger bodies get
    /// `RESOURCE_EXHAUSTED` trailers on RPC and `413` on plain HTTP.
    pub(crate) async fn dispatch<B>(&self, request: Request<B>, peer: Option<SocketAddr>) -> HttpResponse
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let rpc = is_rpc(&request);
        let (parts, body) = request.into_parts();
        let limit = self.rpc.max_message_len().saturating_add(HEADER_LEN);
        let body = match tokio::time::timeout(self.read_timeout, Limited::new(body, limit).collect()).await {
            Ok(Ok(collected)) => collected.to_bytes(),
            Ok(Err(e)) if e.downcast_ref::<LengthLimitError>().is_some() => {
                tracing::debug!(path = parts.uri.path(), limit, "request body too large");
                let status = Status::resource_exhausted(format!("request body exceeds {limit} bytes"));
                if rpc {
                    return RpcServer::reject(&Request::from_parts(parts, ()), status);
                }
                return json_response(StatusCode::PAYLOAD_TOO_LARGE, status.to_json_bytes());
            }
            Ok(Err(e)) => {
                tracing::debug!(path = parts.uri.path(), error = %e, "failed to read request body");
                return status_response(&Status::invalid_argument(format!("failed to read request body: {e}")));
            }
            Err(_) => {
                tracing::debug!(path = parts.uri.path(), "request body read timed out");
                let status = Status::deadline_exceeded("request body read timed out");
                return json_response(StatusCode::REQUEST_TIMEOUT, status.to_json_bytes());
            }
        };
        let request = Request::from_parts(parts, body);

        if rpc {
            return self.rpc.handle(request, peer).await;
        }

        let path = request.uri().path().to_string();
        let call = HttpCall::new(request).with_peer(peer);
        match tokio::time::timeout(self.write_timeout, self.serve_http(call)).await {
            Ok(response) => response,
            Err(_) => {
                tracing::warn!(path = %path, timeout = ?self.write_timeout, "HTTP handler timed out");
                status_response(&Status::deadline_exceeded("handler timed out"))
            }
        }
    }

    async fn serve_http(&self, call: HttpCall) -> HttpResponse {
        self.edge.run(call, |call| self.route(call)).await
    }

    fn route(&self, mut call: HttpCall) -> BoxFuture<'_, HttpResponse> {
        Box::pin(async move {
            let Some(RouteMatch { route, params }) = self.routes.find_request(&call.request) else {
                return match self.routes.not_found() {
                    Some(fallback) => fallback.call(call).await,
                    None => not_found(),
                };
            };
            call.request.extensions_mut().insert(params);
            route.handler().call(call).await
        })
    }
}

/// `404 {"code":5,"message":"Not Found"}`.
pub(crate) fn not_found() -> HttpResponse {
    status_response(&Status::not_found("Not Found"))
}
