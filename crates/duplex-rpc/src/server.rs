//! RPC server.
//!
//! [`RpcServer`] owns the method registry and the unary and stream
//! interceptor chains. [`RpcServer::handle`] serves one HTTP/2 RPC request;
//! [`RpcServer::unary`] and [`RpcServer::server_stream`] run a decoded call
//! and are shared with the gateway.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use duplex_core::{metadata, CallContext, Code, Status};
use duplex_middleware::types::{empty_response, HttpResponse, ResponseBody};
use duplex_middleware::{Call, Chain, MessageStream, ServerStream, Unary};
use futures_util::{stream, StreamExt};
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Method, Request, StatusCode};
use hyper::body::Frame;
use http_body_util::{BodyExt, StreamBody};

use crate::codec::Codec;
use crate::frame::{decode_messages, encode_frame, parse_timeout, status_trailers, DEFAULT_MAX_MESSAGE_LEN};
use crate::registry::{MethodHandler, MethodKind, RpcRegistry};

/// Serves RPC calls against a registry.
#[derive(Debug, Clone)]
pub struct RpcServer {
    registry: Arc<RpcRegistry>,
    unary_chain: Chain<Unary>,
    stream_chain: Chain<ServerStream>,
    max_message_len: usize,
}

impl RpcServer {
    /// Creates a server with empty chains.
    pub fn new(registry: RpcRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            unary_chain: Chain::empty(),
            stream_chain: Chain::empty(),
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
        }
    }

    /// Sets the chain wrapping unary calls.
    #[must_use]
    pub fn with_unary_chain(mut self, chain: Chain<Unary>) -> Self {
        self.unary_chain = chain;
        self
    }

    /// Sets the chain wrapping server-streaming calls.
    #[must_use]
    pub fn with_stream_chain(mut self, chain: Chain<ServerStream>) -> Self {
        self.stream_chain = chain;
        self
    }

    /// Sets the largest accepted request message.
    #[must_use]
    pub fn with_max_message_len(mut self, max: usize) -> Self {
        self.max_message_len = max;
        self
    }

    /// Returns the registry.
    pub fn registry(&self) -> &RpcRegistry {
        &self.registry
    }

    /// Returns `true` if no methods are registered.
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Returns the largest accepted request message.
    pub fn max_message_len(&self) -> usize {
        self.max_message_len
    }

    /// Answers an RPC request with `status` without running it, for requests
    /// refused before their body is read.
    pub fn reject<B>(request: &Request<B>, status: Status) -> HttpResponse {
        match codec_of(request) {
            Some(codec) => respond(codec, failed(status)),
            None => empty_response(StatusCode::UNSUPPORTED_MEDIA_TYPE),
        }
    }

    /// Runs a unary call through the unary chain.
    ///
    /// A deadline on the call context bounds the whole chain; expiry yields
    /// `DEADLINE_EXCEEDED`.
    pub async fn unary(&self, codec: Codec, call: Call) -> Result<Bytes, Status> {
        let handler = match self.registry.get(call.ctx.method()) {
            Some(MethodHandler::Unary(handler)) => Arc::clone(handler),
            _ => return Err(unimplemented(call.ctx.method())),
        };
        let remaining = call.ctx.remaining();
        let run = self.unary_chain.run(call, move |call| handler(codec, call));
        match remaining {
            Some(remaining) => tokio::time::timeout(remaining, run)
                .await
                .unwrap_or_else(|_| Err(Status::deadline_exceeded("deadline exceeded"))),
            None => run.await,
        }
    }

    /// Runs a server-streaming call through the stream chain.
    pub async fn server_stream(&self, codec: Codec, call: Call) -> Result<MessageStream, Status> {
        let handler = match self.registry.get(call.ctx.method()) {
            Some(MethodHandler::ServerStreaming(handler)) => Arc::clone(handler),
            _ => return Err(unimplemented(call.ctx.method())),
        };
        self.stream_chain.run(call, move |call| handler(codec, call)).await
    }

    /// Serves one RPC request.
    ///
    /// The request body must hold exactly one framed message. The response
    /// is always `200`; the call outcome is in the trailers.
    pub async fn handle(&self, request: Request<Bytes>, peer: Option<SocketAddr>) -> HttpResponse {
        let Some(codec) = codec_of(&request) else {
            return empty_response(StatusCode::UNSUPPORTED_MEDIA_TYPE);
        };

        let (parts, body) = request.into_parts();
        let method = parts.uri.path().to_string();
        if parts.method != Method::POST {
            return respond(codec, failed(Status::unimplemented(format!("{} is not supported", parts.method))));
        }
        let Some(kind) = self.registry.kind(&method) else {
            tracing::debug!(rpc.method = %method, "unknown method");
            return respond(codec, failed(unimplemented(&method)));
        };

        let mut ctx = CallContext::new(method).with_metadata(parts.headers).with_peer(peer);
        if let Some(timeout) = ctx.metadata_value(metadata::GRPC_TIMEOUT).and_then(parse_timeout) {
            ctx = ctx.with_timeout(timeout);
        }
        let payload = match self.single_message(body) {
            Ok(payload) => payload,
            Err(status) => return respond(codec, failed(status)),
        };
        let call = Call::new(ctx, payload);

        let messages = match kind {
            MethodKind::Unary => match self.unary(codec, call).await {
                Ok(message) => stream::once(async move { Ok(message) }).boxed(),
                Err(status) => failed(status),
            },
            MethodKind::ServerStreaming => match self.server_stream(codec, call).await {
                Ok(messages) => messages,
                Err(status) => failed(status),
            },
        };
        respond(codec, messages)
    }

    fn single_message(&self, body: Bytes) -> Result<Bytes, Status> {
        let mut messages = decode_messages(body, self.max_message_len)?;
        if messages.len() != 1 {
            return Err(Status::internal(format!(
                "expected exactly one request message, got {}",
                messages.len()
            )));
        }
        Ok(messages.remove(0))
    }
}

fn codec_of<B>(request: &Request<B>) -> Option<Codec> {
    request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(Codec::from_content_type)
}

fn unimplemented(method: &str) -> Status {
    Status::unimplemented(format!("unknown method {method}"))
}

fn failed(status: Status) -> MessageStream {
    stream::once(async move { Err(status) }).boxed()
}

/// Builds the `200` response streaming framed messages, then trailers.
fn respond(codec: Codec, messages: MessageStream) -> HttpResponse {
    let mut response = http::Response::new(framed(messages));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(codec.content_type()));
    response
}

/// Frames each message; the first error, or the end of the stream, becomes
/// the trailers.
fn framed(messages: MessageStream) -> ResponseBody {
    let frames = stream::unfold(Some(messages), |state| async move {
        let mut messages = state?;
        let frame = match messages.next().await {
            Some(Ok(message)) => return Some((Frame::data(encode_frame(&message)), Some(messages))),
            Some(Err(status)) => Frame::trailers(status_trailers(status.code(), status.message())),
            None => Frame::trailers(status_trailers(Code::Ok, "")),
        };
        Some((frame, None))
    })
    .map(Ok::<_, Infallible>);
    StreamBody::new(frames).boxed_unsync()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{GRPC_MESSAGE, GRPC_STATUS};
    use duplex_core::BoxFuture;
    use duplex_middleware::{ChainBuilder, Interceptor, Next};
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
    struct Number {
        #[prost(int64, tag = "1")]
        #[serde(default)]
        value: i64,
    }

    fn registry() -> RpcRegistry {
        let mut registry = RpcRegistry::new();
        registry
            .unary("/math.v1.Math/Double", |_ctx, n: Number| async move {
                Ok(Number { value: n.value * 2 })
            })
            .unary("/math.v1.Math/Fail", |_ctx, _n: Number| async move {
                Err::<Number, _>(Status::failed_precondition("no way"))
            })
            .unary("/math.v1.Math/Slow", |_ctx, n: Number| async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(n)
            })
            .server_streaming("/math.v1.Math/Count", |_ctx, n: Number| async move {
                let items: Vec<Result<Number, Status>> = (1..=n.value).map(|value| Ok(Number { value })).collect();
                Ok(futures_util::stream::iter(items))
            });
        registry
    }

    fn request(method: &str, content_type: &str, body: Bytes) -> Request<Bytes> {
        Request::post(method)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .unwrap()
    }

    async fn collect(response: HttpResponse) -> (Vec<Bytes>, http::HeaderMap) {
        let collected = response.into_body().collect().await.unwrap();
        let trailers = collected.trailers().cloned().unwrap_or_default();
        let messages = decode_messages(collected.to_bytes(), DEFAULT_MAX_MESSAGE_LEN).unwrap();
        (messages, trailers)
    }

    #[tokio::test]
    async fn unary_proto_call() {
        let server = RpcServer::new(registry());
        let body = encode_frame(&Codec::Proto.encode(&Number { value: 21 }).unwrap());
        let response = server
            .handle(request("/math.v1.Math/Double", "application/grpc", body), None)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/grpc+proto");

        let (messages, trailers) = collect(response).await;
        assert_eq!(trailers[GRPC_STATUS], "0");
        let out: Number = Codec::Proto.decode(&messages[0]).unwrap();
        assert_eq!(out.value, 42);
    }

    #[tokio::test]
    async fn errors_travel_in_trailers() {
        let server = RpcServer::new(registry());
        let body = encode_frame(b"{}");
        let response = server
            .handle(request("/math.v1.Math/Fail", "application/grpc+json", body), None)
            .await;
        let (messages, trailers) = collect(response).await;
        assert!(messages.is_empty());
        assert_eq!(trailers[GRPC_STATUS], "9");
        assert_eq!(trailers[GRPC_MESSAGE], "no%20way");
    }

    #[tokio::test]
    async fn unknown_method_is_unimplemented() {
        let server = RpcServer::new(registry());
        let response = server
            .handle(request("/math.v1.Math/Nope", "application/grpc", encode_frame(b"")), None)
            .await;
        let (_, trailers) = collect(response).await;
        assert_eq!(trailers[GRPC_STATUS], "12");
    }

    #[tokio::test]
    async fn unsupported_subtype_is_415() {
        let server = RpcServer::new(registry());
        let response = server
            .handle(request("/math.v1.Math/Double", "application/grpc+xml", Bytes::new()), None)
            .await;
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn request_must_hold_one_message() {
        let server = RpcServer::new(registry());
        let mut body = encode_frame(b"{}").to_vec();
        body.extend_from_slice(&encode_frame(b"{}"));
        let response = server
            .handle(request("/math.v1.Math/Double", "application/grpc+json", body.into()), None)
            .await;
        let (_, trailers) = collect(response).await;
        assert_eq!(trailers[GRPC_STATUS], "13");
    }

    #[tokio::test]
    async fn streaming_call_frames_every_message() {
        let server = RpcServer::new(registry());
        let body = encode_frame(br#"{"value":3}"#);
        let response = server
            .handle(request("/math.v1.Math/Count", "application/grpc+json", body), None)
            .await;
        let (messages, trailers) = collect(response).await;
        assert_eq!(messages, vec![
            Bytes::from(r#"{"value":1}"#),
            Bytes::from(r#"{"value":2}"#),
            Bytes::from(r#"{"value":3}"#),
        ]);
        assert_eq!(trailers[GRPC_STATUS], "0");
    }

    #[tokio::test]
    async fn rejected_requests_carry_status_in_trailers() {
        let response = RpcServer::reject(
            &request("/math.v1.Math/Double", "application/grpc+json", Bytes::new()),
            Status::resource_exhausted("request body too large"),
        );
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/grpc+json");
        let (messages, trailers) = collect(response).await;
        assert!(messages.is_empty());
        assert_eq!(trailers[GRPC_STATUS], "8");

        let response = RpcServer::reject(
            &request("/math.v1.Math/Double", "application/grpc+xml", Bytes::new()),
            Status::resource_exhausted("request body too large"),
        );
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test(start_paused = true)]
    async fn grpc_timeout_bounds_unary_calls() {
        let server = RpcServer::new(registry());
        let mut req = request("/math.v1.Math/Slow", "application/grpc+json", encode_frame(b"{}"));
        req.headers_mut().insert("grpc-timeout", HeaderValue::from_static("100m"));
        let (_, trailers) = collect(server.handle(req, None).await).await;
        assert_eq!(trailers[GRPC_STATUS], "4");
    }

    struct Deny;

    impl Interceptor<Unary> for Deny {
        fn name(&self) -> &'static str {
            "deny"
        }

        fn intercept<'a>(&'a self, _call: Call, _next: Next<'a, Unary>) -> BoxFuture<'a, Result<Bytes, Status>> {
            Box::pin(async { Err(Status::permission_denied("denied")) })
        }
    }

    #[tokio::test]
    async fn unary_chain_wraps_handler() {
        let server = RpcServer::new(registry()).with_unary_chain(ChainBuilder::new().with(Deny).build());
        let err = server
            .unary(Codec::Json, Call::new(CallContext::new("/math.v1.Math/Double"), "{}"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::PermissionDenied);

        // Unknown methods never enter the chain.
        let err = server
            .unary(Codec::Json, Call::new(CallContext::new("/math.v1.Math/Nope"), "{}"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unimplemented);
    }
}
