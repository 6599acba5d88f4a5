//! Call kinds.
//!
//! Interceptors are generic over a [`CallKind`], which fixes what flows into
//! and out of a chain:
//!
//! | Kind | Input | Output |
//! |------|-------|--------|
//! | [`Unary`] | [`Call`] | `Result<Bytes, Status>` |
//! | [`ServerStream`] | [`Call`] | `Result<MessageStream, Status>` |
//! | [`Http`] | [`HttpCall`] | [`HttpResponse`] |

use std::fmt;
use std::net::SocketAddr;

use bytes::Bytes;
use duplex_core::{CallContext, Code, Status};
use futures_util::stream::BoxStream;
use http::{HeaderValue, Method, StatusCode};

use crate::types::{status_response, HttpRequest, HttpResponse};

/// Stream of encoded response messages produced by a server-streaming call.
pub type MessageStream = BoxStream<'static, Result<Bytes, Status>>;

/// An RPC call: context plus the encoded request message.
#[derive(Debug, Clone)]
pub struct Call {
    /// Per-call context. `ctx.method()` is the full method name.
    pub ctx: CallContext,
    /// Encoded request message.
    pub payload: Bytes,
}

impl Call {
    /// Creates a call.
    pub fn new(ctx: CallContext, payload: impl Into<Bytes>) -> Self {
        Self {
            ctx,
            payload: payload.into(),
        }
    }
}

/// A plain HTTP request with its call context.
#[derive(Debug)]
pub struct HttpCall {
    /// Per-call context. `ctx.method()` is the request path.
    pub ctx: CallContext,
    /// The request, body already read.
    pub request: HttpRequest,
}

impl HttpCall {
    /// Creates an HTTP call, seeding the context from the request path and
    /// headers.
    pub fn new(request: HttpRequest) -> Self {
        let ctx = CallContext::new(request.uri().path()).with_metadata(request.headers().clone());
        Self { ctx, request }
    }

    /// Records the remote address of the connection.
    #[must_use]
    pub fn with_peer(mut self, peer: Option<SocketAddr>) -> Self {
        self.ctx = self.ctx.with_peer(peer);
        self
    }
}

/// Access to the call context of a chain input.
pub trait HasContext {
    /// Returns the context.
    fn context(&self) -> &CallContext;
    /// Returns the context mutably.
    fn context_mut(&mut self) -> &mut CallContext;
}

impl HasContext for Call {
    fn context(&self) -> &CallContext {
        &self.ctx
    }

    fn context_mut(&mut self) -> &mut CallContext {
        &mut self.ctx
    }
}

impl HasContext for HttpCall {
    fn context(&self) -> &CallContext {
        &self.ctx
    }

    fn context_mut(&mut self) -> &mut CallContext {
        &mut self.ctx
    }
}

/// Labels describing a call, captured before it runs.
#[derive(Debug, Clone)]
pub struct CallInfo {
    /// `"unary"`, `"server_stream"` or `"http"`.
    pub kind: &'static str,
    /// Full RPC method, or the HTTP path.
    pub method: String,
    /// HTTP verb, for HTTP calls.
    pub http_method: Option<Method>,
}

/// Outcome of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    /// RPC status code.
    Rpc(Code),
    /// HTTP status.
    Http(StatusCode),
}

impl CallStatus {
    /// Returns `true` for non-OK codes and 5xx responses.
    pub fn is_error(self) -> bool {
        match self {
            Self::Rpc(code) => code != Code::Ok,
            Self::Http(status) => status.is_server_error(),
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rpc(code) => f.write_str(code.as_str()),
            Self::Http(status) => f.write_str(status.as_str()),
        }
    }
}

/// A kind of call a chain processes.
pub trait CallKind: Send + Sync + 'static {
    /// What enters the chain.
    type Input: HasContext + Send + 'static;
    /// What leaves the chain.
    type Output: Send + 'static;

    /// Describes a call for logs and metrics.
    fn describe(input: &Self::Input) -> CallInfo;

    /// Classifies an output.
    fn status(output: &Self::Output) -> CallStatus;

    /// Produces the short-circuit output for a rejected call.
    fn reject(status: Status) -> Self::Output;

    /// Attaches a response header, where the output has headers.
    fn set_header(_output: &mut Self::Output, _name: &'static str, _value: HeaderValue) {}
}

/// Unary RPC calls.
#[derive(Debug, Clone, Copy)]
pub enum Unary {}

impl CallKind for Unary {
    type Input = Call;
    type Output = Result<Bytes, Status>;

    fn describe(input: &Call) -> CallInfo {
        CallInfo {
            kind: "unary",
            method: input.ctx.method().to_string(),
            http_method: None,
        }
    }

    fn status(output: &Self::Output) -> CallStatus {
        CallStatus::Rpc(output.as_ref().map_or_else(Status::code, |_| Code::Ok))
    }

    fn reject(status: Status) -> Self::Output {
        Err(status)
    }
}

/// Server-streaming RPC calls.
#[derive(Debug, Clone, Copy)]
pub enum ServerStream {}

impl CallKind for ServerStream {
    type Input = Call;
    type Output = Result<MessageStream, Status>;

    fn describe(input: &Call) -> CallInfo {
        CallInfo {
            kind: "server_stream",
            method: input.ctx.method().to_string(),
            http_method: None,
        }
    }

    fn status(output: &Self::Output) -> CallStatus {
        CallStatus::Rpc(output.as_ref().map_or_else(Status::code, |_| Code::Ok))
    }

    fn reject(status: Status) -> Self::Output {
        Err(status)
    }
}

/// Plain HTTP requests.
#[derive(Debug, Clone, Copy)]
pub enum Http {}

impl CallKind for Http {
    type Input = HttpCall;
    type Output = HttpResponse;

    fn describe(input: &HttpCall) -> CallInfo {
        CallInfo {
            kind: "http",
            method: input.request.uri().path().to_string(),
            http_method: Some(input.request.method().clone()),
        }
    }

    fn status(output: &HttpResponse) -> CallStatus {
        CallStatus::Http(output.status())
    }

    fn reject(status: Status) -> HttpResponse {
        status_response(&status)
    }

    fn set_header(output: &mut HttpResponse, name: &'static str, value: HeaderValue) {
        output.headers_mut().insert(name, value);
    }
}
