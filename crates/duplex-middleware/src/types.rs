//! HTTP request/response types used by HTTP-kind interceptors and handlers.

use std::convert::Infallible;

use bytes::Bytes;
use duplex_core::Status;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};

/// Response body type shared by every handler.
///
/// Boxed so plain payloads and streamed RPC frames can share one type.
pub type ResponseBody = UnsyncBoxBody<Bytes, Infallible>;

/// An HTTP request whose body has already been read.
pub type HttpRequest = http::Request<Bytes>;

/// An HTTP response.
pub type HttpResponse = http::Response<ResponseBody>;

/// `application/json` content type.
pub const APPLICATION_JSON: &str = "application/json";

/// Wraps bytes in a response body.
pub fn full(bytes: impl Into<Bytes>) -> ResponseBody {
    Full::new(bytes.into()).boxed_unsync()
}

/// Returns an empty response body.
pub fn empty() -> ResponseBody {
    Empty::new().boxed_unsync()
}

/// Builds a JSON response with the given status.
pub fn json_response(status: StatusCode, body: impl Into<Bytes>) -> HttpResponse {
    let mut response = http::Response::new(full(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
    response
}

/// Builds the JSON error response for a status: the HTTP status from
/// [`Code::http_status`](duplex_core::Code::http_status) and the body
/// `{"code":<n>,"message":"..."}`.
pub fn status_response(status: &Status) -> HttpResponse {
    json_response(status.code().http_status(), status.to_json_bytes())
}

/// Builds a bodiless response.
pub fn empty_response(status: StatusCode) -> HttpResponse {
    let mut response = http::Response::new(empty());
    *response.status_mut() = status;
    response
}
