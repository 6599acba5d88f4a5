//! REST/JSON gateway.
//!
//! Translates HTTP requests into RPC calls using the [`GatewayBinding`]s of
//! services that expose the [`EndpointService`](crate::EndpointService)
//! capability. The request message is assembled as a JSON object:
//!
//! 1. the JSON request body, for bindings with [`GatewayBody::All`];
//!    otherwise the query parameters (`a.b=1` nests, repeated keys form arrays)
//! 2. path parameters, overriding fields of the same name
//!
//! The call then runs through the same unary or stream chain as a direct RPC
//! call, with the JSON codec. Unary results answer `200` with the response
//! message; streaming results answer newline-delimited `{"result": ...}`
//! objects. Errors answer the HTTP status of their code and
//! `{"code": n, "message": "..."}`.

use std::convert::Infallible;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use duplex_core::{metadata, CallContext, Status};
use duplex_middleware::types::{json_response, status_response, HttpResponse, ResponseBody, APPLICATION_JSON};
use duplex_middleware::{Call, HttpCall, MessageStream};
use duplex_router::{Params, Route, RouteSpec, RouteTable};
use futures_util::{stream, StreamExt};
use http::header::{HeaderValue, CONTENT_TYPE, COOKIE};
use http::{HeaderMap, StatusCode};
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;
use serde_json::{Map, Value};

use crate::codec::Codec;
use crate::registry::MethodKind;
use crate::server::RpcServer;
use crate::service::{GatewayBinding, GatewayBody};

#[derive(Debug, Clone)]
struct Target {
    rpc_method: String,
    kind: MethodKind,
    body: GatewayBody,
}

/// The REST/JSON gateway in front of an [`RpcServer`].
#[derive(Debug)]
pub struct Gateway {
    server: Arc<RpcServer>,
    prefix: String,
    routes: RouteTable<Target>,
}

impl Gateway {
    /// Builds the gateway from the bindings of every registered service.
    ///
    /// Binding paths are mounted under `prefix`. Bindings naming a method
    /// that is not registered are skipped with a warning.
    pub fn new(server: Arc<RpcServer>, prefix: &str) -> Self {
        let prefix = normalize_prefix(prefix);
        let mut routes = Vec::new();
        for service in server.registry().services() {
            let Some(endpoint) = service.as_endpoint() else {
                continue;
            };
            for binding in endpoint.gateway_bindings() {
                match target(&server, service.name(), &binding) {
                    Some(target) => {
                        let spec = RouteSpec::new(&join(&prefix, &binding.path)).methods([binding.method.clone()]);
                        routes.push(Route::new(spec, target));
                    }
                    None => tracing::warn!(
                        http.method = %binding.method,
                        http.path = %binding.path,
                        rpc.method = %binding.rpc_method,
                        "gateway binding targets an unknown method"
                    ),
                }
            }
        }
        Self {
            server,
            prefix,
            routes: RouteTable::new(routes, true),
        }
    }

    /// Returns the mount prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the number of bound routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if no bindings were mounted.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Serves one HTTP request.
    pub async fn handle(&self, call: HttpCall) -> HttpResponse {
        let HttpCall { ctx, request } = call;
        let (parts, body) = request.into_parts();
        let path = parts.uri.path();

        let Some(found) = self.routes.find(&parts.method, path, parts.uri.query(), &parts.headers) else {
            let known_path = self
                .routes
                .routes()
                .iter()
                .any(|route| route.spec().template().match_exact(path).is_some());
            return if known_path {
                json_response(
                    StatusCode::METHOD_NOT_ALLOWED,
                    Status::unimplemented("Method Not Allowed").to_json_bytes(),
                )
            } else {
                json_response(StatusCode::NOT_FOUND, Status::not_found("Not Found").to_json_bytes())
            };
        };
        let target = found.route.handler();

        let message = match build_message(target.body, &found.params, parts.uri.query(), &body) {
            Ok(message) => message,
            Err(status) => return status_response(&status),
        };
        let payload = match serde_json::to_vec(&message) {
            Ok(payload) => payload,
            Err(e) => return status_response(&Status::internal(e.to_string())),
        };

        let mut rpc_ctx = CallContext::new(target.rpc_method.as_str())
            .with_metadata(forwarded_metadata(ctx.metadata()))
            .with_peer(ctx.peer());
        if let Some(id) = ctx.correlation_id() {
            rpc_ctx.set_correlation_id(id.clone());
        }
        let call = Call::new(rpc_ctx, payload);

        match target.kind {
            MethodKind::Unary => match self.server.unary(Codec::Json, call).await {
                Ok(message) => json_response(StatusCode::OK, message),
                Err(status) => status_response(&status),
            },
            MethodKind::ServerStreaming => match self.server.server_stream(Codec::Json, call).await {
                Ok(messages) => {
                    let mut response = http::Response::new(ndjson(messages));
                    response
                        .headers_mut()
                        .insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
                    response
                }
                Err(status) => status_response(&status),
            },
        }
    }
}

fn target(server: &RpcServer, service: &str, binding: &GatewayBinding) -> Option<Target> {
    let rpc_method = binding.full_method(service);
    let kind = server.registry().kind(&rpc_method)?;
    Some(Target {
        rpc_method,
        kind,
        body: binding.body,
    })
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn join(prefix: &str, path: &str) -> String {
    let path = path.trim_start_matches('/');
    if prefix == "/" {
        format!("/{path}")
    } else {
        format!("{prefix}/{path}")
    }
}

/// Copies the headers the gateway forwards into RPC metadata.
fn forwarded_metadata(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = HeaderMap::new();
    for key in metadata::FORWARDED_HEADERS {
        for value in headers.get_all(*key) {
            forwarded.append(*key, value.clone());
        }
    }
    for value in headers.get_all(COOKIE) {
        forwarded.append(metadata::GATEWAY_COOKIE, value.clone());
    }
    forwarded
}

fn build_message(body: GatewayBody, params: &Params, query: Option<&str>, payload: &Bytes) -> Result<Value, Status> {
    let mut message = match body {
        GatewayBody::All if payload.iter().all(u8::is_ascii_whitespace) => Map::new(),
        GatewayBody::All => match serde_json::from_slice::<Value>(payload) {
            Ok(Value::Object(fields)) => fields,
            Ok(_) => return Err(Status::invalid_argument("request body must be a JSON object")),
            Err(e) => return Err(Status::invalid_argument(format!("invalid JSON body: {e}"))),
        },
        GatewayBody::None => {
            let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query.unwrap_or_default())
                .map_err(|e| Status::invalid_argument(format!("invalid query string: {e}")))?;
            let mut fields = Map::new();
            for (key, value) in pairs {
                insert_field(&mut fields, &key, Value::String(value), true);
            }
            fields
        }
    };
    for (name, value) in params.iter() {
        insert_field(&mut message, name, Value::String(value.to_string()), false);
    }
    Ok(Value::Object(message))
}

/// Sets a dotted field path. With `append`, a repeated leaf becomes an array.
fn insert_field(fields: &mut Map<String, Value>, path: &str, value: Value, append: bool) {
    match path.split_once('.') {
        Some((head, rest)) => {
            let entry = fields
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(nested) = entry {
                insert_field(nested, rest, value, append);
            }
        }
        None => match fields.get_mut(path) {
            Some(Value::Array(items)) if append => items.push(value),
            Some(existing) if append => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            _ => {
                fields.insert(path.to_string(), value);
            }
        },
    }
}

/// One `{"result": ...}` line per message; an error becomes a final
/// `{"error": {...}}` line.
fn ndjson(messages: MessageStream) -> ResponseBody {
    let lines = stream::unfold(Some(messages), |state| async move {
        let mut messages = state?;
        let (line, next) = match messages.next().await? {
            Ok(message) => (wrap(b"{\"result\":", &message), Some(messages)),
            Err(status) => (wrap(b"{\"error\":", &status.to_json_bytes()), None),
        };
        Some((Ok::<_, Infallible>(Frame::data(line)), next))
    });
    StreamBody::new(lines).boxed_unsync()
}

fn wrap(open: &[u8], inner: &[u8]) -> Bytes {
    let mut line = BytesMut::with_capacity(open.len() + inner.len() + 2);
    line.extend_from_slice(open);
    line.extend_from_slice(inner);
    line.extend_from_slice(b"}\n");
    line.freeze()
}
