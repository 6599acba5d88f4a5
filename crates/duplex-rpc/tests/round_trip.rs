//! Direct RPC calls and their gateway equivalents answer the same message.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use duplex_core::{CallContext, Status};
use duplex_middleware::auth::SharedSecretAuthenticator;
use duplex_middleware::{ChainBuilder, HttpCall};
use duplex_rpc::frame::{decode_messages, encode_frame, DEFAULT_MAX_MESSAGE_LEN, GRPC_STATUS};
use duplex_rpc::{Codec, EndpointService, Gateway, GatewayBinding, RpcRegistry, RpcServer, Service, ServiceRegistrar};
use futures_util::stream;
use http::header::CONTENT_TYPE;
use http::{Request, StatusCode};
use http_body_util::BodyExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
struct User {
    #[prost(int64, tag = "1")]
    #[serde(default)]
    id: i64,
    #[prost(string, tag = "2")]
    #[serde(default)]
    name: String,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
struct GetUserRequest {
    #[prost(int64, tag = "1")]
    #[serde(default)]
    id: i64,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
struct ListUsersRequest {
    #[prost(int64, tag = "1")]
    #[serde(default)]
    limit: i64,
}

#[derive(Default)]
struct Users {
    store: Mutex<BTreeMap<i64, String>>,
}

impl Users {
    fn get(&self, id: i64) -> Result<User, Status> {
        self.store
            .lock()
            .get(&id)
            .map(|name| User { id, name: name.clone() })
            .ok_or_else(|| Status::not_found(format!("user {id} not found")))
    }

    fn create(&self, user: User) -> User {
        self.store.lock().insert(user.id, user.name.clone());
        user
    }

    fn list(&self, limit: i64) -> Vec<Result<User, Status>> {
        let limit = usize::try_from(limit).unwrap_or(0);
        self.store
            .lock()
            .iter()
            .take(limit)
            .map(|(id, name)| Ok(User { id: *id, name: name.clone() }))
            .collect()
    }
}

impl Service for Users {
    fn name(&self) -> &str {
        "users.v1.Users"
    }

    fn register(self: Arc<Self>, registrar: &mut ServiceRegistrar<'_>) {
        let get = Arc::clone(&self);
        let create = Arc::clone(&self);
        let list = self;
        registrar
            .unary("Get", move |_ctx: CallContext, req: GetUserRequest| {
                let users = Arc::clone(&get);
                async move { users.get(req.id) }
            })
            .unary("Create", move |_ctx: CallContext, user: User| {
                let users = Arc::clone(&create);
                async move { Ok(users.create(user)) }
            })
            .server_streaming("List", move |_ctx: CallContext, req: ListUsersRequest| {
                let users = Arc::clone(&list);
                async move { Ok(stream::iter(users.list(req.limit))) }
            });
    }

    fn as_endpoint(&self) -> Option<&dyn EndpointService> {
        Some(self)
    }
}

impl EndpointService for Users {
    fn gateway_bindings(&self) -> Vec<GatewayBinding> {
        vec![
            GatewayBinding::get("/v1/users/{id}", "Get"),
            GatewayBinding::post("/v1/users", "Create"),
            GatewayBinding::get("/v1/users", "List"),
        ]
    }
}

fn server() -> Arc<RpcServer> {
    let mut registry = RpcRegistry::new();
    registry.add_service(Users::default());
    let chain = ChainBuilder::new()
        .authenticator(Arc::new(SharedSecretAuthenticator::new("s3cret")))
        .build();
    Arc::new(RpcServer::new(registry).with_unary_chain(chain))
}

async fn rpc<M, R>(server: &RpcServer, method: &str, message: &M) -> (Option<R>, String)
where
    M: duplex_rpc::RpcMessage,
    R: duplex_rpc::RpcMessage,
{
    let request = Request::post(method)
        .header(CONTENT_TYPE, "application/grpc")
        .header("authorization", "Bearer s3cret")
        .body(encode_frame(&Codec::Proto.encode(message).unwrap()))
        .unwrap();
    let collected = server.handle(request, None).await.into_body().collect().await.unwrap();
    let status = collected.trailers().unwrap()[GRPC_STATUS].to_str().unwrap().to_string();
    let messages = decode_messages(collected.to_bytes(), DEFAULT_MAX_MESSAGE_LEN).unwrap();
    (messages.first().map(|m| Codec::Proto.decode(m).unwrap()), status)
}

async fn rest(gateway: &Gateway, method: &str, uri: &str, body: &str, auth: bool) -> (StatusCode, Bytes) {
    let mut builder = Request::builder().method(method).uri(uri);
    if auth {
        builder = builder.header("authorization", "Bearer s3cret");
    }
    let request = builder.body(Bytes::from(body.to_string())).unwrap();
    let response = gateway.handle(HttpCall::new(request)).await;
    let status = response.status();
    (status, response.into_body().collect().await.unwrap().to_bytes())
}

#[tokio::test]
async fn rpc_and_gateway_agree() {
    let server = server();
    let gateway = Gateway::new(Arc::clone(&server), "/api");
    assert_eq!(gateway.len(), 3);

    let (status, body) = rest(&gateway, "POST", "/api/v1/users", r#"{"id":"7","name":"ada"}"#, true).await;
    assert_eq!(status, StatusCode::OK);
    let created: User = serde_json::from_slice(&body).unwrap();
    assert_eq!(created.name, "ada");

    let (direct, code) = rpc::<_, User>(&server, "/users.v1.Users/Get", &GetUserRequest { id: 7 }).await;
    assert_eq!(code, "0");

    let (status, body) = rest(&gateway, "GET", "/api/v1/users/7", "", true).await;
    assert_eq!(status, StatusCode::OK);
    let via_gateway: User = serde_json::from_slice(&body).unwrap();
    assert_eq!(direct, Some(via_gateway));
}

#[tokio::test]
async fn errors_map_to_http_status() {
    let server = server();
    let gateway = Gateway::new(Arc::clone(&server), "/");

    let (status, body) = rest(&gateway, "GET", "/v1/users/404", "", true).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, Bytes::from(r#"{"code":5,"message":"user 404 not found"}"#));

    let (status, _) = rest(&gateway, "GET", "/v1/users/1", "", false).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (direct, code) = rpc::<_, User>(&server, "/users.v1.Users/Get", &GetUserRequest { id: 404 }).await;
    assert!(direct.is_none());
    assert_eq!(code, "5");
}

#[tokio::test]
async fn unmatched_gateway_paths() {
    let gateway = Gateway::new(server(), "/");

    let (status, body) = rest(&gateway, "GET", "/v2/nothing", "", true).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, Bytes::from(r#"{"code":5,"message":"Not Found"}"#));

    let (status, body) = rest(&gateway, "DELETE", "/v1/users/1", "", true).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body, Bytes::from(r#"{"code":12,"message":"Method Not Allowed"}"#));
}

#[tokio::test]
async fn streaming_binding_answers_ndjson() {
    let gateway = Gateway::new(server(), "/");
    for (id, name) in [(1, "ada"), (2, "grace"), (3, "linus")] {
        let body = format!(r#"{{"id":{id},"name":"{name}"}}"#);
        let (status, _) = rest(&gateway, "POST", "/v1/users", &body, true).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = rest(&gateway, "GET", "/v1/users?limit=2", "", true).await;
    assert_eq!(status, StatusCode::OK);
    let lines: Vec<serde_json::Value> = body
        .split(|b| *b == b'\n')
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_slice(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1]["result"]["name"], "grace");
}
