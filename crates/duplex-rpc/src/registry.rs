//! Method registry.
//!
//! Handlers are registered with their concrete request and response types
//! and stored type-erased: each erased handler decodes the request with the
//! codec of the call, runs the typed handler and encodes its response.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use duplex_core::{BoxFuture, CallContext, Status};
use duplex_middleware::{Call, MessageStream};
use futures_util::{Stream, StreamExt};

use crate::codec::{Codec, RpcMessage};
use crate::service::Service;

/// Type-erased unary handler.
pub type UnaryHandler = Arc<dyn Fn(Codec, Call) -> BoxFuture<'static, Result<Bytes, Status>> + Send + Sync>;

/// Type-erased server-streaming handler.
pub type StreamHandler = Arc<dyn Fn(Codec, Call) -> BoxFuture<'static, Result<MessageStream, Status>> + Send + Sync>;

/// Shape of a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// One request, one response.
    Unary,
    /// One request, a stream of responses.
    ServerStreaming,
}

/// A registered method handler.
#[derive(Clone)]
pub enum MethodHandler {
    /// Unary handler.
    Unary(UnaryHandler),
    /// Server-streaming handler.
    ServerStreaming(StreamHandler),
}

impl MethodHandler {
    /// Returns the method shape.
    pub fn kind(&self) -> MethodKind {
        match self {
            Self::Unary(_) => MethodKind::Unary,
            Self::ServerStreaming(_) => MethodKind::ServerStreaming,
        }
    }
}

impl std::fmt::Debug for MethodHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("MethodHandler").field(&self.kind()).finish()
    }
}

/// Registry of RPC methods keyed by full method name (`/package.Service/Method`).
#[derive(Default)]
pub struct RpcRegistry {
    methods: HashMap<String, MethodHandler>,
    services: Vec<Arc<dyn Service>>,
}

impl std::fmt::Debug for RpcRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut methods: Vec<_> = self.methods.keys().collect();
        methods.sort();
        f.debug_struct("RpcRegistry")
            .field("methods", &methods)
            .field("services", &self.services.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl RpcRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a service and registers its methods.
    pub fn add_service<S: Service>(&mut self, service: S) -> &mut Self {
        self.add_shared(Arc::new(service))
    }

    /// Adds a shared service and registers its methods.
    pub fn add_shared(&mut self, service: Arc<dyn Service>) -> &mut Self {
        let name = service.name().to_string();
        self.services.push(Arc::clone(&service));
        let mut registrar = ServiceRegistrar {
            registry: self,
            service: name,
        };
        service.register(&mut registrar);
        self
    }

    /// Registers a unary method under its full name.
    pub fn unary<Req, Resp, F, Fut>(&mut self, method: impl Into<String>, handler: F) -> &mut Self
    where
        Req: RpcMessage,
        Resp: RpcMessage,
        F: Fn(CallContext, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, Status>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let erased: UnaryHandler = Arc::new(move |codec: Codec, call: Call| {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let request: Req = codec.decode(&call.payload)?;
                let response = handler(call.ctx, request).await?;
                codec.encode(&response)
            })
        });
        self.insert(method.into(), MethodHandler::Unary(erased))
    }

    /// Registers a server-streaming method under its full name.
    pub fn server_streaming<Req, Resp, F, Fut, S>(&mut self, method: impl Into<String>, handler: F) -> &mut Self
    where
        Req: RpcMessage,
        Resp: RpcMessage,
        F: Fn(CallContext, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<S, Status>> + Send + 'static,
        S: Stream<Item = Result<Resp, Status>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let erased: StreamHandler = Arc::new(move |codec: Codec, call: Call| {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let request: Req = codec.decode(&call.payload)?;
                let responses = handler(call.ctx, request).await?;
                let encoded: MessageStream = responses
                    .map(move |item| item.and_then(|message| codec.encode(&message)))
                    .boxed();
                Ok(encoded)
            })
        });
        self.insert(method.into(), MethodHandler::ServerStreaming(erased))
    }

    fn insert(&mut self, method: String, handler: MethodHandler) -> &mut Self {
        if self.methods.contains_key(&method) {
            tracing::warn!(rpc.method = %method, "replacing previously registered method");
        }
        tracing::debug!(rpc.method = %method, kind = ?handler.kind(), "method registered");
        self.methods.insert(method, handler);
        self
    }

    /// Looks up a method by full name.
    pub fn get(&self, method: &str) -> Option<&MethodHandler> {
        self.methods.get(method)
    }

    /// Returns `true` if the method is registered.
    pub fn contains(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    /// Returns the shape of a registered method.
    pub fn kind(&self, method: &str) -> Option<MethodKind> {
        self.methods.get(method).map(MethodHandler::kind)
    }

    /// Returns the registered method names, sorted.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of registered methods.
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Returns `true` if no methods are registered.
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Returns the registered services in registration order.
    pub fn services(&self) -> &[Arc<dyn Service>] {
        &self.services
    }
}

/// Registers the methods of one service, prefixing names with
/// `/{service}/`.
pub struct ServiceRegistrar<'r> {
    registry: &'r mut RpcRegistry,
    service: String,
}

impl ServiceRegistrar<'_> {
    /// The service being registered.
    pub fn service(&self) -> &str {
        &self.service
    }

    fn full_name(&self, method: &str) -> String {
        format!("/{}/{method}", self.service)
    }

    /// Registers a unary method.
    pub fn unary<Req, Resp, F, Fut>(&mut self, method: &str, handler: F) -> &mut Self
    where
        Req: RpcMessage,
        Resp: RpcMessage,
        F: Fn(CallContext, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, Status>> + Send + 'static,
    {
        let name = self.full_name(method);
        self.registry.unary(name, handler);
        self
    }

    /// Registers a server-streaming method.
    pub fn server_streaming<Req, Resp, F, Fut, S>(&mut self, method: &str, handler: F) -> &mut Self
    where
        Req: RpcMessage,
        Resp: RpcMessage,
        F: Fn(CallContext, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<S, Status>> + Send + 'static,
        S: Stream<Item = Result<Resp, Status>> + Send + 'static,
    {
        let name = self.full_name(method);
        self.registry.server_streaming(name, handler);
        self
    }
}
