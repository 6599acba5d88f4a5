//! Service declarations.

use std::sync::Arc;

use http::Method;

use crate::registry::ServiceRegistrar;

/// An RPC service.
///
/// A service names itself with its fully qualified name
/// (`package.Service`) and registers its methods when the server starts.
///
/// # Example
///
/// ```rust,ignore
/// struct Users;
///
/// impl Service for Users {
///     fn name(&self) -> &str {
///         "users.v1.Users"
///     }
///
///     fn register(self: Arc<Self>, registrar: &mut ServiceRegistrar<'_>) {
///         let users = Arc::clone(&self);
///         registrar.unary("Get", move |ctx, req: GetUserRequest| {
///             let users = Arc::clone(&users);
///             async move { users.get(&ctx, req).await }
///         });
///     }
/// }
/// ```
pub trait Service: Send + Sync + 'static {
    /// Fully qualified service name.
    fn name(&self) -> &str;

    /// Registers the service's methods.
    fn register(self: Arc<Self>, registrar: &mut ServiceRegistrar<'_>);

    /// Returns the gateway capability, if the service has HTTP bindings.
    fn as_endpoint(&self) -> Option<&dyn EndpointService> {
        None
    }
}

/// Capability of services reachable through the REST/JSON gateway.
pub trait EndpointService: Send + Sync {
    /// HTTP bindings of the service's methods.
    fn gateway_bindings(&self) -> Vec<GatewayBinding>;
}

/// Which part of the HTTP request carries the message body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GatewayBody {
    /// Fields come from path and query parameters only.
    #[default]
    None,
    /// The JSON request body is the message; path parameters override its fields.
    All,
}

/// Maps an HTTP method and path template onto an RPC method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayBinding {
    /// HTTP method.
    pub method: Method,
    /// Path template, e.g. `/v1/users/{id}`, relative to the gateway prefix.
    pub path: String,
    /// RPC method, either a bare method name of the declaring service or a
    /// full `/package.Service/Method` name.
    pub rpc_method: String,
    /// Body mapping.
    pub body: GatewayBody,
}

impl GatewayBinding {
    /// Creates a binding without a body.
    pub fn new(method: Method, path: impl Into<String>, rpc_method: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            rpc_method: rpc_method.into(),
            body: GatewayBody::None,
        }
    }

    /// `GET` binding.
    pub fn get(path: impl Into<String>, rpc_method: impl Into<String>) -> Self {
        Self::new(Method::GET, path, rpc_method)
    }

    /// `POST` binding with the whole body mapped.
    pub fn post(path: impl Into<String>, rpc_method: impl Into<String>) -> Self {
        Self::new(Method::POST, path, rpc_method).with_body(GatewayBody::All)
    }

    /// `PUT` binding with the whole body mapped.
    pub fn put(path: impl Into<String>, rpc_method: impl Into<String>) -> Self {
        Self::new(Method::PUT, path, rpc_method).with_body(GatewayBody::All)
    }

    /// `PATCH` binding with the whole body mapped.
    pub fn patch(path: impl Into<String>, rpc_method: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path, rpc_method).with_body(GatewayBody::All)
    }

    /// `DELETE` binding.
    pub fn delete(path: impl Into<String>, rpc_method: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path, rpc_method)
    }

    /// Sets the body mapping.
    #[must_use]
    pub fn with_body(mut self, body: GatewayBody) -> Self {
        self.body = body;
        self
    }

    /// Resolves the full RPC method name against the declaring service.
    pub fn full_method(&self, service: &str) -> String {
        if self.rpc_method.starts_with('/') {
            self.rpc_method.clone()
        } else {
            format!("/{service}/{}", self.rpc_method)
        }
    }
}
