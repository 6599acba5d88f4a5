//! The server and its builder.
//!
//! A [`Server`] owns everything needed to start: configuration, RPC services,
//! HTTP routes, interceptors and the health subsystem. Nothing touches the
//! network until [`Server::bind`].
//!
//! # Example
//!
//! ```rust,no_run
//! use duplex_health::checker_fn;
//! use duplex_server::{HttpRoute, Server, ServerConfig};
//! use duplex_middleware::types::json_response;
//! use http::StatusCode;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::builder()
//!         .config(ServerConfig::builder().address("0.0.0.0:8088").build()?)
//!         .route(HttpRoute::new("/hello", |_| async {
//!             json_response(StatusCode::OK, r#"{"hello":"world"}"#)
//!         }))
//!         .checker("db", checker_fn(|_ctx| async { Ok(()) }))
//!         .build()?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use duplex_config::DuplexConfig;
use duplex_health::{Checker, HealthServer, HealthServerBuilder, HealthService};
use duplex_middleware::auth::{AllowListed, SharedSecretAuthenticator};
use duplex_middleware::stages::{CorsInterceptor, RecoveryInterceptor};
use duplex_middleware::{Authenticator, Http, HttpCall, HttpResponse, Interceptor, ServerStream, Unary};
use duplex_rpc::{RpcRegistry, Service};
use tokio::net::TcpListener;
use tracing::Span;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::lifecycle::BoundServer;
use crate::route::{handler_fn, HttpHandler, HttpRoute};
use crate::shutdown::ShutdownSignal;
use crate::static_files::StaticFiles;

/// A configured server, ready to bind.
pub struct Server {
    pub(crate) config: ServerConfig,
    pub(crate) registry: RpcRegistry,
    pub(crate) has_user_services: bool,
    pub(crate) routes: Vec<HttpRoute>,
    pub(crate) not_found: Option<HttpHandler>,
    pub(crate) unary_interceptors: Vec<Arc<dyn Interceptor<Unary>>>,
    pub(crate) stream_interceptors: Vec<Arc<dyn Interceptor<ServerStream>>>,
    pub(crate) http_interceptors: Vec<Arc<dyn Interceptor<Http>>>,
    pub(crate) authenticator: Option<Arc<dyn Authenticator>>,
    pub(crate) cors: Option<CorsInterceptor>,
    pub(crate) recovery: Option<RecoveryInterceptor>,
    pub(crate) listener: Option<TcpListener>,
    pub(crate) health: HealthServer,
    pub(crate) span: Span,
    pub(crate) shutdown: ShutdownSignal,
    pub(crate) handle_os_signals: bool,
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("routes", &self.routes.len())
            .field("not_found", &self.not_found.is_some())
            .field("auth", &self.authenticator.is_some())
            .field("cors", &self.cors.is_some())
            .field("recovery", &self.recovery)
            .field("listener", &self.listener)
            .field("health", &self.health)
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns a handle on the health subsystem.
    pub fn health(&self) -> HealthServer {
        self.health.clone()
    }

    /// Returns the signal that stops the server when triggered.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Binds the listener and loads TLS material.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address is unavailable and
    /// [`ServerError::Tls`] if the certificate or key cannot be loaded.
    pub async fn bind(self) -> Result<BoundServer, ServerError> {
        BoundServer::bind(self).await
    }

    /// Binds and serves until shutdown.
    ///
    /// Returns `Ok(())` after a shutdown requested through the signal, the
    /// hook route or the OS.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails, the health subsystem cannot start,
    /// or the listener fails while serving.
    pub async fn run(self) -> Result<(), ServerError> {
        self.bind().await?.run().await
    }
}

/// Builder for [`Server`].
pub struct ServerBuilder {
    config: Option<ServerConfig>,
    registry: RpcRegistry,
    routes: Vec<HttpRoute>,
    not_found: Option<HttpHandler>,
    unary_interceptors: Vec<Arc<dyn Interceptor<Unary>>>,
    stream_interceptors: Vec<Arc<dyn Interceptor<ServerStream>>>,
    http_interceptors: Vec<Arc<dyn Interceptor<Http>>>,
    authenticator: Option<Arc<dyn Authenticator>>,
    cors: Option<CorsInterceptor>,
    recovery: Option<RecoveryInterceptor>,
    listener: Option<TcpListener>,
    health: HealthServerBuilder,
    checkers: usize,
    health_server: Option<HealthServer>,
    span: Option<Span>,
    shutdown: Option<ShutdownSignal>,
    handle_os_signals: bool,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("routes", &self.routes)
            .field("listener", &self.listener)
            .field("checkers", &self.checkers)
            .finish_non_exhaustive()
    }
}

impl ServerBuilder {
    /// Creates a builder with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: None,
            registry: RpcRegistry::new(),
            routes: Vec::new(),
            not_found: None,
            unary_interceptors: Vec::new(),
            stream_interceptors: Vec::new(),
            http_interceptors: Vec::new(),
            authenticator: None,
            cors: None,
            recovery: None,
            listener: None,
            health: HealthServer::builder(),
            checkers: 0,
            health_server: None,
            span: None,
            shutdown: None,
            handle_os_signals: true,
        }
    }

    /// Creates a builder from loaded settings: the server configuration plus
    /// a shared-secret authenticator when one is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] if the settings are invalid.
    pub fn from_settings(settings: &DuplexConfig) -> Result<Self, ServerError> {
        let mut builder = Self::new().config(ServerConfig::from_settings(settings)?);
        if let Some(secret) = &settings.auth.shared_secret {
            builder = builder.authenticator(Arc::new(AllowListed::new(
                SharedSecretAuthenticator::new(secret.as_str()),
                settings.auth.allow_list.iter().cloned(),
            )));
        }
        Ok(builder)
    }

    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Registers an RPC service.
    #[must_use]
    pub fn service(mut self, service: impl Service) -> Self {
        self.registry.add_service(service);
        self
    }

    /// Registers a shared RPC service.
    #[must_use]
    pub fn shared_service(mut self, service: Arc<dyn Service>) -> Self {
        self.registry.add_shared(service);
        self
    }

    /// Adds a plain HTTP route.
    #[must_use]
    pub fn route(mut self, route: HttpRoute) -> Self {
        self.routes.push(route);
        self
    }

    /// Serves a directory under `prefix`, falling back to `index` for paths
    /// that name no file so client-side routing keeps working.
    ///
    /// The prefix must not overlap the gateway's API prefix.
    #[must_use]
    pub fn web(self, prefix: &str, dir: impl Into<PathBuf>, index: &str) -> Self {
        let prefix = if prefix.is_empty() { "/" } else { prefix };
        self.route(StaticFiles::new(dir).index(index).fallback_to_index(true).route(prefix))
    }

    /// Answers requests no route matches. The handler runs behind the user
    /// route chain. Without one, unmatched requests get a JSON `404`.
    #[must_use]
    pub fn not_found<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(HttpCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HttpResponse> + Send + 'static,
    {
        self.not_found = Some(handler_fn(handler));
        self
    }

    /// Appends an interceptor for unary RPC calls.
    #[must_use]
    pub fn unary_interceptor(mut self, interceptor: impl Interceptor<Unary>) -> Self {
        self.unary_interceptors.push(Arc::new(interceptor));
        self
    }

    /// Appends an interceptor for server-streaming RPC calls.
    #[must_use]
    pub fn stream_interceptor(mut self, interceptor: impl Interceptor<ServerStream>) -> Self {
        self.stream_interceptors.push(Arc::new(interceptor));
        self
    }

    /// Appends an interceptor for plain HTTP routes.
    #[must_use]
    pub fn http_interceptor(mut self, interceptor: impl Interceptor<Http>) -> Self {
        self.http_interceptors.push(Arc::new(interceptor));
        self
    }

    /// Authenticates RPC calls and user HTTP routes.
    #[must_use]
    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Applies CORS to every plain HTTP request, including preflights for
    /// unknown paths.
    #[must_use]
    pub fn cors(mut self, cors: CorsInterceptor) -> Self {
        self.cors = Some(cors);
        self
    }

    /// Recovers panics with `recovery` in every chain, replacing the default
    /// handler. Installed even when the configuration disables recovery.
    #[must_use]
    pub fn recovery(mut self, recovery: RecoveryInterceptor) -> Self {
        self.recovery = Some(recovery);
        self
    }

    /// Serves on an already bound listener. The configured address is then
    /// ignored.
    #[must_use]
    pub fn listener(mut self, listener: TcpListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Adds a health checker.
    #[must_use]
    pub fn checker(mut self, service: impl Into<String>, checker: impl Checker) -> Self {
        self.health = self.health.checker(service, checker);
        self.checkers += 1;
        self
    }

    /// Uses a prebuilt health server instead of building one from the
    /// registered checkers.
    #[must_use]
    pub fn health_server(mut self, health: HealthServer) -> Self {
        self.health_server = Some(health);
        self
    }

    /// Sets the span every server task runs in.
    #[must_use]
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Uses `signal` to stop the server.
    #[must_use]
    pub fn shutdown_signal(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown = Some(signal);
        self
    }

    /// Enables or disables shutdown on SIGINT/SIGTERM. Enabled by default.
    #[must_use]
    pub fn handle_os_signals(mut self, enabled: bool) -> Self {
        self.handle_os_signals = enabled;
        self
    }

    /// Builds the server and registers the health RPC service.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] if the default configuration is
    /// invalid, or if checkers were added alongside a prebuilt health server.
    pub fn build(self) -> Result<Server, ServerError> {
        let config = match self.config {
            Some(config) => config,
            None => ServerConfig::builder().build()?,
        };
        let span = self
            .span
            .unwrap_or_else(|| tracing::info_span!("server", name = %config.name()));

        let health = match self.health_server {
            Some(_) if self.checkers > 0 => {
                return Err(ServerError::config(
                    "checkers cannot be added when a prebuilt health server is used",
                ));
            }
            Some(health) => health,
            None => self.health.config(config.health()).with_span(span.clone()).build(),
        };

        let mut registry = self.registry;
        let has_user_services = !registry.is_empty();
        registry.add_service(HealthService::new(health.clone()));

        Ok(Server {
            config,
            registry,
            has_user_services,
            routes: self.routes,
            not_found: self.not_found,
            unary_interceptors: self.unary_interceptors,
            stream_interceptors: self.stream_interceptors,
            http_interceptors: self.http_interceptors,
            authenticator: self.authenticator,
            cors: self.cors,
            recovery: self.recovery,
            listener: self.listener,
            health,
            span,
            shutdown: self.shutdown.unwrap_or_default(),
            handle_os_signals: self.handle_os_signals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duplex_config::{AuthSettings, ConfigLoader};
    use duplex_health::checker_fn;
    use duplex_rpc::ServiceRegistrar;

    struct Echo;

    impl Service for Echo {
        fn name(&self) -> &str {
            "test.Echo"
        }

        fn register(self: Arc<Self>, registrar: &mut ServiceRegistrar<'_>) {
            registrar.unary("Say", |_ctx, req: String| async move { Ok(req) });
        }
    }

    #[test]
    fn health_service_is_always_registered() {
        let server = Server::builder().build().unwrap();
        assert!(!server.has_user_services);
        assert!(server.registry.contains("/grpc.health.v1.Health/Check"));
        assert!(server.registry.contains("/grpc.health.v1.Health/Watch"));
    }

    #[test]
    fn user_services_are_tracked() {
        let server = Server::builder().service(Echo).build().unwrap();
        assert!(server.has_user_services);
        assert!(server.registry.contains("/test.Echo/Say"));
    }

    #[test]
    fn checkers_conflict_with_prebuilt_health() {
        let err = Server::builder()
            .checker("db", checker_fn(|_ctx| async { Ok(()) }))
            .health_server(HealthServer::default())
            .build()
            .unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
    }

    #[test]
    fn health_timing_follows_config() {
        let config = ServerConfig::builder()
            .health(duplex_health::HealthConfig {
                interval: std::time::Duration::from_secs(5),
                timeout: std::time::Duration::from_millis(200),
            })
            .build()
            .unwrap();
        let server = Server::builder()
            .config(config)
            .checker("db", checker_fn(|_ctx| async { Ok(()) }))
            .build()
            .unwrap();
        assert_eq!(server.health().config().interval, std::time::Duration::from_secs(5));
        assert_eq!(server.health().services().collect::<Vec<_>>(), ["db"]);
    }

    #[test]
    fn settings_install_authenticator() {
        let settings = DuplexConfig::builder()
            .auth(AuthSettings {
                shared_secret: Some("s3cret".to_string()),
                allow_list: vec!["/internal/health".to_string()],
            })
            .build();
        let server = ServerBuilder::from_settings(&settings).unwrap().build().unwrap();
        let auth = server.authenticator.as_ref().unwrap();
        assert!(auth.allow_list().unwrap().is_allow_listed("/internal/health"));

        let defaults = ConfigLoader::new().load().unwrap();
        let server = ServerBuilder::from_settings(&defaults).unwrap().build().unwrap();
        assert!(server.authenticator.is_none());
    }
}
