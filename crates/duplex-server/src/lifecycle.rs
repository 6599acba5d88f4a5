//! Server startup and shutdown.
//!
//! # Startup
//!
//! 1. Bind the listener (and load TLS material)
//! 2. Build the interceptor chains
//! 3. Mount the health route, user routes and the optional metrics and
//!    shutdown-hook routes
//! 4. Mount the gateway route, if user RPC services were registered
//! 5. Start accepting connections
//! 6. Start the health subsystem
//! 7. Block until shutdown is requested or serving fails
//!
//! # Shutdown
//!
//! Triggered by the [`ShutdownSignal`], the hook route, SIGINT/SIGTERM or a
//! listener failure:
//!
//! 1. Stop health checks and close the health subsystem, so watchers and
//!    load balancers see `NOT_SERVING` first
//! 2. Stop accepting and drain open connections, bounded by the shutdown
//!    timeout

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use duplex_health::ServingStatus;
use duplex_middleware::stages::{HttpAuthInterceptor, LoggingInterceptor, MetricsInterceptor, RecoveryInterceptor};
use duplex_middleware::{Chain, ChainBuilder, Http, Interceptor, ServerStream, Unary};
use duplex_router::{RouteSpec, RouteTable};
use duplex_rpc::{Gateway, RpcServer};
use duplex_telemetry::MetricsConfig;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::builtin::{health_route, metrics_route, shutdown_hook_route};
use crate::conn::Connections;
use crate::dispatch::Dispatcher;
use crate::error::ServerError;
use crate::route::{handler_fn, HttpRoute, RouteEntry};
use crate::server::Server;
use crate::shutdown::{wait_for_os_signal, ConnectionTracker, ShutdownSignal};

/// A server whose listener is bound.
pub struct BoundServer {
    server: Server,
    listener: TcpListener,
    local_addr: SocketAddr,
    tls: Option<TlsAcceptor>,
}

impl std::fmt::Debug for BoundServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundServer")
            .field("local_addr", &self.local_addr)
            .field("tls", &self.tls.is_some())
            .field("server", &self.server)
            .finish()
    }
}

/// Interceptor chains, one per request kind and HTTP audience.
struct Chains {
    unary: Chain<Unary>,
    stream: Chain<ServerStream>,
    /// Built-in routes and the gateway. No HTTP authentication: gateway
    /// calls are authenticated by the unary chain.
    public: Chain<Http>,
    /// User routes.
    user: Chain<Http>,
    /// Wraps routing itself.
    edge: Chain<Http>,
}

impl BoundServer {
    pub(crate) async fn bind(mut server: Server) -> Result<Self, ServerError> {
        let addr = server.config.address();
        let listener = match server.listener.take() {
            Some(listener) => listener,
            None => TcpListener::bind(addr)
                .await
                .map_err(|source| ServerError::Bind { addr, source })?,
        };
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;
        let tls = server.config.tls().map(|files| files.acceptor()).transpose()?;
        Ok(Self {
            server,
            listener,
            local_addr,
            tls,
        })
    }

    /// Returns the bound address; useful when binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the signal that stops the server when triggered.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.server.shutdown.clone()
    }

    /// Serves until shutdown, then drains.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Health`] if the health subsystem cannot start
    /// and [`ServerError::Serve`] if the listener fails.
    pub async fn run(self) -> Result<(), ServerError> {
        let span = self.server.span.clone();
        self.serve().instrument(span).await
    }

    async fn serve(self) -> Result<(), ServerError> {
        let Self {
            server,
            listener,
            local_addr,
            tls,
        } = self;
        let config = server.config.clone();
        let health = server.health.clone();
        let shutdown = server.shutdown.clone();
        let handle_os_signals = server.handle_os_signals;

        if config.metrics() {
            if let Err(e) = duplex_telemetry::init_metrics(&MetricsConfig::default()) {
                tracing::warn!(error = %e, "metrics recorder unavailable");
            }
        }

        let dispatcher = Arc::new(build_dispatcher(server));
        let drain = CancellationToken::new();
        let tracker = ConnectionTracker::new();
        let connections = Arc::new(Connections::new(
            dispatcher,
            tls.clone(),
            tracker.clone(),
            drain.clone(),
            config.read_timeout(),
        ));
        let mut accept: JoinHandle<io::Result<()>> =
            tokio::spawn(connections.accept_loop(listener).in_current_span());

        if let Err(e) = health.init(ServingStatus::Serving).await {
            tracing::error!(error = %e, "failed to start health checks");
            drain.cancel();
            let _ = accept.await;
            return Err(e.into());
        }

        announce(local_addr, tls.is_some());

        let os_signal = async {
            if handle_os_signals {
                wait_for_os_signal().await;
            } else {
                std::future::pending::<()>().await;
            }
        };
        let mut accept_done = false;
        let outcome = tokio::select! {
            () = shutdown.recv() => {
                tracing::info!("shutdown requested");
                Ok(())
            }
            () = os_signal => {
                tracing::info!("termination signal received");
                Ok(())
            }
            result = &mut accept => {
                accept_done = true;
                match result {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(ServerError::Serve(e)),
                    Err(e) => Err(ServerError::Serve(io::Error::other(e))),
                }
            }
        };
        shutdown.trigger();

        health.close();
        drain.cancel();
        if !accept_done {
            let _ = accept.await;
        }

        let timeout = config.shutdown_timeout();
        tracing::info!(
            connections = tracker.active_connections(),
            timeout = ?timeout,
            "draining connections"
        );
        if tokio::time::timeout(timeout, tracker.wait_for_shutdown()).await.is_err() {
            tracing::warn!(
                connections = tracker.active_connections(),
                "shutdown timeout reached with connections still open"
            );
        }

        tracing::info!("server stopped");
        outcome
    }
}

fn announce(address: SocketAddr, tls: bool) {
    tracing::info!(address = %address, tls, "server listening");
    if !tls {
        tracing::warn!(address = %address, "serving cleartext HTTP/1.1 and h2c; configure TLS for production");
    }
}

fn build_chains(server: &Server) -> Chains {
    let config = &server.config;

    let mut unary = ChainBuilder::<Unary>::new().correlation_id(config.correlation_id());
    let mut stream = ChainBuilder::<ServerStream>::new().correlation_id(config.correlation_id());
    let mut public = ChainBuilder::<Http>::new().correlation_id(config.correlation_id());
    let mut user = ChainBuilder::<Http>::new().correlation_id(config.correlation_id());

    if let Some(auth) = &server.authenticator {
        unary = unary.authenticator(Arc::clone(auth));
        stream = stream.authenticator(Arc::clone(auth));
        user = user.auth(HttpAuthInterceptor::new(Arc::clone(auth)));
    }
    let recovery = match &server.recovery {
        Some(custom) => Some(custom.clone()),
        None => config.recovery().then(RecoveryInterceptor::new),
    };
    if let Some(recovery) = recovery {
        unary = unary.recovery(recovery.clone());
        stream = stream.recovery(recovery.clone());
        public = public.recovery(recovery.clone());
        user = user.recovery(recovery);
    }

    unary = unary.with(LoggingInterceptor::new());
    stream = stream.with(LoggingInterceptor::new());
    public = public.with(LoggingInterceptor::new());
    user = user.with(LoggingInterceptor::new());
    if config.metrics() {
        unary = unary.with(MetricsInterceptor::new());
        stream = stream.with(MetricsInterceptor::new());
        public = public.with(MetricsInterceptor::new());
        user = user.with(MetricsInterceptor::new());
    }

    for interceptor in &server.unary_interceptors {
        unary = unary.with_shared(Arc::clone(interceptor));
    }
    for interceptor in &server.stream_interceptors {
        stream = stream.with_shared(Arc::clone(interceptor));
    }
    for interceptor in &server.http_interceptors {
        public = public.with_shared(Arc::clone(interceptor));
        user = user.with_shared(Arc::clone(interceptor));
    }

    let edge = match &server.cors {
        Some(cors) => {
            let cors: Arc<dyn Interceptor<Http>> = Arc::new(cors.clone());
            Chain::new(vec![cors])
        }
        None => Chain::empty(),
    };

    Chains {
        unary: unary.build(),
        stream: stream.build(),
        public: public.build(),
        user: user.build(),
        edge,
    }
}

fn build_dispatcher(server: Server) -> Dispatcher {
    let chains = build_chains(&server);
    let Server {
        config,
        registry,
        has_user_services,
        routes: user_routes,
        not_found,
        health,
        shutdown,
        ..
    } = server;

    let rpc = Arc::new(
        RpcServer::new(registry)
            .with_unary_chain(chains.unary)
            .with_stream_chain(chains.stream)
            .with_max_message_len(config.max_message_len()),
    );

    let mut routes = vec![health_route(config.health_path(), health).into_route(&chains.public)];
    routes.extend(user_routes.into_iter().map(|route| route.into_route(&chains.user)));
    if config.metrics() {
        routes.push(metrics_route(config.metrics_path()).into_route(&chains.public));
    }
    if let Some(path) = config.shutdown_hook() {
        routes.push(shutdown_hook_route(path, shutdown).into_route(&chains.public));
    }
    if has_user_services {
        let gateway = Arc::new(Gateway::new(Arc::clone(&rpc), config.api_prefix()));
        tracing::debug!(prefix = gateway.prefix(), bindings = gateway.len(), "mounted gateway");
        let handler = handler_fn(move |call| {
            let gateway = Arc::clone(&gateway);
            async move { gateway.handle(call).await }
        });
        let spec = RouteSpec::new(config.api_prefix()).prefix();
        routes.push(HttpRoute::from_handler(spec, handler).into_route(&chains.public));
    }

    let mut table = RouteTable::new(routes, config.routes_prioritization());
    if let Some(handler) = not_found {
        table = table.with_not_found(RouteEntry {
            handler,
            chain: chains.user.clone(),
        });
    }

    Dispatcher::new(
        rpc,
        table,
        chains.edge,
        config.read_timeout(),
        config.write_timeout(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use duplex_middleware::auth::SharedSecretAuthenticator;

    #[test]
    fn chain_order() {
        let server = Server::builder()
            .authenticator(Arc::new(SharedSecretAuthenticator::new("s3cret")))
            .build()
            .unwrap();
        let chains = build_chains(&server);
        assert_eq!(chains.unary.names(), ["correlation_id", "auth", "recovery", "logging"]);
        assert_eq!(chains.user.names(), ["correlation_id", "http_auth", "recovery", "logging"]);
        assert_eq!(chains.public.names(), ["correlation_id", "recovery", "logging"]);
        assert!(chains.edge.is_empty());
    }

    #[test]
    fn optional_stages() {
        let config = ServerConfig::builder()
            .correlation_id(false)
            .recovery(false)
            .metrics(true)
            .build()
            .unwrap();
        let server = Server::builder().config(config).build().unwrap();
        let chains = build_chains(&server);
        assert_eq!(chains.stream.names(), ["logging", "metrics"]);
    }

    #[test]
    fn custom_recovery_is_installed_everywhere() {
        let config = ServerConfig::builder().recovery(false).build().unwrap();
        let server = Server::builder()
            .config(config)
            .recovery(RecoveryInterceptor::with_handler(|_ctx, _message| {
                duplex_core::Status::unavailable("try again")
            }))
            .build()
            .unwrap();
        let chains = build_chains(&server);
        assert_eq!(chains.unary.names(), ["correlation_id", "recovery", "logging"]);
        assert_eq!(chains.stream.names(), ["correlation_id", "recovery", "logging"]);
        assert_eq!(chains.public.names(), ["correlation_id", "recovery", "logging"]);
        assert_eq!(chains.user.names(), ["correlation_id", "recovery", "logging"]);
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<std::sync::Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn cleartext_serving_is_warned() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .finish();
        let address: SocketAddr = "127.0.0.1:8088".parse().unwrap();

        tracing::subscriber::with_default(subscriber, || {
            announce(address, true);
            assert!(captured.text().contains("server listening"));
            assert!(!captured.text().contains("WARN"));

            announce(address, false);
        });
        let text = captured.text();
        assert!(text.contains("WARN"));
        assert!(text.contains("cleartext"));
    }

    #[tokio::test]
    async fn prebound_listener_replaces_address() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ServerConfig::builder()
            .address(taken.local_addr().unwrap().to_string())
            .build()
            .unwrap();

        let bound = Server::builder()
            .config(config)
            .listener(listener)
            .build()
            .unwrap()
            .bind()
            .await
            .unwrap();
        assert_eq!(bound.local_addr(), addr);
    }

    #[tokio::test]
    async fn bind_reports_port_in_use() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();
        let server = Server::builder()
            .config(ServerConfig::builder().address(addr).build().unwrap())
            .build()
            .unwrap();
        assert!(matches!(server.bind().await, Err(ServerError::Bind { .. })));
    }
}
