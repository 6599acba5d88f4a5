//! Accepting and serving connections.
//!
//! Cleartext connections are served by hyper's auto builder, which reads the
//! HTTP/2 preface to tell h2c prior-knowledge clients from HTTP/1.1 ones.
//! TLS connections use the protocol negotiated through ALPN.

use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use duplex_telemetry::metrics::ConnectionGuard;
use http::Request;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

use crate::dispatch::Dispatcher;
use crate::shutdown::ConnectionTracker;

/// Protocol selected for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Protocol {
    /// Sniff the HTTP/2 preface.
    Auto,
    Http1,
    Http2,
}

impl Protocol {
    fn from_alpn(alpn: Option<&[u8]>) -> Self {
        match alpn {
            Some(b"h2") => Self::Http2,
            Some(b"http/1.1") => Self::Http1,
            _ => Self::Auto,
        }
    }
}

/// Everything a connection task needs.
pub(crate) struct Connections {
    dispatcher: Arc<Dispatcher>,
    tls: Option<TlsAcceptor>,
    tracker: ConnectionTracker,
    drain: CancellationToken,
    read_timeout: Duration,
}

impl Connections {
    pub(crate) fn new(
        dispatcher: Arc<Dispatcher>,
        tls: Option<TlsAcceptor>,
        tracker: ConnectionTracker,
        drain: CancellationToken,
        read_timeout: Duration,
    ) -> Self {
        Self {
            dispatcher,
            tls,
            tracker,
            drain,
            read_timeout,
        }
    }

    /// Accepts connections until the drain token is cancelled.
    ///
    /// Per-connection accept failures are logged and skipped; any other
    /// listener error stops the loop and is returned.
    pub(crate) async fn accept_loop(self: Arc<Self>, listener: TcpListener) -> io::Result<()> {
        loop {
            let accepted = tokio::select! {
                biased;
                () = self.drain.cancelled() => return Ok(()),
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer)) => {
                    let token = self.tracker.acquire();
                    let connections = Arc::clone(&self);
                    tokio::spawn(async move {
                        let _guard = ConnectionGuard::new();
                        connections.serve(stream, peer).await;
                        drop(token);
                    });
                }
                Err(e) if is_connection_error(&e) => {
                    tracing::debug!(error = %e, "failed to accept connection");
                }
                Err(e) => {
                    tracing::error!(error = %e, "listener failed");
                    return Err(e);
                }
            }
        }
    }

    async fn serve(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%peer, error = %e, "failed to set TCP_NODELAY");
        }
        let Some(acceptor) = &self.tls else {
            self.serve_io(stream, peer, Protocol::Auto).await;
            return;
        };
        match tokio::time::timeout(self.read_timeout, acceptor.accept(stream)).await {
            Ok(Ok(stream)) => {
                let protocol = Protocol::from_alpn(stream.get_ref().1.alpn_protocol());
                self.serve_io(stream, peer, protocol).await;
            }
            Ok(Err(e)) => tracing::debug!(%peer, error = %e, "TLS handshake failed"),
            Err(_) => tracing::debug!(%peer, "TLS handshake timed out"),
        }
    }

    async fn serve_io<I>(&self, io: I, peer: SocketAddr, protocol: Protocol)
    where
        I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let dispatcher = Arc::clone(&self.dispatcher);
        let service = service_fn(move |request: Request<Incoming>| {
            let dispatcher = Arc::clone(&dispatcher);
            async move { Ok::<_, Infallible>(dispatcher.dispatch(request, Some(peer)).await) }
        });

        let mut builder = auto::Builder::new(TokioExecutor::new());
        builder = match protocol {
            Protocol::Auto => builder,
            Protocol::Http1 => builder.http1_only(),
            Protocol::Http2 => builder.http2_only(),
        };
        builder
            .http1()
            .timer(TokioTimer::new())
            .header_read_timeout(self.read_timeout);
        builder.http2().timer(TokioTimer::new());

        let conn = builder.serve_connection(TokioIo::new(io), service);
        tokio::pin!(conn);

        let mut draining = false;
        loop {
            tokio::select! {
                result = conn.as_mut() => {
                    if let Err(e) = result {
                        tracing::debug!(%peer, error = %e, "connection closed with error");
                    }
                    break;
                }
                () = self.drain.cancelled(), if !draining => {
                    draining = true;
                    conn.as_mut().graceful_shutdown();
                }
            }
        }
    }
}

/// Errors that concern one connection rather than the listener.
fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}
