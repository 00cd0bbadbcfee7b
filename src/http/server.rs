//! Tunnel server runtime.
//!
//! # Responsibilities
//! - Validate settings into an immutable server (builder)
//! - Bind the tunnel listener on `start`, then serve it on a background task
//! - Close the listener on `stop`, telling deliberate shutdown from failure
//! - Let any number of callers `wait` for the background work to finish
//!
//! # Design Decisions
//! - `start` is synchronous up to the bind and asynchronous afterwards;
//!   failures of the serve loop are only ever logged, never returned
//! - `Idle → Listening → Stopped`; a stopped server cannot be restarted
//! - One async mutex guards the state, including the listener handle, so
//!   concurrent `stop` calls close the listener exactly once

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::Response,
    Router,
};
use axum_server::accept::Accept;
use axum_server::tls_rustls::{RustlsAcceptor, RustlsConfig};
use hyper::body::Incoming;
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tower::ServiceExt;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::schema::{ServerConfig, DEFAULT_TUNNEL_IP, DEFAULT_TUNNEL_PORT};
use crate::config::validation::{parse_ip, validate_port, ValidationError};
use crate::http::handler::TunnelHandler;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::lifecycle::{flag_raised, WorkGuard, WorkTracker};
use crate::net::connection::{ConnectionId, ConnectionTracker};
use crate::net::listener::{is_transient, Acceptor, AcceptorError, ListenerHandle};
use crate::observability::metrics;

/// First pause after a transient accept error; doubles on each repeat.
const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(10);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Settings rejected while building a server or handler.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("cannot instantiate: {}", join(.0))]
    Invalid(Vec<ValidationError>),

    #[error("cannot instantiate server: invalid handler: none configured")]
    MissingHandler,
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors returned by [`TunnelServer::start`].
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("could not start listener: {0}")]
    Bind(#[from] AcceptorError),

    #[error("server already started")]
    AlreadyStarted,

    #[error("server has been stopped; create a new one to listen again")]
    Stopped,
}

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    Idle,
    Listening,
    Stopped,
}

enum ServerState {
    Idle,
    Listening(ListenerHandle),
    Stopped,
}

impl ServerState {
    fn status(&self) -> ServerStatus {
        match self {
            ServerState::Idle => ServerStatus::Idle,
            ServerState::Listening(_) => ServerStatus::Listening,
            ServerState::Stopped => ServerStatus::Stopped,
        }
    }
}

/// Accepts tunnel clients and serves them through a [`TunnelHandler`].
pub struct TunnelServer {
    bind_addr: SocketAddr,
    tls: Option<RustlsConfig>,
    router: Router,
    drain_timeout: Duration,
    state: Arc<Mutex<ServerState>>,
    work: WorkTracker,
}

impl TunnelServer {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// Bind the listener and start serving in the background.
    ///
    /// Returns once the listener is bound; it does not wait for the serve
    /// loop to produce anything. On a bind failure the server stays idle and
    /// `start` may be called again.
    pub async fn start(&self) -> Result<(), ServerError> {
        let mut state = self.state.lock().await;
        match *state {
            ServerState::Idle => {}
            ServerState::Listening(_) => return Err(ServerError::AlreadyStarted),
            ServerState::Stopped => return Err(ServerError::Stopped),
        }

        let (acceptor, handle) = Acceptor::bind(self.bind_addr, self.tls.clone()).await?;

        let work = self.work.track();
        *state = ServerState::Listening(handle);

        tokio::spawn(serve(
            acceptor,
            Arc::clone(&self.state),
            self.router.clone(),
            self.drain_timeout,
            work,
        ));

        Ok(())
    }

    /// Close the listener. A no-op unless the server is listening.
    pub async fn stop(&self) {
        let handle = {
            let mut state = self.state.lock().await;
            match std::mem::replace(&mut *state, ServerState::Stopped) {
                ServerState::Listening(handle) => handle,
                previous => {
                    *state = previous;
                    return;
                }
            }
        };

        tracing::info!(address = %handle.local_addr(), "Stopping tunnel service");
        handle.close();
    }

    /// Resolve once all background work has finished.
    ///
    /// This says nothing about *how* it finished: serve loop failures are
    /// reported through the log, not here.
    pub async fn wait(&self) {
        self.work.wait().await;
    }

    pub async fn status(&self) -> ServerStatus {
        self.state.lock().await.status()
    }

    /// Bound address while listening.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.state.lock().await {
            ServerState::Listening(handle) => Some(handle.local_addr()),
            _ => None,
        }
    }

    /// Configured bind address.
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }
}

impl Drop for TunnelServer {
    fn drop(&mut self) {
        // A server dropped while listening shuts down as if stopped. The lock
        // can only be busy here if the serve task is checking it after its
        // accept loop ended; the socket is released right after that check.
        if let Ok(mut state) = self.state.try_lock() {
            if let ServerState::Listening(handle) =
                std::mem::replace(&mut *state, ServerState::Stopped)
            {
                handle.close();
            }
        }
    }
}

/// Accept loop. Owns the work guard for the whole run, drain included.
async fn serve(
    mut acceptor: Acceptor,
    state: Arc<Mutex<ServerState>>,
    router: Router,
    drain_timeout: Duration,
    _work: WorkGuard,
) {
    let address = acceptor.local_addr();
    tracing::info!("starting service at {}://{}", acceptor.scheme(), address);

    let connections = ConnectionTracker::new();
    let mut backoff = ACCEPT_BACKOFF_MIN;

    let error = loop {
        match acceptor.accept().await {
            Ok((stream, peer)) => {
                backoff = ACCEPT_BACKOFF_MIN;
                spawn_connection(
                    stream,
                    peer,
                    acceptor.tls().cloned(),
                    router.clone(),
                    &connections,
                );
            }
            Err(AcceptorError::Accept(e)) if is_transient(&e) => {
                tracing::warn!(error = %e, retry_in = ?backoff, "Transient accept error");
                metrics::record_accept_error("transient");
                acceptor.pause(backoff).await;
                backoff = (backoff * 2).min(ACCEPT_BACKOFF_MAX);
            }
            Err(e) => break e,
        }
    };

    let deliberate = !matches!(*state.lock().await, ServerState::Listening(_));
    if deliberate {
        tracing::debug!(address = %address, "Listener closed by stop");
    } else {
        metrics::record_accept_error("fatal");
        tracing::error!(address = %address, error = %error, "server terminated");
    }

    // Release the port before draining.
    drop(acceptor);

    connections.begin_drain();
    if !connections.wait_for_drain(drain_timeout).await {
        tracing::warn!(
            remaining = connections.active_count(),
            timeout = ?drain_timeout,
            "Connections still open after drain timeout"
        );
    }

    tracing::info!(address = %address, "Tunnel service stopped");
}

fn spawn_connection(
    stream: TcpStream,
    peer: SocketAddr,
    tls: Option<RustlsAcceptor>,
    router: Router,
    connections: &ConnectionTracker,
) {
    let guard = connections.track();
    let drain = connections.drain_receiver();

    tokio::spawn(async move {
        let id = guard.id();
        tracing::debug!(connection_id = %id, peer = %peer, "Connection accepted");

        match tls {
            Some(tls) => match tls.accept(stream, ()).await {
                Ok((stream, ())) => serve_connection(stream, peer, router, drain, id).await,
                Err(e) => {
                    tracing::debug!(connection_id = %id, peer = %peer, error = %e, "TLS handshake failed");
                }
            },
            None => serve_connection(stream, peer, router, drain, id).await,
        }

        drop(guard);
    });
}

async fn serve_connection<I>(
    io: I,
    peer: SocketAddr,
    router: Router,
    mut drain: watch::Receiver<bool>,
    id: ConnectionId,
) where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = hyper::service::service_fn(move |mut request: Request<Incoming>| {
        request.extensions_mut().insert(ConnectInfo(peer));
        router.clone().oneshot(request)
    });

    let builder = auto::Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection(TokioIo::new(io), service);
    tokio::pin!(conn);

    let mut draining = false;
    loop {
        tokio::select! {
            res = conn.as_mut() => {
                if let Err(e) = res {
                    tracing::debug!(connection_id = %id, error = %e, "Connection error");
                }
                break;
            }
            _ = flag_raised(&mut drain), if !draining => {
                draining = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }
}

async fn dispatch(
    State(handler): State<Arc<dyn TunnelHandler>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();

    let response = handler.handle(peer, request).await;

    metrics::record_request(method.as_str(), response.status().as_u16(), start);
    response
}

#[allow(deprecated)]
fn build_router(handler: Arc<dyn TunnelHandler>, request_timeout: Duration) -> Router {
    Router::new()
        .fallback(dispatch)
        .with_state(handler)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(propagate_request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(set_request_id_layer())
}

/// Accumulates server settings; validated by [`build`](Self::build).
pub struct ServerBuilder {
    tunnel_ip: String,
    tunnel_port: u32,
    tls: Option<RustlsConfig>,
    handler: Option<Arc<dyn TunnelHandler>>,
    request_timeout: Duration,
    drain_timeout: Duration,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        let defaults = ServerConfig::default();
        Self {
            tunnel_ip: DEFAULT_TUNNEL_IP.to_string(),
            tunnel_port: DEFAULT_TUNNEL_PORT,
            tls: None,
            handler: None,
            request_timeout: Duration::from_secs(defaults.timeouts.request_secs),
            drain_timeout: Duration::from_secs(defaults.timeouts.drain_secs),
        }
    }
}

impl ServerBuilder {
    /// Seed the builder from a loaded config. TLS material is loaded
    /// separately, see [`crate::net::tls::from_config`].
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::default()
            .tunnel_ip(&config.tunnel.ip)
            .tunnel_port(config.tunnel.port)
            .request_timeout(Duration::from_secs(config.timeouts.request_secs))
            .drain_timeout(Duration::from_secs(config.timeouts.drain_secs))
    }

    /// IP literal the tunnel listener binds to.
    pub fn tunnel_ip(mut self, ip: &str) -> Self {
        self.tunnel_ip = ip.to_string();
        self
    }

    /// Listen for tunnel clients on all interfaces.
    pub fn tunnel_expose(self) -> Self {
        self.tunnel_ip("0.0.0.0")
    }

    /// Port the tunnel listener binds to, 1-65535.
    pub fn tunnel_port(mut self, port: u32) -> Self {
        self.tunnel_port = port;
        self
    }

    /// TLS for tunnel clients; `None` serves plaintext.
    pub fn tls(mut self, tls: Option<RustlsConfig>) -> Self {
        self.tls = tls;
        self
    }

    pub fn handler(mut self, handler: Arc<dyn TunnelHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// How long `stop` lets open connections finish.
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<TunnelServer, BuildError> {
        let ip: Result<IpAddr, _> = parse_ip("tunnel_ip", &self.tunnel_ip);
        let port = validate_port("tunnel_port", self.tunnel_port);

        let (ip, port) = match (ip, port) {
            (Ok(ip), Ok(port)) => (ip, port),
            (ip, port) => {
                return Err(BuildError::Invalid(
                    [ip.err(), port.err()].into_iter().flatten().collect(),
                ))
            }
        };
        let handler = self.handler.ok_or(BuildError::MissingHandler)?;

        Ok(TunnelServer {
            bind_addr: SocketAddr::new(ip, port),
            tls: self.tls,
            router: build_router(handler, self.request_timeout),
            drain_timeout: self.drain_timeout,
            state: Arc::new(Mutex::new(ServerState::Idle)),
            work: WorkTracker::new(),
        })
    }
}
