//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use httptun::http::{ServerBuilder, TunnelHandler};

/// Handler that counts invocations and optionally stalls before answering.
#[derive(Debug, Default)]
pub struct CountingHandler {
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl CountingHandler {
    #[allow(dead_code)]
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Some(delay),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TunnelHandler for CountingHandler {
    fn handle(&self, _peer: SocketAddr, _request: Request<Body>) -> BoxFuture<'static, Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay;
        async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            (StatusCode::OK, "registered").into_response()
        }
        .boxed()
    }
}

/// Builder bound to a fixed loopback port.
pub fn server_on(port: u16, handler: Arc<CountingHandler>) -> ServerBuilder {
    ServerBuilder::default()
        .tunnel_ip("127.0.0.1")
        .tunnel_port(u32::from(port))
        .handler(handler)
        .drain_timeout(Duration::from_secs(1))
}

/// Client that never reuses pooled connections or consults proxies.
#[allow(dead_code)]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

/// Fail the test instead of hanging when `fut` does not finish in time.
pub async fn bounded<F: std::future::Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("operation did not finish in time")
}

/// Log output captured by [`capture_logs`].
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    #[allow(dead_code)]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Send this thread's tracing events, debug and up, into a buffer until the
/// guard drops. Tasks spawned on a current-thread runtime are included.
#[allow(dead_code)]
pub fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(move || writer.clone())
        .finish();
    (buffer, tracing::subscriber::set_default(subscriber))
}
