//! Tunnel listener: bind, accept, close.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept incoming TCP connections until closed
//! - Carry the optional TLS acceptor for the connection layer
//! - Classify accept errors as transient or fatal
//!
//! # Design Decisions
//! - Binding yields two halves: the [`Acceptor`] moves into the serve task,
//!   the [`ListenerHandle`] stays with whoever bound it and is the only way
//!   to close the listener
//! - Closing wakes a pending `accept` with [`AcceptorError::Closed`]; the
//!   socket itself is released when the serve task drops the acceptor

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use axum_server::tls_rustls::{RustlsAcceptor, RustlsConfig};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use crate::lifecycle::flag_raised;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum AcceptorError {
    /// Failed to bind to address.
    #[error("could not bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Failed to accept connection.
    #[error("failed to accept: {0}")]
    Accept(#[source] io::Error),

    /// The listener was closed through its handle.
    #[error("listener closed")]
    Closed,
}

/// Accepting half of a bound listener.
pub struct Acceptor {
    inner: TcpListener,
    local_addr: SocketAddr,
    tls: Option<RustlsAcceptor>,
    closed: watch::Receiver<bool>,
    #[cfg(test)]
    fail_next: Option<io::ErrorKind>,
}

impl std::fmt::Debug for Acceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acceptor")
            .field("local_addr", &self.local_addr)
            .field("tls", &self.tls.is_some())
            .finish()
    }
}

/// Owning half of a bound listener; closes it.
#[derive(Debug)]
pub struct ListenerHandle {
    closed: watch::Sender<bool>,
    local_addr: SocketAddr,
}

impl Acceptor {
    /// Bind `addr`, wrapping accepted connections in `tls` when given.
    pub async fn bind(
        addr: SocketAddr,
        tls: Option<RustlsConfig>,
    ) -> Result<(Acceptor, ListenerHandle), AcceptorError> {
        let bind_error = move |source| AcceptorError::Bind { addr, source };

        let inner = TcpListener::bind(addr).await.map_err(bind_error)?;
        // `inner` is dropped (and the port freed) if this fails.
        let local_addr = inner.local_addr().map_err(bind_error)?;

        if tls.is_some() {
            tracing::info!("using TLS");
        }

        let (tx, rx) = watch::channel(false);

        tracing::debug!(address = %local_addr, tls = tls.is_some(), "Listener bound");

        Ok((
            Acceptor {
                inner,
                local_addr,
                tls: tls.map(RustlsAcceptor::new),
                closed: rx,
                #[cfg(test)]
                fail_next: None,
            },
            ListenerHandle {
                closed: tx,
                local_addr,
            },
        ))
    }

    /// Wait for the next connection.
    ///
    /// Returns [`AcceptorError::Closed`] once the handle has been closed or
    /// dropped, even if connections are queued.
    pub async fn accept(&mut self) -> Result<(TcpStream, SocketAddr), AcceptorError> {
        #[cfg(test)]
        if let Some(kind) = self.fail_next.take() {
            return Err(AcceptorError::Accept(kind.into()));
        }

        tokio::select! {
            biased;
            // A dropped handle counts as closed.
            _ = flag_raised(&mut self.closed) => Err(AcceptorError::Closed),
            res = self.inner.accept() => res.map_err(AcceptorError::Accept),
        }
    }

    /// Sleep for `delay`, waking early if the handle is closed meanwhile.
    pub async fn pause(&mut self, delay: Duration) {
        tokio::select! {
            biased;
            _ = flag_raised(&mut self.closed) => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }

    /// Make the next `accept` fail with `kind` without touching the socket.
    #[cfg(test)]
    pub(crate) fn fail_next_accept(&mut self, kind: io::ErrorKind) {
        self.fail_next = Some(kind);
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// TLS acceptor applied to each connection, if TLS is enabled.
    pub fn tls(&self) -> Option<&RustlsAcceptor> {
        self.tls.as_ref()
    }

    /// `https` with TLS, `http` without.
    pub fn scheme(&self) -> &'static str {
        if self.tls.is_some() {
            "https"
        } else {
            "http"
        }
    }
}

impl ListenerHandle {
    /// Close the listener. Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        let was_closed = self.closed.send_replace(true);
        if !was_closed {
            tracing::debug!(address = %self.local_addr, "Listener closed");
        }
        !was_closed
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// `ENFILE` and `EMFILE`: the process or system file table is full.
#[cfg(unix)]
const FD_EXHAUSTED: [i32; 2] = [23, 24];

/// Errors the accept loop should back off from and retry: failures of the
/// single connection being accepted, or a file table that is full for now.
pub fn is_transient(err: &io::Error) -> bool {
    if matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    ) {
        return true;
    }

    #[cfg(unix)]
    if let Some(code) = err.raw_os_error() {
        return FD_EXHAUSTED.contains(&code);
    }

    false
}
