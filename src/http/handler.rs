//! Request handling for the tunnel listener.
//!
//! # Responsibilities
//! - Define the contract the server dispatches every request to
//! - Provide the default registration handler, which owns the public port
//!   pool and the public-facing IP
//!
//! # Design Decisions
//! - The server holds one shared handler for its whole lifetime
//! - Handlers get the peer address explicitly, not via extractors

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::config::schema::{
    ClientConfig, DEFAULT_CLIENT_IP, DEFAULT_CLIENT_PORT_LOWER, DEFAULT_CLIENT_PORT_UPPER,
};
use crate::config::validation::{parse_ip, validate_port};
use crate::http::request::RequestIdExt;
use crate::http::server::BuildError;
use crate::ports::PortRegistry;

/// Processes requests arriving on the tunnel listener.
pub trait TunnelHandler: Send + Sync + 'static {
    /// Handle one request from `peer`.
    fn handle(&self, peer: SocketAddr, request: Request<Body>) -> BoxFuture<'static, Response>;
}

/// Default handler: accepts tunnel client registrations.
#[derive(Debug)]
pub struct RegistrationHandler {
    client_ip: IpAddr,
    ports: Arc<PortRegistry>,
}

impl RegistrationHandler {
    pub fn builder() -> RegistrationHandlerBuilder {
        RegistrationHandlerBuilder::default()
    }

    /// Build from the `[client]` section of a loaded config.
    pub fn from_config(config: &ClientConfig) -> Result<Self, BuildError> {
        Self::builder()
            .client_ip(&config.ip)
            .client_port_range(config.port_lower, config.port_upper)
            .build()
    }

    /// IP public tunnel listeners bind to.
    pub fn client_ip(&self) -> IpAddr {
        self.client_ip
    }

    /// Pool of public ports handed to tunnels.
    pub fn ports(&self) -> &Arc<PortRegistry> {
        &self.ports
    }
}

impl TunnelHandler for RegistrationHandler {
    fn handle(&self, peer: SocketAddr, request: Request<Body>) -> BoxFuture<'static, Response> {
        tracing::debug!(
            peer = %peer,
            method = %request.method(),
            path = %request.uri().path(),
            request_id = request.request_id().unwrap_or("unknown"),
            "got request"
        );

        async { StatusCode::OK.into_response() }.boxed()
    }
}

/// Accumulates handler settings; validated by [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct RegistrationHandlerBuilder {
    client_ip: String,
    port_lower: u32,
    port_upper: u32,
}

impl Default for RegistrationHandlerBuilder {
    fn default() -> Self {
        Self {
            client_ip: DEFAULT_CLIENT_IP.to_string(),
            port_lower: DEFAULT_CLIENT_PORT_LOWER,
            port_upper: DEFAULT_CLIENT_PORT_UPPER,
        }
    }
}

impl RegistrationHandlerBuilder {
    /// IP literal public tunnel listeners bind to.
    pub fn client_ip(mut self, ip: &str) -> Self {
        self.client_ip = ip.to_string();
        self
    }

    /// Bind public tunnel listeners on all interfaces.
    pub fn client_expose(self) -> Self {
        self.client_ip("0.0.0.0")
    }

    /// Ports handed to tunnels; the bounds may be given in either order.
    pub fn client_port_range(mut self, lower: u32, upper: u32) -> Self {
        self.port_lower = lower;
        self.port_upper = upper;
        self
    }

    pub fn build(self) -> Result<RegistrationHandler, BuildError> {
        let ip = parse_ip("client_ip", &self.client_ip);
        let lower = validate_port("client_port_lower", self.port_lower);
        let upper = validate_port("client_port_upper", self.port_upper);

        match (ip, lower, upper) {
            (Ok(client_ip), Ok(lower), Ok(upper)) => Ok(RegistrationHandler {
                client_ip,
                ports: Arc::new(PortRegistry::new(lower, upper)),
            }),
            (ip, lower, upper) => Err(BuildError::Invalid(
                [ip.err(), lower.err(), upper.err()]
                    .into_iter()
                    .flatten()
                    .collect(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidationError;

    #[test]
    fn defaults() {
        let handler = RegistrationHandler::builder().build().unwrap();
        assert_eq!(handler.client_ip().to_string(), DEFAULT_CLIENT_IP);
        assert_eq!(handler.ports().capacity(), 1000);
    }

    #[test]
    fn expose_and_range() {
        let handler = RegistrationHandler::builder()
            .client_expose()
            .client_port_range(9002, 9000)
            .build()
            .unwrap();
        assert!(handler.client_ip().is_unspecified());
        assert_eq!(handler.ports().range(), 9000..=9002);
    }

    #[test]
    fn rejects_bad_settings() {
        let err = RegistrationHandler::builder()
            .client_ip("example.com")
            .client_port_range(0, 70_000)
            .build()
            .unwrap_err();

        match err {
            BuildError::Invalid(errors) => {
                assert_eq!(errors.len(), 3);
                assert!(matches!(errors[0], ValidationError::InvalidIp { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn answers_ok() {
        let handler = RegistrationHandler::builder().build().unwrap();
        let peer: SocketAddr = "127.0.0.1:5555".parse().unwrap();
        let response = handler
            .handle(peer, Request::new(Body::empty()))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
