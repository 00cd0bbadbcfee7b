//! Server side of an HTTP tunneling service.
//!
//! A [`TunnelServer`] accepts long-lived connections from tunnel clients on
//! one listener, and a [`PortRegistry`] hands out the public ports those
//! tunnels are exposed on.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod ports;

pub use config::schema::ServerConfig;
pub use http::{RegistrationHandler, TunnelHandler, TunnelServer};
pub use ports::PortRegistry;
