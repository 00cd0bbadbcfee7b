//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection from the tunnel listener
//!     → server.rs (hyper connection, HTTP/1.1 or HTTP/2)
//!     → request.rs (x-request-id assigned and echoed)
//!     → handler.rs (TunnelHandler::handle)
//!     → response back to the tunnel client
//! ```

pub mod handler;
pub mod request;
pub mod server;

pub use handler::{RegistrationHandler, RegistrationHandlerBuilder, TunnelHandler};
pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::{BuildError, ServerBuilder, ServerError, ServerStatus, TunnelServer};
