//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection from a tunnel client
//!     → listener.rs (accept until the handle is closed)
//!     → tls.rs (optional TLS material, handshake per connection)
//!     → connection.rs (lifecycle tracking, drain on stop)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - The listener is closed only through the handle returned by bind
//! - Each connection tracked so a stop can drain them within a deadline
//! - TLS is optional and handled transparently

pub mod connection;
pub mod listener;
pub mod tls;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{Acceptor, AcceptorError, ListenerHandle};
pub use tls::{load_tls_config, TlsError};
