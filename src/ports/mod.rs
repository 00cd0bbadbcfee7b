//! Public port allocation subsystem.
//!
//! # Data Flow
//! ```text
//! Tunnel client registers
//!     → session logic asks registry.rs for a port
//!     → port bound publicly for the lifetime of the tunnel
//!     → tunnel closes → port released back to the registry
//! ```

pub mod registry;

pub use registry::{PortRegistry, PortRegistryError};
