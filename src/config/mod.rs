//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → ServerBuilder::from_config / RegistrationHandler::from_config
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; a running server never re-reads it
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    ClientConfig, ObservabilityConfig, ServerConfig, TimeoutConfig, TlsConfig,
    TunnelListenerConfig,
};
pub use validation::{parse_ip, validate_config, validate_port, ValidationError};
