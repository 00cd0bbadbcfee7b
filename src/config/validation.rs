//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate IP literals and port ranges
//! - Validate timeouts and auxiliary addresses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::{IpAddr, SocketAddr};

use thiserror::Error;

use crate::config::schema::ServerConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Not a valid IPv4 or IPv6 literal.
    #[error("{field}: invalid IP address (got '{value}')")]
    InvalidIp { field: &'static str, value: String },

    /// Port outside 1-65535.
    #[error("{field}: invalid port: must be between 1 and 65535 inclusive (got {value})")]
    InvalidPort { field: &'static str, value: u32 },

    /// A timeout that must be positive is zero.
    #[error("{field}: must be greater than zero")]
    ZeroTimeout { field: &'static str },

    /// Not a valid socket address.
    #[error("{field}: invalid socket address (got '{value}')")]
    InvalidAddress { field: &'static str, value: String },
}

/// Parse an IP literal, reporting the offending field on failure.
pub fn parse_ip(field: &'static str, value: &str) -> Result<IpAddr, ValidationError> {
    value.parse().map_err(|_| ValidationError::InvalidIp {
        field,
        value: value.to_string(),
    })
}

/// Check that `port` is in 1-65535 and narrow it.
pub fn validate_port(field: &'static str, port: u32) -> Result<u16, ValidationError> {
    match u16::try_from(port) {
        Ok(p) if p != 0 => Ok(p),
        _ => Err(ValidationError::InvalidPort { field, value: port }),
    }
}

/// Validate a whole configuration, collecting every error.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = parse_ip("tunnel.ip", &config.tunnel.ip) {
        errors.push(e);
    }
    if let Err(e) = validate_port("tunnel.port", config.tunnel.port) {
        errors.push(e);
    }
    if let Err(e) = parse_ip("client.ip", &config.client.ip) {
        errors.push(e);
    }
    if let Err(e) = validate_port("client.port_lower", config.client.port_lower) {
        errors.push(e);
    }
    if let Err(e) = validate_port("client.port_upper", config.client.port_upper) {
        errors.push(e);
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout {
            field: "timeouts.request_secs",
        });
    }
    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&ServerConfig::default()).is_ok());
    }

    #[test]
    fn port_bounds() {
        assert!(validate_port("p", 0).is_err());
        assert_eq!(validate_port("p", 1).unwrap(), 1);
        assert_eq!(validate_port("p", 65535).unwrap(), 65535);
        assert!(validate_port("p", 65536).is_err());
    }

    #[test]
    fn ip_literals_only() {
        assert!(parse_ip("ip", "0.0.0.0").is_ok());
        assert!(parse_ip("ip", "::1").is_ok());
        assert!(parse_ip("ip", "localhost").is_err());
        assert!(parse_ip("ip", "256.0.0.1").is_err());
    }

    #[test]
    fn reports_every_error() {
        let mut config = ServerConfig::default();
        config.tunnel.ip = "nope".into();
        config.tunnel.port = 0;
        config.client.port_upper = 70_000;
        config.timeouts.request_secs = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::InvalidPort {
            field: "tunnel.port",
            value: 0
        }));
    }

    #[test]
    fn metrics_address_checked_only_when_enabled() {
        let mut config = ServerConfig::default();
        config.observability.metrics_address = "garbage".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }
}
