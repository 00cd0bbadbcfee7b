//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the tunnel
//! server. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Default address the tunnel listener binds to.
pub const DEFAULT_TUNNEL_IP: &str = "127.0.0.1";
/// Default port tunnel clients connect to.
pub const DEFAULT_TUNNEL_PORT: u32 = 8888;
/// Default address public tunnel listeners bind to.
pub const DEFAULT_CLIENT_IP: &str = "127.0.0.1";
/// Lower bound of the default public port range.
pub const DEFAULT_CLIENT_PORT_LOWER: u32 = 10_000;
/// Upper bound of the default public port range.
pub const DEFAULT_CLIENT_PORT_UPPER: u32 = 10_999;

/// Root configuration for the tunnel server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener tunnel clients connect to.
    pub tunnel: TunnelListenerConfig,

    /// Public side: where exposed tunnels listen and which ports they get.
    pub client: ClientConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Tunnel listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TunnelListenerConfig {
    /// IP literal to bind (e.g., "0.0.0.0").
    pub ip: String,

    /// Port to bind, 1-65535.
    pub port: u32,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for TunnelListenerConfig {
    fn default() -> Self {
        Self {
            ip: DEFAULT_TUNNEL_IP.to_string(),
            port: DEFAULT_TUNNEL_PORT,
            tls: None,
        }
    }
}

/// TLS configuration for the tunnel listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Public-facing side of the tunnels.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// IP literal exposed tunnels bind to.
    pub ip: String,

    /// Lowest port handed out to a tunnel.
    pub port_lower: u32,

    /// Highest port handed out to a tunnel (inclusive).
    pub port_upper: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ip: DEFAULT_CLIENT_IP.to_string(),
            port_lower: DEFAULT_CLIENT_PORT_LOWER,
            port_upper: DEFAULT_CLIENT_PORT_UPPER,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// How long a stopping server waits for in-flight connections, in seconds.
    pub drain_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            drain_secs: 5,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines instead of human-readable text.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
