//! httptun: expose a local service through a public port on this server.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────┐
//!                      │                  HTTPTUN SERVER                   │
//!                      │                                                   │
//!   Tunnel client      │  ┌──────────┐    ┌──────────┐    ┌─────────────┐ │
//!   ───────────────────┼─▶│   net    │───▶│   http   │───▶│   handler   │ │
//!                      │  │ listener │    │  server  │    │ (register)  │ │
//!                      │  └──────────┘    └──────────┘    └──────┬──────┘ │
//!                      │                                         │        │
//!                      │                                         ▼        │
//!                      │                                  ┌─────────────┐ │
//!                      │                                  │    ports    │ │
//!                      │                                  │  registry   │ │
//!                      │                                  └─────────────┘ │
//!                      │  ┌────────────────────────────────────────────┐  │
//!                      │  │ config · lifecycle · observability         │  │
//!                      │  └────────────────────────────────────────────┘  │
//!                      └──────────────────────────────────────────────────┘
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use httptun::config::{load_config, ServerConfig};
use httptun::http::{RegistrationHandler, ServerBuilder};
use httptun::lifecycle::signals::stop_on_signal;
use httptun::net::tls;
use httptun::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "httptun")]
#[command(about = "HTTP tunnel server and client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Accept tunnel clients and expose their services
    Server {
        /// TOML configuration file; built-in defaults when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Connect to a server and expose a local service
    Client,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Server { config } => run_server(config.as_deref()).await,
        Commands::Client => Err("client not yet implemented".into()),
    }
}

async fn run_server(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = match config_path {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };

    logging::init_logging(&config.observability);

    tracing::info!("httptun v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        tunnel_ip = %config.tunnel.ip,
        tunnel_port = config.tunnel.port,
        client_ports = %format!("{}-{}", config.client.port_lower, config.client.port_upper),
        tls = config.tunnel.tls.is_some(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        // Validated on load.
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        }
    }

    let tls = tls::from_config(config.tunnel.tls.as_ref()).await?;
    let handler = Arc::new(RegistrationHandler::from_config(&config.client)?);

    let server = Arc::new(
        ServerBuilder::from_config(&config)
            .tls(tls)
            .handler(handler)
            .build()?,
    );

    server.start().await?;

    let signals = stop_on_signal(Arc::clone(&server));
    server.wait().await;
    signals.abort();

    tracing::info!("Shutdown complete");
    Ok(())
}
