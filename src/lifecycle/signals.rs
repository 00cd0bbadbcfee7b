//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGTERM/SIGINT (Ctrl+C elsewhere)
//! - Translate the first signal into exactly one `stop()`
//! - Log and ignore repeated signals while stopping

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::http::TunnelServer;

/// Resolve when the process receives an interrupt or terminate signal.
pub async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Stop `server` on the first shutdown signal.
///
/// The returned task keeps draining signals afterwards so that repeated
/// interrupts are reported instead of killing the process mid-shutdown.
pub fn stop_on_signal(server: Arc<TunnelServer>) -> JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::info!("Shutdown signal received");
        server.stop().await;

        loop {
            wait_for_shutdown_signal().await;
            tracing::info!("Already stopping, ignoring signal");
        }
    })
}
