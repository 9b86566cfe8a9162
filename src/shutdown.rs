use tokio::signal::unix::{signal, SignalKind};

use crate::server::ServerHandle;

/// Resolve once SIGTERM or SIGINT arrives.
///
/// # Errors
///
/// Returns an error if either signal handler cannot be installed.
pub async fn wait_for_signal() -> std::io::Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT, initiating graceful shutdown");
        }
    }
    Ok(())
}

/// Cancel `handle` when the process is asked to terminate.
///
/// The agent then stops accepting, drains in-flight requests and stops its
/// executors before [`AgentServer::run`](crate::server::AgentServer::run)
/// returns.
pub fn install_shutdown_handler(handle: ServerHandle) {
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(()) => handle.cancel(),
            Err(e) => tracing::error!(error = %e, "Failed to install signal handlers"),
        }
    });
}
