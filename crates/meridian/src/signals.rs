//! Termination signal handling.

use meridian_node::ShutdownState;
use tokio::signal;
use tracing::info;

/// Resolves on the next SIGINT or SIGTERM (Ctrl+C on Windows).
pub async fn wait_for_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(windows)]
    signal::ctrl_c().await?;

    Ok(())
}

/// Waits for a termination signal and starts shutting `state` down.
pub async fn shutdown_on_signal(state: &ShutdownState) -> std::io::Result<()> {
    wait_for_signal().await?;
    info!("📡 Received shutdown signal - initiating graceful shutdown");
    state.initiate_shutdown();
    Ok(())
}
