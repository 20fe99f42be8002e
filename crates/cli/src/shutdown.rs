//! Process signals that end the mirror loop

use anyhow::{Context, Result};
use engine::StopHandle;

#[cfg(unix)]
use tokio::signal::unix::{signal, Signal, SignalKind};

/// Installed interrupt and terminate handlers
pub struct ShutdownSignals {
    #[cfg(unix)]
    sigterm: Signal,
    #[cfg(unix)]
    sigint: Signal,
}

impl ShutdownSignals {
    /// Register handlers; must be called inside the runtime
    pub fn install() -> Result<Self> {
        #[cfg(unix)]
        {
            Ok(Self {
                sigterm: signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?,
                sigint: signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?,
            })
        }

        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Wait for the first shutdown signal
    pub async fn recv(&mut self) -> Result<()> {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.sigterm.recv() => tracing::info!("Received SIGTERM, shutting down"),
                _ = self.sigint.recv() => tracing::info!("Received SIGINT, shutting down"),
            }
            Ok(())
        }

        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            tracing::info!("Received Ctrl-C, shutting down");
            Ok(())
        }
    }

    /// Trigger `handle` when a signal arrives
    pub fn forward_to(mut self, handle: StopHandle) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            match self.recv().await {
                Ok(()) => handle.stop(),
                Err(e) => tracing::warn!(error = %format!("{e:#}"), "Signal listener failed"),
            }
        })
    }
}
