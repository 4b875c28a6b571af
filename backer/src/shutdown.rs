//! Graceful shutdown handling for SIGTERM and SIGINT.
//!
//! The engine runs on a blocking thread and polls a cancellation token
//! between files and between copy chunks. On a signal the token is cancelled;
//! the file being copied is discarded and everything already journaled stays
//! journaled.

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Shutdown coordinator
pub struct ShutdownCoordinator {
    cancel_token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new(cancel_token: CancellationToken) -> Self {
        Self { cancel_token }
    }

    /// Token cancelled when a shutdown signal arrives
    pub fn token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Wait for a shutdown signal (SIGTERM or SIGINT), then cancel the token.
    pub async fn wait_for_signal(&self) {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                warn!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT (Ctrl+C), stopping after cleanup of the current file...");
            }
            _ = terminate => {
                info!("Received SIGTERM, stopping after cleanup of the current file...");
            }
            _ = self.cancel_token.cancelled() => {
                return;
            }
        }

        self.trigger();
    }

    /// Cancel the run without a signal
    pub fn trigger(&self) {
        self.cancel_token.cancel();
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}
