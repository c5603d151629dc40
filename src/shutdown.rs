//! OS signal handling.
//!
//! SIGTERM and SIGINT cancel the root scope; everything below it winds down
//! through its child scopes.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Shutdown signal types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGTERM signal received
    Sigterm,
    /// SIGINT signal received (Ctrl+C)
    Sigint,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sigterm => write!(f, "SIGTERM"),
            Self::Sigint => write!(f, "SIGINT"),
        }
    }
}

/// Install OS signal handlers (SIGTERM, SIGINT) that cancel `scope`.
///
/// The returned task also ends when `scope` is cancelled by someone else.
pub fn install_signal_handlers(scope: CancellationToken) -> JoinHandle<()> {
    info!("Installing OS signal handlers");

    tokio::spawn(async move {
        tokio::select! {
            () = scope.cancelled() => {}
            signal = wait_for_signal() => {
                info!(signal = %signal, "Shutting down");
                scope.cancel();
            }
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> ShutdownSignal {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Failed to install SIGTERM handler");
            return std::future::pending().await;
        }
    };

    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Failed to install SIGINT handler");
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => ShutdownSignal::Sigterm,
        _ = sigint.recv() => ShutdownSignal::Sigint,
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> ShutdownSignal {
    // Windows doesn't have SIGTERM, only Ctrl+C
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
        return std::future::pending().await;
    }
    ShutdownSignal::Sigint
}
