//! Interrupt handling: turns SIGINT/SIGTERM into a cancelled token.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Wait for SIGTERM or SIGINT. Returns `false` if no handler could be registered.
#[cfg(unix)]
pub async fn wait_for_signal() -> bool {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
            true
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
            true
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
            true
        }
        (Err(_), Err(e)) => {
            tracing::warn!(error = %e, "Could not register signal handlers, using ctrl_c fallback");
            ctrl_c().await
        }
    }
}

/// Wait for Ctrl+C. Returns `false` if the handler could not be registered.
#[cfg(not(unix))]
pub async fn wait_for_signal() -> bool {
    ctrl_c().await
}

async fn ctrl_c() -> bool {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            false
        }
    }
}

/// Cancel `token` on the first interrupt signal.
///
/// The listener exits quietly once the token is cancelled by someone else.
/// Without any usable signal handler the token is left alone.
pub fn spawn_signal_listener(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            received = wait_for_signal() => {
                if received {
                    tracing::warn!("Interrupt received, finishing in-flight fetches and flushing");
                    token.cancel();
                }
            }
        }
    })
}
