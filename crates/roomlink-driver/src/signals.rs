//! Process signal handling for the daemon.

use tracing::info;

/// Resolves when the process is asked to stop: SIGTERM or SIGINT on
/// Unix, Ctrl-C elsewhere.
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("Received SIGINT, shutting down"),
    }
}

/// Resolves when the process is asked to stop: SIGTERM or SIGINT on
/// Unix, Ctrl-C elsewhere.
#[cfg(not(unix))]
pub async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received Ctrl+C, shutting down");
    }
}
