//! OS termination signal handling.
//!
//! On Unix the orchestrator reacts to `SIGINT` (Ctrl-C) and `SIGTERM`
//! (systemd/Kubernetes default); elsewhere only Ctrl-C is available.

/// Completes when the process receives a termination signal.
///
/// Each call creates independent signal listeners. Returns `Err` only if
/// signal registration fails.
#[cfg(unix)]
pub(crate) async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
    }
    Ok(())
}

/// Completes when the process receives Ctrl-C.
#[cfg(not(unix))]
pub(crate) async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
