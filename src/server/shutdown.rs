//! OS signal wiring for graceful shutdown.
//!
//! SIGINT (and SIGTERM on unix) cancel the server's shutdown token. The token
//! is the process-wide shutdown flag: the listener stops accepting and the
//! server waits for every accepted session to run to completion.

use tokio_util::sync::CancellationToken;

/// Resolves when the process receives an interrupt or termination signal.
#[cfg(unix)]
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.map(|_| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|_| "ctrl-c")
}

/// Spawns a task that cancels `token` on the first termination signal.
pub fn listen_for_signals(token: CancellationToken) {
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(signal) => {
                tracing::info!(signal, "Termination signal received");
                token.cancel();
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install signal handler, shutdown only via token");
            }
        }
    });
}
