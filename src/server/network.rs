//! Network Layer: TCP listener, session registry and graceful shutdown.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::RpcError;
use crate::handler::RequestHandler;
use crate::server::connection_session::{handle_connection, SessionContext, SessionOutcome};
use crate::server::stats::ServerStats;

/// Pause after an accept failure that is not about a single connection (EMFILE, ENOBUFS).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Result of a full shutdown: how many sessions finished, and which ones did not end cleanly.
#[derive(Debug, Default)]
pub struct ShutdownReport {
    pub sessions_drained: usize,
    pub errors: Vec<RpcError>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

pub struct Server<H> {
    config: ServerConfig,
    handler: Arc<H>,
    stats: Arc<ServerStats>,
    shutdown: CancellationToken,
    connection_limit: Arc<Semaphore>,
}

impl<H: RequestHandler> Server<H> {
    pub fn new(config: ServerConfig, handler: H) -> Self {
        let connection_limit = Arc::new(Semaphore::new(config.max_connections.max(1)));
        Self {
            config,
            handler: Arc::new(handler),
            stats: Arc::new(ServerStats::new()),
            shutdown: CancellationToken::new(),
            connection_limit,
        }
    }

    /// Cancelling this token is the shutdown signal. It can only ever be set once.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn stats(&self) -> Arc<ServerStats> {
        Arc::clone(&self.stats)
    }

    pub async fn bind(&self) -> std::io::Result<TcpListener> {
        TcpListener::bind(self.config.addr()).await
    }

    /// Accepts connections until shutdown, then closes the listener and waits
    /// for every session to finish. Accepted sessions never see the shutdown
    /// signal: each runs until its peer closes.
    pub async fn run(&self, listener: TcpListener) -> ShutdownReport {
        let local = listener.local_addr().ok();
        info!(address = ?local, "Server listening");

        let ctx = SessionContext::from_config(&self.config, self.stats());
        let mut sessions: JoinSet<SessionOutcome> = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,

                accepted = listener.accept() => {
                    let (socket, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(err) if is_connection_error(&err) => {
                            debug!(error = %err, "Connection failed before accept");
                            continue;
                        }
                        Err(err) => {
                            error!(error = %err, backoff = ?ACCEPT_BACKOFF, "Failed to accept connection");
                            tokio::select! {
                                _ = self.shutdown.cancelled() => {}
                                _ = tokio::time::sleep(ACCEPT_BACKOFF) => {}
                            }
                            continue;
                        }
                    };

                    let permit = match Arc::clone(&self.connection_limit).try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            self.stats.connection_refused();
                            warn!(peer = %peer, limit = self.config.max_connections, "Connection limit reached, refusing");
                            continue;
                        }
                    };

                    debug!(peer = %peer, "New connection");
                    self.stats.session_opened();

                    let handler = Arc::clone(&self.handler);
                    let ctx = ctx.clone();
                    sessions.spawn(async move {
                        let outcome = handle_connection(socket, handler, ctx.clone()).await;
                        ctx.stats.session_closed();
                        drop(permit);
                        log_outcome(peer, &outcome);
                        outcome
                    });
                }

                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(err) = joined {
                        error!(error = %err, "Session task failed");
                    }
                }
            }
        }

        // Dropping the listener closes the socket: new connection attempts are refused from here on.
        drop(listener);
        info!(sessions = sessions.len(), "Shutdown signal received, waiting for open sessions");

        let mut report = ShutdownReport::default();
        while let Some(joined) = sessions.join_next().await {
            match joined {
                Ok(_) => report.sessions_drained += 1,
                Err(err) => {
                    error!(error = %err, "Session failed while draining");
                    report.errors.push(shutdown_error(err));
                }
            }
        }

        info!(
            drained = report.sessions_drained,
            errors = report.errors.len(),
            "All sessions closed"
        );
        report
    }
}

fn log_outcome(peer: SocketAddr, outcome: &SessionOutcome) {
    if outcome.reason.drains() {
        debug!(peer = %peer, session = %outcome.id, reason = ?outcome.reason, "Connection closed");
    } else {
        warn!(peer = %peer, session = %outcome.id, reason = ?outcome.reason, "Connection abandoned");
    }
}

/// Errors that concern only the connection being accepted; the listener itself is fine.
fn is_connection_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}

fn shutdown_error(err: JoinError) -> RpcError {
    if err.is_panic() {
        RpcError::Shutdown(format!("session task {} panicked", err.id()))
    } else {
        RpcError::Shutdown(format!("session task {} was cancelled", err.id()))
    }
}
