//! Connection Session Layer: lifecycle of a single client connection.
//! Owns the read loop, the reassembly buffer and the set of in-flight requests.
//!
//! AcceptingBytes -> Draining -> Closed
//!
//! - EOF with requests still running: stop reading, wait for every one of them,
//!   then close. Pipelined requests are never dropped because the client already
//!   closed its write side.
//! - Protocol error or a dead socket: close immediately, abandon pending work.
//!
//! Server shutdown is not observed here. An accepted session keeps reading and
//! answering until its peer closes; only the accept loop stops.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::handler::RequestHandler;
use crate::server::dispatcher::{dispatch, settle, Settled, TaskOutput};
use crate::server::protocol::{FrameBuffer, ProtocolError};
use crate::server::response_writer::ResponseWriter;
use crate::server::stats::ServerStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AcceptingBytes,
    Draining,
    Closed,
}

#[derive(Debug)]
pub enum CloseReason {
    /// Zero-length read: the peer will send nothing more.
    PeerClosed,
    Protocol(ProtocolError),
    Transport(std::io::Error),
}

impl CloseReason {
    /// Whether pending requests were allowed to finish before the close.
    pub fn drains(&self) -> bool {
        matches!(self, CloseReason::PeerClosed)
    }
}

#[derive(Debug)]
pub struct SessionOutcome {
    pub id: Uuid,
    pub reason: CloseReason,
    /// Every state the session went through, ending in `Closed`.
    pub path: Vec<SessionState>,
    /// True when the session passed through `Draining` with requests still running.
    pub drained: bool,
    pub frames: u64,
    pub responses: u64,
    pub failures: u64,
}

/// Per-session knobs plus the handles shared with the rest of the server.
#[derive(Clone)]
pub struct SessionContext {
    pub stats: Arc<ServerStats>,
    pub read_buffer_size: usize,
    pub max_body_len: u32,
}

impl SessionContext {
    pub fn from_config(config: &ServerConfig, stats: Arc<ServerStats>) -> Self {
        Self {
            stats,
            read_buffer_size: config.read_buffer_size.max(1),
            max_body_len: config.max_body_len,
        }
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default(), Arc::new(ServerStats::new()))
    }
}

pub struct ConnectionSession<R, W, H> {
    id: Uuid,
    reader: R,
    writer: ResponseWriter<W>,
    buffer: FrameBuffer,
    tasks: JoinSet<TaskOutput>,
    handler: Arc<H>,
    ctx: SessionContext,
    path: Vec<SessionState>,
    frames: u64,
    responses: u64,
    failures: u64,
}

impl<R, W, H> ConnectionSession<R, W, H>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
    H: RequestHandler,
{
    pub fn new(reader: R, writer: W, handler: Arc<H>, ctx: SessionContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            reader,
            writer: ResponseWriter::new(writer),
            buffer: FrameBuffer::with_max_body(ctx.max_body_len),
            tasks: JoinSet::new(),
            handler,
            ctx,
            path: vec![SessionState::AcceptingBytes],
            frames: 0,
            responses: 0,
            failures: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    fn enter(&mut self, state: SessionState) {
        self.path.push(state);
    }

    /// Runs the session to `Closed`. Never fails: every error is folded into the outcome.
    pub async fn run(mut self) -> SessionOutcome {
        let mut chunk = vec![0u8; self.ctx.read_buffer_size];

        let reason = loop {
            tokio::select! {
                read = self.reader.read(&mut chunk) => {
                    let n = match read {
                        Ok(0) => break CloseReason::PeerClosed,
                        Ok(n) => n,
                        Err(err) => {
                            self.ctx.stats.transport_error();
                            return self.abandon(CloseReason::Transport(err)).await;
                        }
                    };

                    let frames = match self.buffer.feed(&chunk[..n]) {
                        Ok(frames) => frames,
                        Err(err) => {
                            self.ctx.stats.protocol_error();
                            return self.abandon(CloseReason::Protocol(err)).await;
                        }
                    };

                    self.frames += frames.len() as u64;
                    self.ctx.stats.frames_decoded(frames.len());
                    for frame in frames {
                        tracing::trace!(session = %self.id, request_id = frame.request_id, len = frame.body.len(), "Dispatching request");
                        dispatch(&mut self.tasks, frame, &self.handler, &self.writer);
                    }
                }

                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    if let Some(err) = self.record(settle(&self.id, joined, &self.ctx.stats)) {
                        return self.abandon(CloseReason::Transport(err)).await;
                    }
                }
            }
        };

        if !self.buffer.is_empty() {
            tracing::debug!(session = %self.id, leftover = self.buffer.len(), "Discarding incomplete frame");
        }

        let drained = !self.tasks.is_empty();
        if drained {
            self.enter(SessionState::Draining);
            tracing::debug!(session = %self.id, pending = self.tasks.len(), reason = ?reason, "Draining pending requests");
        }

        while let Some(joined) = self.tasks.join_next().await {
            if let Some(err) = self.record(settle(&self.id, joined, &self.ctx.stats)) {
                return self.abandon(CloseReason::Transport(err)).await;
            }
        }

        self.close(reason, drained).await
    }

    /// Returns the I/O error when the task lost the socket.
    fn record(&mut self, settled: Settled) -> Option<std::io::Error> {
        match settled {
            Settled::Responded(_) => {
                self.responses += 1;
                None
            }
            Settled::Failed => {
                self.failures += 1;
                None
            }
            Settled::TransportLost(err) => {
                self.failures += 1;
                Some(err)
            }
        }
    }

    /// Unrecoverable stream: stop pending requests and close without writing anything else.
    async fn abandon(mut self, reason: CloseReason) -> SessionOutcome {
        let aborted = self.tasks.len();
        self.tasks.shutdown().await;
        tracing::warn!(session = %self.id, aborted, reason = ?reason, "Abandoning connection");
        self.close(reason, false).await
    }

    async fn close(mut self, reason: CloseReason, drained: bool) -> SessionOutcome {
        self.enter(SessionState::Closed);
        if let Err(err) = self.writer.close().await {
            tracing::debug!(session = %self.id, error = %err, "Error while closing transport");
        }

        tracing::debug!(
            session = %self.id,
            frames = self.frames,
            responses = self.responses,
            failures = self.failures,
            "Session closed"
        );

        SessionOutcome {
            id: self.id,
            reason,
            path: self.path,
            drained,
            frames: self.frames,
            responses: self.responses,
            failures: self.failures,
        }
    }
}

/// Runs a session over an accepted TCP connection.
pub async fn handle_connection<H: RequestHandler>(
    socket: TcpStream,
    handler: Arc<H>,
    ctx: SessionContext,
) -> SessionOutcome {
    if let Err(err) = socket.set_nodelay(true) {
        tracing::debug!(error = %err, "Failed to set TCP_NODELAY");
    }
    let (reader, writer) = socket.into_split();
    ConnectionSession::new(reader, writer, handler, ctx).run().await
}
