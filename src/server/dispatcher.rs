//! Dispatcher: one independent task per decoded frame.
//!
//! The read loop never waits on a dispatched request, so a slow request cannot
//! hold back faster ones that arrive after it on the same connection.

use std::sync::Arc;

use tokio::io::AsyncWrite;
use tokio::task::{JoinError, JoinSet};

use crate::error::RpcError;
use crate::handler::RequestHandler;
use crate::server::protocol::Frame;
use crate::server::response_writer::ResponseWriter;
use crate::server::stats::ServerStats;

/// A request that produced no response.
#[derive(Debug)]
pub struct TaskFailure {
    pub request_id: u32,
    pub error: RpcError,
}

/// Output of a dispatched request: the id it answered, or why it did not.
pub type TaskOutput = Result<u32, TaskFailure>;

/// What the owning session should do with a finished task.
#[derive(Debug)]
pub enum Settled {
    Responded(u32),
    Failed,
    /// The socket is gone; the session has to be abandoned.
    TransportLost(std::io::Error),
}

/// Spawns the handler + response write for `frame` into the session's pending set.
pub fn dispatch<H, W>(
    tasks: &mut JoinSet<TaskOutput>,
    frame: Frame,
    handler: &Arc<H>,
    writer: &ResponseWriter<W>,
)
where
    H: RequestHandler,
    W: AsyncWrite + Unpin + Send + 'static,
{
    tasks.spawn(process(Arc::clone(handler), writer.clone(), frame));
}

async fn process<H, W>(handler: Arc<H>, writer: ResponseWriter<W>, frame: Frame) -> TaskOutput
where
    H: RequestHandler,
    W: AsyncWrite + Unpin + Send,
{
    let Frame { request_id, body } = frame;

    let response = handler
        .handle(request_id, body)
        .await
        .map_err(|e| TaskFailure {
            request_id,
            error: e.into(),
        })?;

    writer
        .write_response(request_id, &response)
        .await
        .map_err(|error| TaskFailure { request_id, error })?;

    Ok(request_id)
}

/// Logs and classifies a finished task. Handler errors and panics stay local to
/// their request; only a lost socket escalates to the session.
pub fn settle(
    session: &uuid::Uuid,
    joined: Result<TaskOutput, JoinError>,
    stats: &ServerStats,
) -> Settled {
    match joined {
        Ok(Ok(request_id)) => {
            stats.response_written();
            tracing::trace!(session = %session, request_id, "Response written");
            Settled::Responded(request_id)
        }
        Ok(Err(TaskFailure {
            request_id,
            error: RpcError::Transport(err),
        })) => {
            stats.transport_error();
            tracing::debug!(session = %session, request_id, error = %err, "Response write failed");
            Settled::TransportLost(err)
        }
        Ok(Err(TaskFailure { request_id, error })) => {
            stats.handler_failure();
            tracing::warn!(session = %session, request_id, error = %error, "Request failed, no response sent");
            Settled::Failed
        }
        Err(err) => {
            stats.handler_failure();
            if err.is_panic() {
                tracing::error!(session = %session, task = %err.id(), "Request task panicked");
            }
            Settled::Failed
        }
    }
}
