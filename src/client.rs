//! Pipelining client.
//!
//! Any number of calls can be in flight on one connection. Each call gets its
//! own request id and waits on a oneshot that the reader task completes when
//! the matching response arrives, in whatever order the server answers.
//!
//! ```text
//! call(1) ─┐                                  ┌─► oneshot(1)
//! call(2) ─┼─► Mutex<sink> ─► socket ─► reader ┼─► oneshot(2)
//! call(N) ─┘                                  └─► oneshot(N)
//! ```

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::stream::{SplitSink, StreamExt};
use futures_util::SinkExt;
use thiserror::Error;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

use crate::error::RpcError;
use crate::server::protocol::{Frame, FrameCodec};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("request id {0} is already in flight")]
    DuplicateRequestId(u32),

    /// The connection closed before a response for this call arrived.
    #[error("connection closed")]
    Closed,
}

type FrameSink = SplitSink<Framed<TcpStream, FrameCodec>, Frame>;
type PendingCalls = DashMap<u32, oneshot::Sender<Bytes>>;

pub struct RpcClient {
    sink: Mutex<FrameSink>,
    pending: Arc<PendingCalls>,
    closed: Arc<AtomicBool>,
    next_id: AtomicU32,
    reader: JoinHandle<()>,
}

impl RpcClient {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let socket = TcpStream::connect(addr).await?;
        socket.set_nodelay(true)?;
        let (sink, mut stream) = Framed::new(socket, FrameCodec::new()).split();

        let pending: Arc<PendingCalls> = Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));

        let reader = {
            let pending = Arc::clone(&pending);
            let closed = Arc::clone(&closed);
            tokio::spawn(async move {
                while let Some(item) = stream.next().await {
                    match item {
                        Ok(frame) => match pending.remove(&frame.request_id) {
                            Some((_, reply)) => {
                                let _ = reply.send(frame.body);
                            }
                            None => {
                                tracing::warn!(request_id = frame.request_id, "Response for unknown request");
                            }
                        },
                        Err(err) => {
                            tracing::warn!(error = %err, "Client connection failed");
                            break;
                        }
                    }
                }

                // Flag first: a call registering after the clear must see it.
                closed.store(true, Ordering::SeqCst);
                pending.clear();
            })
        };

        Ok(Self {
            sink: Mutex::new(sink),
            pending,
            closed,
            next_id: AtomicU32::new(1),
            reader,
        })
    }

    /// Sends `body` under a fresh request id and waits for its response.
    pub async fn call(&self, body: impl Into<Bytes>) -> Result<Bytes, ClientError> {
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.call_with_id(request_id, body).await
    }

    pub async fn call_with_id(
        &self,
        request_id: u32,
        body: impl Into<Bytes>,
    ) -> Result<Bytes, ClientError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        match self.pending.entry(request_id) {
            Entry::Occupied(_) => return Err(ClientError::DuplicateRequestId(request_id)),
            Entry::Vacant(slot) => {
                slot.insert(reply_tx);
            }
        }

        if self.closed.load(Ordering::SeqCst) {
            self.pending.remove(&request_id);
            return Err(ClientError::Closed);
        }

        let sent = self
            .sink
            .lock()
            .await
            .send(Frame::new(request_id, body))
            .await;
        if let Err(err) = sent {
            self.pending.remove(&request_id);
            return Err(err.into());
        }

        reply_rx.await.map_err(|_| ClientError::Closed)
    }

    /// Closes the write side. Calls already sent still receive their responses.
    pub async fn finish(&self) -> Result<(), ClientError> {
        self.sink.lock().await.close().await?;
        Ok(())
    }

    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
