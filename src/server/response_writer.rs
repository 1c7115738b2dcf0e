//! Write coordination for one connection.
//!
//! Every dispatched request writes its response through the same socket. The
//! frame is encoded into one contiguous buffer first; the lock is only held for
//! the write itself, so two responses can never interleave on the wire.

use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::error::RpcError;
use crate::server::protocol::encode_frame;

pub struct ResponseWriter<W> {
    inner: Arc<Mutex<W>>,
}

impl<W> Clone for ResponseWriter<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W> ResponseWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    /// Writes one complete response frame and flushes it. Returns the bytes written.
    pub async fn write_response(&self, request_id: u32, body: &[u8]) -> Result<usize, RpcError> {
        let frame = encode_frame(request_id, body)?;

        let mut writer = self.inner.lock().await;
        writer.write_all(&frame).await?;
        writer.flush().await?;

        Ok(frame.len())
    }

    /// Shuts down the write side. Waits for any write in progress to finish first.
    pub async fn close(&self) -> std::io::Result<()> {
        self.inner.lock().await.shutdown().await
    }
}
