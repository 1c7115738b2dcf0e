//! Stateful reassembly of frames from an unbounded byte stream.
//!
//! TCP has no message boundaries: one read may carry half a header, a slice of a
//! body, or several frames back to back. `FrameBuffer` accumulates whatever
//! arrives and hands out complete frames in the order they were written:
//! - `AwaitingHeader`: fewer than 12 unparsed bytes
//! - `AwaitingBody`: header parsed, waiting for `body_len` bytes
//! - `Corrupt`: a bad header was seen; terminal, nothing is ever produced again
//!
//! ```ignore
//! let mut buffer = FrameBuffer::new();
//! for chunk in socket_reads {
//!     for frame in buffer.feed(&chunk)? {
//!         dispatch(frame);
//!     }
//! }
//! ```

use bytes::{Buf, BytesMut};

use super::errors::ProtocolError;
use super::frame::{decode_header, Frame, HEADER_SIZE};

/// Default ceiling for a single body. The wire allows up to `u32::MAX`.
pub const DEFAULT_MAX_BODY_LEN: u32 = 16 * 1024 * 1024;

const DEFAULT_CAPACITY: usize = 4 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    AwaitingHeader,
    AwaitingBody { request_id: u32, body_len: usize },
    Corrupt(ProtocolError),
}

pub struct FrameBuffer {
    buffer: BytesMut,
    state: State,
    max_body_len: u32,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::with_max_body(DEFAULT_MAX_BODY_LEN)
    }

    pub fn with_max_body(max_body_len: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(DEFAULT_CAPACITY),
            state: State::AwaitingHeader,
            max_body_len,
        }
    }

    /// Appends `chunk` and returns every frame that became complete, in stream order.
    ///
    /// Partial header or body bytes stay buffered for the next call. An empty
    /// chunk only drains what is already buffered. Once a bad header has been
    /// seen the buffer is corrupt and every call fails with the same error.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Frame>, ProtocolError> {
        if let State::Corrupt(err) = &self.state {
            return Err(err.clone());
        }

        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    fn try_extract_one(&mut self) -> Result<Option<Frame>, ProtocolError> {
        loop {
            match &self.state {
                State::AwaitingHeader => {
                    if self.buffer.len() < HEADER_SIZE {
                        return Ok(None);
                    }

                    let (request_id, body_len) = match decode_header(&self.buffer) {
                        Ok(header) => header,
                        Err(err) => return Err(self.corrupt(err)),
                    };

                    if body_len > self.max_body_len {
                        return Err(self.corrupt(ProtocolError::BodyTooLarge {
                            len: u64::from(body_len),
                            max: self.max_body_len,
                        }));
                    }

                    self.buffer.advance(HEADER_SIZE);
                    self.state = State::AwaitingBody {
                        request_id,
                        body_len: body_len as usize,
                    };
                }

                State::AwaitingBody {
                    request_id,
                    body_len,
                } => {
                    let (request_id, body_len) = (*request_id, *body_len);

                    if self.buffer.len() < body_len {
                        self.buffer.reserve(body_len - self.buffer.len());
                        return Ok(None);
                    }

                    let body = self.buffer.split_to(body_len).freeze();
                    self.state = State::AwaitingHeader;
                    return Ok(Some(Frame { request_id, body }));
                }

                State::Corrupt(err) => return Err(err.clone()),
            }
        }
    }

    fn corrupt(&mut self, err: ProtocolError) -> ProtocolError {
        self.buffer.clear();
        self.state = State::Corrupt(err.clone());
        err
    }

    /// Bytes buffered but not yet returned as part of a frame.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self.state, State::Corrupt(_))
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::AwaitingHeader => "AwaitingHeader",
            State::AwaitingBody { .. } => "AwaitingBody",
            State::Corrupt(_) => "Corrupt",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
