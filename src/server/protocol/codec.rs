use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::errors::ProtocolError;
use super::frame::{decode_header, encode_header, Frame, HEADER_SIZE};
use super::frame_buffer::DEFAULT_MAX_BODY_LEN;
use crate::error::RpcError;

/// `tokio_util` codec for the 12-byte framed protocol, used on the client side
/// where frames are consumed through `Framed`.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_body_len: u32,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            max_body_len: DEFAULT_MAX_BODY_LEN,
        }
    }

    pub fn with_max_body(max_body_len: u32) -> Self {
        Self { max_body_len }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = RpcError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let (request_id, body_len) = decode_header(src)?;
        if body_len > self.max_body_len {
            return Err(ProtocolError::BodyTooLarge {
                len: u64::from(body_len),
                max: self.max_body_len,
            }
            .into());
        }

        let total_len = HEADER_SIZE + body_len as usize;
        if src.len() < total_len {
            src.reserve(total_len - src.len());
            return Ok(None);
        }

        let frame_bytes = src.split_to(total_len).freeze();
        let body = frame_bytes.slice(HEADER_SIZE..);

        Ok(Some(Frame { request_id, body }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = RpcError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body_len = u32::try_from(item.body.len()).map_err(|_| ProtocolError::BodyTooLarge {
            len: item.body.len() as u64,
            max: u32::MAX,
        })?;

        dst.reserve(HEADER_SIZE + item.body.len());
        dst.put_slice(&encode_header(item.request_id, body_len));
        dst.extend_from_slice(&item.body);

        Ok(())
    }
}
