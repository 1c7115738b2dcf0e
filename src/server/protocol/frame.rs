//! rpcframe Binary Protocol: Frame Layout and Constants
//!
//! Frame (Total Header: 12 bytes):
//! [Magic: 4 bytes (BE)] [RequestID: 4 bytes (BE)] [BodyLen: 4 bytes (BE)]
//! Body: [opaque bytes...]
//!
//! Responses use the same layout and echo the request id of the triggering request.

use bytes::{BufMut, Bytes, BytesMut};
use bytemuck::{Pod, Zeroable};

use super::errors::ProtocolError;

// ========================================
// CONSTANTS
// ========================================

/// "MYRC" in ASCII. Any other value makes the stream unparseable.
pub const MAGIC_NUMBER: u32 = 0x4D59_5243;

pub const HEADER_SIZE: usize = FrameHeader::SIZE;

// ========================================
// FRAME HEADER
// ========================================

/// Fixed-size Header: [Magic: 4] [RequestID: 4] [BodyLen: 4]
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct FrameHeader {
    pub magic: [u8; 4],
    pub request_id: [u8; 4], // [u8; 4] keeps alignment at 1 so bytemuck can read unaligned slices
    pub body_len: [u8; 4],
}

impl FrameHeader {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(request_id: u32, body_len: u32) -> Self {
        Self {
            magic: MAGIC_NUMBER.to_be_bytes(),
            request_id: request_id.to_be_bytes(),
            body_len: body_len.to_be_bytes(),
        }
    }

    /// Reads the header prefix of `buf` and validates the magic number.
    /// Bytes past the first `SIZE` are ignored.
    pub fn parse(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < Self::SIZE {
            return Err(ProtocolError::BufferTooSmall {
                needed: Self::SIZE,
                got: buf.len(),
            });
        }

        let header: Self = bytemuck::pod_read_unaligned(&buf[..Self::SIZE]);
        if header.magic() != MAGIC_NUMBER {
            return Err(ProtocolError::InvalidMagic(header.magic()));
        }
        Ok(header)
    }

    pub fn magic(&self) -> u32 {
        u32::from_be_bytes(self.magic)
    }

    pub fn request_id(&self) -> u32 {
        u32::from_be_bytes(self.request_id)
    }

    pub fn body_len(&self) -> u32 {
        u32::from_be_bytes(self.body_len)
    }
}

// ========================================
// FRAME
// ========================================

/// One complete protocol message. The body is a zero-copy slice of the read buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub request_id: u32,
    pub body: Bytes,
}

impl Frame {
    pub fn new(request_id: u32, body: impl Into<Bytes>) -> Self {
        Self {
            request_id,
            body: body.into(),
        }
    }
}

// ========================================
// HEADER CODEC
// ========================================

pub fn encode_header(request_id: u32, body_length: u32) -> [u8; HEADER_SIZE] {
    bytemuck::cast(FrameHeader::new(request_id, body_length))
}

/// Returns `(request_id, body_length)` from the first 12 bytes of `buf`.
pub fn decode_header(buf: &[u8]) -> Result<(u32, u32), ProtocolError> {
    let header = FrameHeader::parse(buf)?;
    Ok((header.request_id(), header.body_len()))
}

/// Header + body in one contiguous buffer, ready for a single `write_all`.
pub fn encode_frame(request_id: u32, body: &[u8]) -> Result<Bytes, ProtocolError> {
    let body_len = u32::try_from(body.len()).map_err(|_| ProtocolError::BodyTooLarge {
        len: body.len() as u64,
        max: u32::MAX,
    })?;

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + body.len());
    buf.put_slice(&encode_header(request_id, body_len));
    buf.put_slice(body);
    Ok(buf.freeze())
}
