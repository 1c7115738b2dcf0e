use thiserror::Error;

/// The byte stream can no longer be interpreted. Fatal to the connection only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("buffer too small: need {needed} bytes, got {got}")]
    BufferTooSmall { needed: usize, got: usize },

    #[error("invalid magic number: 0x{0:08X}")]
    InvalidMagic(u32),

    #[error("body too large: {len} bytes exceeds limit of {max}")]
    BodyTooLarge { len: u64, max: u32 },
}
