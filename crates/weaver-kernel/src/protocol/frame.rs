//! Wire framing for the legacy protocol.
//!
//! ```text
//! 0       4       8
//! +-------+-------+----------------------+
//! | type  | len   | payload (len bytes)  |
//! +-------+-------+----------------------+
//! ```
//!
//! Both header fields are little-endian `u32`. Responses use the same layout.

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

pub const HEADER_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("payload of {length} bytes exceeds limit of {max} bytes")]
    PayloadTooLarge { length: usize, max: usize },
}

/// One framed unit. Payload bytes are decoded as UTF-8 lossily.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub message_type: u32,
    pub payload: String,
}

impl Frame {
    pub fn new(message_type: u32, payload: impl Into<String>) -> Self {
        Self {
            message_type,
            payload: payload.into(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LegacyCodec {
    max_payload: usize,
}

impl LegacyCodec {
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload }
    }
}

impl Default for LegacyCodec {
    fn default() -> Self {
        Self::new(1024 * 1024)
    }
}

impl Decoder for LegacyCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        if src.len() < HEADER_LEN {
            src.reserve(HEADER_LEN - src.len());
            return Ok(None);
        }

        let mut header = &src[..HEADER_LEN];
        let message_type = header.get_u32_le();
        let length = header.get_u32_le() as usize;

        // 宣言された長さを確保する前に上限を確認
        if length > self.max_payload {
            return Err(FrameError::PayloadTooLarge {
                length,
                max: self.max_payload,
            });
        }

        if src.len() < HEADER_LEN + length {
            src.reserve(HEADER_LEN + length - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(length);
        Ok(Some(Frame {
            message_type,
            payload: String::from_utf8_lossy(&payload).into_owned(),
        }))
    }
}

impl Encoder<Frame> for LegacyCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        let payload = frame.payload.as_bytes();
        let length = u32::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
            length: payload.len(),
            max: u32::MAX as usize,
        })?;

        dst.reserve(HEADER_LEN + payload.len());
        dst.put_u32_le(frame.message_type);
        dst.put_u32_le(length);
        dst.extend_from_slice(payload);
        Ok(())
    }
}
