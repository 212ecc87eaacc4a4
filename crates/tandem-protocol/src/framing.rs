//! Length-prefixed framing for a byte stream.
//!
//! TCP delivers a stream, not messages: one `read` may return half a
//! message, or the tail of one message glued to the head of the next. So
//! every payload is written as
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────┐
//! │ len: u32 big-endian  │ payload (len bytes)      │
//! └──────────────────────┴──────────────────────────┘
//! ```
//!
//! and the receiver accumulates bytes in a [`FrameDecoder`] until a whole
//! frame is available. Framing is format-agnostic: payloads are whatever
//! the [`Codec`](crate::Codec) produced.

use crate::ProtocolError;

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Largest payload accepted in either direction (64 KiB).
///
/// Tandem's messages are a few dozen bytes. The cap exists so that a
/// corrupted or hostile length prefix can't make the receiver allocate
/// gigabytes.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Prefixes `payload` with its length.
///
/// # Errors
/// [`ProtocolError::FrameTooLarge`] if the payload exceeds [`MAX_FRAME_SIZE`].
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let len = payload.len();
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            len,
            max: MAX_FRAME_SIZE,
        });
    }
    let mut frame = Vec::with_capacity(LENGTH_PREFIX_LEN + len);
    // `len <= MAX_FRAME_SIZE` fits comfortably in a u32.
    frame.extend_from_slice(&(len as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Reassembles frames from arbitrarily split stream reads.
///
/// Feed every chunk the socket returns into [`extend`](Self::extend), then
/// call [`next_frame`](Self::next_frame) until it returns `Ok(None)`.
/// Frames come out in the order their bytes went in.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends bytes received from the stream.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pops the next complete payload, if one is buffered.
    ///
    /// Returns `Ok(None)` while the buffered bytes are still a partial
    /// frame.
    ///
    /// # Errors
    /// [`ProtocolError::FrameTooLarge`] when the length prefix exceeds
    /// [`MAX_FRAME_SIZE`]. The stream cannot be resynchronized after that;
    /// the caller should drop the connection.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, ProtocolError> {
        let Some(prefix) = self.buf.first_chunk::<LENGTH_PREFIX_LEN>() else {
            return Ok(None);
        };
        let len = u32::from_be_bytes(*prefix) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                len,
                max: MAX_FRAME_SIZE,
            });
        }

        let end = LENGTH_PREFIX_LEN + len;
        if self.buf.len() < end {
            return Ok(None);
        }

        let payload = self.buf[LENGTH_PREFIX_LEN..end].to_vec();
        self.buf.drain(..end);
        Ok(Some(payload))
    }

    /// Number of bytes waiting for the rest of their frame.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }
}
