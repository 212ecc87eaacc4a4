//! Error types for the protocol layer.
//!
//! Each crate in Tandem defines its own error enum. When you see a
//! `ProtocolError`, the problem is in encoding, decoding, or framing,
//! never in the socket itself or in the session state machine.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a message into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The bytes do not describe a recognized message.
    ///
    /// Covers invalid JSON, an unknown or missing `type` tag, and an
    /// `INPUT` payload missing one of its three booleans. This is a
    /// recoverable error: the receive loop reports it and keeps reading.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// A frame's length prefix exceeds [`MAX_FRAME_SIZE`](crate::MAX_FRAME_SIZE).
    ///
    /// Unlike a malformed payload, this one is not recoverable: once the
    /// length prefix is wrong the stream can no longer be split into
    /// frames.
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },
}
