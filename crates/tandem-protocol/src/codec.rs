//! Codec trait and implementations for serializing/deserializing messages.
//!
//! A "codec" (coder/decoder) converts between Rust types and raw bytes.
//! The rest of Tandem doesn't care HOW messages are serialized; it only
//! needs something that implements [`Codec`].
//!
//! We ship [`JsonCodec`] because the wire format is a flat JSON record
//! with a string `type` discriminator. That keeps frames readable in a
//! packet capture and compatible with peers that speak the same record
//! shape.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because the codec is used from the transport's
/// background tasks, which may run on any runtime worker thread.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::MalformedMessage` if the bytes are
    /// malformed, incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// Behind the `json` feature flag (enabled by default).
///
/// ## Example
///
/// ```rust
/// use tandem_protocol::{Codec, InputState, JsonCodec, Message};
///
/// let codec = JsonCodec;
/// let msg = Message::Input(InputState { left: true, right: false, jump: false });
///
/// let bytes = codec.encode(&msg).unwrap();
/// let decoded: Message = codec.decode(&bytes).unwrap();
/// assert_eq!(msg, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        // The serde_json message ("unknown variant `FLY`", "missing field
        // `jump`", ...) is kept as the error text: it is what ends up in
        // the log line when a peer sends something we don't understand.
        serde_json::from_slice(data)
            .map_err(|e| ProtocolError::MalformedMessage(e.to_string()))
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::Message;

    #[test]
    fn test_json_codec_decode_garbage_returns_malformed() {
        let result: Result<Message, _> = JsonCodec.decode(b"\x00\xff not json");
        assert!(matches!(result, Err(ProtocolError::MalformedMessage(_))));
    }

    #[test]
    fn test_json_codec_encode_produces_utf8_json() {
        let bytes = JsonCodec.encode(&Message::Start).unwrap();
        assert_eq!(std::str::from_utf8(&bytes).unwrap(), r#"{"type":"START"}"#);
    }
}
