//! Core protocol types for Tandem's wire format.
//!
//! Every value in this module travels "on the wire": it is serialized,
//! framed, written to the socket, and rebuilt on the other side. Nothing is
//! ever shared by reference between the two peers.

use std::fmt;

use serde::{Deserialize, Serialize};

#[cfg(feature = "json")]
use crate::{Codec, JsonCodec, ProtocolError};

// ---------------------------------------------------------------------------
// InputState
// ---------------------------------------------------------------------------

/// One participant's control state for a single input tick.
///
/// The host and the client each sample their local controls at a fixed
/// cadence and send the result as [`Message::Input`]. The receiving side
/// hands the triple to whatever drives the remote participant.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
pub struct InputState {
    /// Moving left this tick.
    pub left: bool,
    /// Moving right this tick.
    pub right: bool,
    /// Jump was pressed since the previous sample.
    pub jump: bool,
}

impl InputState {
    /// Builds an input sample from a horizontal axis value.
    ///
    /// Negative means left, positive means right, zero means neither.
    pub fn from_axis(x: f32, jump: bool) -> Self {
        Self {
            left: x < 0.0,
            right: x > 0.0,
            jump,
        }
    }

    /// Returns `true` when no control is active.
    pub fn is_idle(&self) -> bool {
        !self.left && !self.right && !self.jump
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Everything one peer can say to the other.
///
/// `#[serde(tag = "type")]` produces a flat, internally tagged record:
///
/// ```text
/// {"type":"READY"}
/// {"type":"HOST_READY"}
/// {"type":"START"}
/// {"type":"INPUT","left":true,"right":false,"jump":false}
/// ```
///
/// The tag is the discriminator and only the fields of the tagged variant
/// are validated: extra fields on `READY` are ignored, while an `INPUT`
/// missing `jump` is rejected.
///
/// The `CLIENT_READY` and `START_GAME` aliases are accepted when decoding
/// so that peers using the lobby vocabulary interoperate. Encoding always
/// writes the canonical tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Client → Host: "I'm connected and waiting."
    #[serde(alias = "CLIENT_READY")]
    Ready,

    /// Host → Client: "Your connection is accepted and usable."
    HostReady,

    /// Host → Client: "Gameplay starts now."
    #[serde(alias = "START_GAME")]
    Start,

    /// Either direction, at a fixed cadence while in session.
    Input(InputState),
}

impl Message {
    /// The wire discriminator for this message.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Ready => "READY",
            Self::HostReady => "HOST_READY",
            Self::Start => "START",
            Self::Input(_) => "INPUT",
        }
    }

    /// Returns `true` for the lifecycle messages (everything but `Input`).
    pub fn is_control(&self) -> bool {
        !matches!(self, Self::Input(_))
    }

    /// Encodes this message with the default [`JsonCodec`].
    #[cfg(feature = "json")]
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        JsonCodec.encode(self)
    }

    /// Decodes a message with the default [`JsonCodec`].
    ///
    /// # Errors
    /// [`ProtocolError::MalformedMessage`] when the bytes are not a
    /// recognized, well-formed message.
    #[cfg(feature = "json")]
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        JsonCodec.decode(data)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input(input) => write!(
                f,
                "INPUT(left={}, right={}, jump={})",
                input.left, input.right, input.jump
            ),
            other => f.write_str(other.tag()),
        }
    }
}

impl From<InputState> for Message {
    fn from(input: InputState) -> Self {
        Self::Input(input)
    }
}

// =========================================================================
// Tests
// =========================================================================
