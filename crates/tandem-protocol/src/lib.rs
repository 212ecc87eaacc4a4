//! Wire protocol for Tandem.
//!
//! This crate defines what two peers say to each other over their single
//! TCP connection:
//!
//! - **Types** ([`Message`], [`InputState`]): the four messages that
//!   travel on the wire (readiness, host readiness, session start, and the
//!   per-tick input stream).
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how a message is turned
//!   into bytes and back.
//! - **Framing** ([`encode_frame`], [`FrameDecoder`]): how those bytes are
//!   delimited on a stream so that TCP segmentation can't merge or split
//!   messages.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! ```text
//! Transport (stream bytes) → Framing (payloads) → Codec (Message) → Session
//! ```
//!
//! The protocol layer knows nothing about sockets or session phases.

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod error;
mod framing;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use framing::{encode_frame, FrameDecoder, LENGTH_PREFIX_LEN, MAX_FRAME_SIZE};
pub use types::{InputState, Message};
