//! Two-participant session state machine for Tandem.
//!
//! This crate turns the raw transport into a game session:
//!
//! 1. **Lobby**: one side hosts ([`Session::create_session`]), the other
//!    joins ([`Session::join_session`]), and both greet each other.
//! 2. **Start**: the host alone decides when gameplay begins
//!    ([`Session::start_session`]).
//! 3. **Gameplay**: each side streams its input at a fixed cadence and
//!    applies the other's.
//! 4. **Teardown**: either side leaving, or the connection failing,
//!    closes the session exactly once.
//!
//! # How it fits in the stack
//!
//! ```text
//! Game (above)         ← implements the collaborator traits, calls pump()
//!     ↕
//! Session (this crate) ← phases, roles, cadence
//!     ↕
//! Transport (below)    ← TCP, background tasks, TransportEvents
//! ```
//!
//! Everything runs on the thread that owns the [`Session`]; background
//! results arrive only through [`Session::pump`].

mod collaborators;
mod config;
mod error;
mod phase;
mod session;
mod state;

#[cfg(test)]
mod testing;

pub use collaborators::{
    Collaborators, Detached, InputSource, RemoteInputSink, SceneTrigger, UiNotifier,
};
pub use config::{SessionConfig, DEFAULT_PORT};
pub use error::SessionError;
pub use phase::{CloseReason, Role, SessionPhase};
pub use session::Session;
