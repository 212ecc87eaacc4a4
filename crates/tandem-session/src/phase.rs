//! Session phases, participant roles and close reasons.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SessionPhase
// ---------------------------------------------------------------------------

/// The lifecycle phase of a session.
///
/// ```text
///         ┌──create_session──→ Listening ──PeerConnected──┐
///         │                                               ▼
///  Idle ──┼──join_session───→ Connecting ──────────────→ Connected
///   ▲     │                       │                       │
///   │     │                       └──connect failed──→ Idle
///   │     │                                               ▼ READY / HOST_READY
///   │     └──start_offline─────────────────────┐      PeerReady
///   │                                          ▼          │ START
///   │                                      InSession ◄────┘
///   │
///   └── (a new Session; Closed is terminal)
/// ```
///
/// Every phase except `Closed` can move to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionPhase {
    /// Nothing started yet.
    Idle,
    /// Host: bound and waiting for a peer.
    Listening,
    /// Client: outbound connection in progress.
    Connecting,
    /// The TCP connection is up; greetings not yet exchanged.
    Connected,
    /// Both sides have greeted each other. The host may start.
    PeerReady,
    /// Gameplay: inputs flow both ways.
    InSession,
    /// Torn down. Terminal.
    Closed,
}

impl SessionPhase {
    /// Returns `true` if moving from `self` to `target` is a legal edge.
    pub fn can_transition_to(self, target: Self) -> bool {
        use SessionPhase::*;
        match (self, target) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Idle, Listening | Connecting | InSession) => true,
            (Connecting, Connected | Idle) => true,
            (Listening, Connected) => true,
            (Connected, PeerReady) => true,
            (PeerReady, InSession) => true,
            _ => false,
        }
    }

    /// Returns `true` while a connection is (or is about to be) in use.
    pub fn is_networked(self) -> bool {
        matches!(
            self,
            Self::Listening | Self::Connecting | Self::Connected | Self::PeerReady | Self::InSession
        )
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Listening => write!(f, "Listening"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::PeerReady => write!(f, "PeerReady"),
            Self::InSession => write!(f, "InSession"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Which side of the session this process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Listens, and is the only side allowed to start the game.
    Host,
    /// Connects to a host.
    Client,
    /// Local play with no network at all.
    Offline,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "Host"),
            Self::Client => write!(f, "Client"),
            Self::Offline => write!(f, "Offline"),
        }
    }
}

// ---------------------------------------------------------------------------
// CloseReason
// ---------------------------------------------------------------------------

/// Why a session reached [`SessionPhase::Closed`].
///
/// `Display` is a sentence suitable for a status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// `leave_session` was called.
    LocalLeave,
    /// The peer hung up or the connection failed while reading.
    ConnectionLost(String),
    /// The listener failed before a peer arrived.
    AcceptFailed(String),
    /// Writing to the peer failed.
    SendFailed(String),
}

impl CloseReason {
    /// `true` for every reason except a local leave.
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::LocalLeave)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalLeave => write!(f, "Left the session"),
            Self::ConnectionLost(reason) => write!(f, "Connection lost: {reason}"),
            Self::AcceptFailed(reason) => write!(f, "Hosting failed: {reason}"),
            Self::SendFailed(reason) => write!(f, "Could not reach the other player: {reason}"),
        }
    }
}
