//! Error types for the session layer.

use tandem_transport::TransportError;

use crate::SessionPhase;

/// Errors returned by user-initiated session operations.
///
/// Failures noticed by the background tasks never show up here; they
/// close the session and reach the UI through
/// [`UiNotifier::on_session_closed`](crate::UiNotifier::on_session_closed).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The operation isn't allowed in the current phase. Nothing changed.
    #[error("cannot {operation} while {phase}")]
    InvalidPhase {
        operation: &'static str,
        phase: SessionPhase,
    },

    /// Only the host may start the game.
    #[error("only the host can start the session")]
    NotHost,

    /// The session has been closed. Build a new one with
    /// [`Session::renew`](crate::Session::renew).
    #[error("session is closed")]
    Closed,

    /// The transport failed (bind, connect, or send).
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_phase_message_names_operation_and_phase() {
        let err = SessionError::InvalidPhase {
            operation: "start the session",
            phase: SessionPhase::Listening,
        };
        assert_eq!(err.to_string(), "cannot start the session while Listening");
    }

    #[test]
    fn test_transport_error_is_transparent() {
        let err = SessionError::from(TransportError::NotConnected);
        assert_eq!(err.to_string(), "not connected");
    }
}
