use std::time::Duration;

use tandem_protocol::ProtocolError;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Binding the listening socket failed (port in use, permission).
    #[error("bind failed: {0}")]
    Bind(#[source] std::io::Error),

    /// The outbound connection was not established in time.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// The remote host actively refused the connection.
    #[error("connection refused: {0}")]
    ConnectRefused(#[source] std::io::Error),

    /// Any other outbound connection failure (unreachable, bad address).
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    /// `send` was called with no live connection.
    #[error("not connected")]
    NotConnected,

    /// Writing to the connection failed or timed out.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// The peer closed the connection or a read failed.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// A message could not be encoded or framed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,
}
