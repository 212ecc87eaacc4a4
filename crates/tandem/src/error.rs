//! Unified error type for Tandem.

use std::path::PathBuf;

use tandem_protocol::ProtocolError;
use tandem_session::SessionError;
use tandem_transport::TransportError;

/// Top-level error that wraps every crate-specific error.
///
/// The `#[from]` variants let `?` convert sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum TandemError {
    /// A transport-level error (bind, connect, send).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, framing).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (wrong phase, not host, closed).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A config file could not be read.
    #[error("cannot read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A config file is not valid JSON for [`SessionConfig`](tandem_session::SessionConfig).
    #[error("invalid config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
