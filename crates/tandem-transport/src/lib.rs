//! Single-peer TCP transport for Tandem.
//!
//! [`TcpTransport`] owns at most one connection and runs two kinds of
//! background work on a tokio runtime supplied by the application:
//!
//! - an **accept loop** (host side) that waits for the peer, greets it
//!   with `HOST_READY`, and stops accepting once the lobby is full;
//! - a **receive loop** (both sides) that reads the stream, splits it into
//!   frames, decodes each into a [`Message`](tandem_protocol::Message).
//!
//! Neither loop touches session state. Everything they learn becomes a
//! [`TransportEvent`] pushed onto an
//! [`ExecutionQueue`](tandem_dispatch::ExecutionQueue); the owner of the
//! session drains it once per tick and receives each event through
//! [`TransportListener::on_transport_event`].
//!
//! ```text
//! socket ─► receive loop ─► TransportEvent ─► ExecutionQueue ─► listener
//! ```

mod config;
mod error;
mod tcp;

pub use config::{TransportConfig, MAX_PARTICIPANTS};
pub use error::TransportError;
pub use tcp::TcpTransport;

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use tandem_protocol::{Message, ProtocolError};

/// Something the background tasks observed, delivered to the owner.
#[derive(Debug)]
pub enum TransportEvent {
    /// Host side: a peer connected and was greeted with `HOST_READY`.
    PeerConnected { addr: SocketAddr },

    /// A complete, well-formed message arrived.
    Message(Message),

    /// A complete frame arrived but did not decode. The connection stays
    /// open.
    Malformed(ProtocolError),

    /// The peer closed the connection, or reading from it failed.
    /// Reported at most once per connection, and never for a connection
    /// we closed ourselves.
    ConnectionLost { reason: String },

    /// The listener failed while waiting for a peer.
    AcceptFailed { reason: String },
}

impl fmt::Display for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerConnected { addr } => write!(f, "peer connected from {addr}"),
            Self::Message(msg) => write!(f, "message {msg}"),
            Self::Malformed(e) => write!(f, "malformed frame: {e}"),
            Self::ConnectionLost { reason } => write!(f, "connection lost: {reason}"),
            Self::AcceptFailed { reason } => write!(f, "accept failed: {reason}"),
        }
    }
}

/// Receives transport events on the draining thread.
///
/// Implemented by whatever owns the session state. The implementor is the
/// `C` of `ExecutionQueue<C>`: it is handed in by `&mut` when the queue is
/// drained, so it needs no interior mutability and no `Send` bound.
pub trait TransportListener: 'static {
    /// Handles one event. Called in the order the events were produced by
    /// each background task.
    fn on_transport_event(&mut self, event: TransportEvent);
}

/// Best-effort LAN address of this machine, for showing on a lobby screen.
///
/// Opens a UDP socket and "connects" it towards a public address; no
/// packet is sent, but the OS picks the outbound interface, whose address
/// we read back. Falls back to `127.0.0.1` when there is no route.
pub fn local_ip_address() -> IpAddr {
    let probe = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
        Ok(socket.local_addr()?.ip())
    };
    match probe() {
        Ok(ip) if !ip.is_unspecified() => ip,
        Ok(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
        Err(e) => {
            tracing::debug!(error = %e, "no outbound route, using loopback");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_ip_address_is_never_unspecified() {
        assert!(!local_ip_address().is_unspecified());
    }

    #[test]
    fn test_transport_event_display() {
        let event = TransportEvent::ConnectionLost {
            reason: "peer closed the connection".into(),
        };
        assert_eq!(event.to_string(), "connection lost: peer closed the connection");

        let event = TransportEvent::Message(Message::Start);
        assert_eq!(event.to_string(), "message START");
    }
}
