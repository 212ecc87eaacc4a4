//! Transport configuration.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use tracing::warn;

/// Participants a session supports, host included.
pub const MAX_PARTICIPANTS: usize = 2;

/// Settings for a [`TcpTransport`](crate::TcpTransport).
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Interface the host listens on. Default: all interfaces.
    pub bind_ip: IpAddr,

    /// Upper bound on a single `send`. A peer that stops reading can't
    /// stall the game thread for longer than this.
    pub write_timeout: Duration,

    /// Lobby capacity, host included. The accept loop stops accepting
    /// once this many participants are present.
    pub max_participants: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            write_timeout: Duration::from_secs(2),
            max_participants: MAX_PARTICIPANTS,
        }
    }
}

impl TransportConfig {
    /// Clamps out-of-range values so the config is safe to use.
    ///
    /// Called by [`TcpTransport::new`](crate::TcpTransport::new).
    /// `max_participants` is forced to exactly [`MAX_PARTICIPANTS`]: one
    /// host, one peer.
    pub fn validated(mut self) -> Self {
        if self.max_participants != MAX_PARTICIPANTS {
            warn!(
                requested = self.max_participants,
                supported = MAX_PARTICIPANTS,
                "unsupported lobby capacity, clamping"
            );
            self.max_participants = MAX_PARTICIPANTS;
        }
        if self.write_timeout.is_zero() {
            warn!("write_timeout of zero would fail every send, using 1s");
            self.write_timeout = Duration::from_secs(1);
        }
        self
    }
}
