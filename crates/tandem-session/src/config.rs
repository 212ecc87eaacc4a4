//! Session configuration.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tandem_tick::TickConfig;
use tandem_transport::{TransportConfig, MAX_PARTICIPANTS};
use tracing::warn;

/// Port both sides use unless told otherwise.
pub const DEFAULT_PORT: u16 = 7777;

/// Configuration for a [`Session`](crate::Session).
///
/// Every field has a default, so a partial file deserializes:
///
/// ```
/// # use tandem_session::SessionConfig;
/// let config: SessionConfig = serde_json::from_str(r#"{"port": 9000}"#).unwrap();
/// assert_eq!(config.port, 9000);
/// assert_eq!(config.input_rate_hz, 20);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Port the host listens on and the client connects to.
    pub port: u16,

    /// Interface the host binds. Default: all interfaces, so LAN peers
    /// can reach it.
    pub bind_ip: IpAddr,

    /// How long `join_session` waits for the TCP handshake.
    pub connect_timeout: Duration,

    /// Upper bound on a single send.
    pub write_timeout: Duration,

    /// How often local input is sent during gameplay. 20 Hz is one
    /// message every 50 ms.
    pub input_rate_hz: u32,

    /// Lobby capacity, host included. Only 2 is supported.
    pub max_participants: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            connect_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(2),
            input_rate_hz: 20,
            max_participants: MAX_PARTICIPANTS,
        }
    }
}

impl SessionConfig {
    /// Clamps out-of-range values so the config is safe to use.
    ///
    /// Called by [`Session::new`](crate::Session::new).
    pub fn validated(mut self) -> Self {
        if self.max_participants != MAX_PARTICIPANTS {
            warn!(
                requested = self.max_participants,
                supported = MAX_PARTICIPANTS,
                "sessions are strictly two-player, clamping max_participants"
            );
            self.max_participants = MAX_PARTICIPANTS;
        }
        if self.input_rate_hz > TickConfig::MAX_TICK_RATE_HZ {
            warn!(
                rate = self.input_rate_hz,
                max = TickConfig::MAX_TICK_RATE_HZ,
                "input_rate_hz exceeds maximum, clamping"
            );
            self.input_rate_hz = TickConfig::MAX_TICK_RATE_HZ;
        }
        if self.connect_timeout.is_zero() {
            warn!("connect_timeout of zero, using the default");
            self.connect_timeout = Self::default().connect_timeout;
        }
        if self.write_timeout.is_zero() {
            warn!("write_timeout of zero, using the default");
            self.write_timeout = Self::default().write_timeout;
        }
        self
    }

    /// Settings for the transport layer.
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            bind_ip: self.bind_ip,
            write_timeout: self.write_timeout,
            max_participants: self.max_participants,
        }
    }

    /// Settings for the input cadence.
    pub fn tick_config(&self) -> TickConfig {
        TickConfig::with_rate(self.input_rate_hz)
    }
}
