//! The application-facing session.

use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tandem_dispatch::ExecutionQueue;
use tandem_protocol::{InputState, Message};
use tandem_transport::{local_ip_address, TcpTransport, TransportError};
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::state::SessionCore;
use crate::{CloseReason, Collaborators, Role, SessionConfig, SessionError, SessionPhase};

/// One two-player session, from lobby to teardown.
///
/// A `Session` is owned and driven by a single thread, normally the game
/// loop. Networking happens on background tasks spawned on the tokio
/// runtime behind the [`Handle`] passed to [`new`](Self::new); their
/// results are queued and applied when the owner calls
/// [`pump`](Self::pump), once per frame. Between pumps the session never
/// changes on its own.
///
/// Operations that touch the network (`create_session`, `join_session`,
/// `start_session`, `send_input`, `pump`) block on that runtime, so they
/// must not be called from inside an async task, and the runtime must be
/// multi-threaded.
///
/// ```ignore
/// let mut session = Session::new(rt.handle().clone(), config, collaborators);
/// session.create_session(config.port)?;
/// loop {
///     session.pump();
///     if session.phase() == SessionPhase::PeerReady {
///         session.start_session()?;
///     }
///     // render...
/// }
/// ```
///
/// # Lifecycle
///
/// See [`SessionPhase`]. `Closed` is terminal: to play again, turn the
/// closed session into a fresh one with [`renew`](Self::renew).
pub struct Session {
    runtime: Handle,
    config: SessionConfig,
    core: SessionCore,
    queue: ExecutionQueue<SessionCore>,
    transport: Option<TcpTransport<SessionCore>>,
}

impl Session {
    /// Creates an idle session.
    pub fn new(runtime: Handle, config: SessionConfig, collaborators: Collaborators) -> Self {
        let config = config.validated();
        let core = SessionCore::new(collaborators, config.tick_config());
        Self {
            runtime,
            config,
            core,
            queue: ExecutionQueue::new(),
            transport: None,
        }
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Hosts a session: binds `port` on the configured interface and waits
    /// for one peer. Port 0 picks a free port.
    ///
    /// Returns the bound address. The session moves to `Listening`; the
    /// peer's arrival is applied by a later [`pump`](Self::pump).
    ///
    /// # Errors
    /// [`SessionError::InvalidPhase`] unless idle. A bind failure returns
    /// [`SessionError::Transport`], posts one status line, and leaves the
    /// session idle.
    pub fn create_session(&mut self, port: u16) -> Result<SocketAddr, SessionError> {
        self.require_idle("host a session")?;

        let transport = self.new_transport();
        let local_addr = match transport.listen(port) {
            Ok(addr) => addr,
            Err(e) => {
                self.core
                    .status(&format!("Could not host on port {port}: {e}"));
                return Err(e.into());
            }
        };

        self.core.set_role(Some(Role::Host));
        self.core.transition(SessionPhase::Listening);
        self.transport = Some(transport);

        if let Some(lobby) = self.lobby_address() {
            self.core.status(&format!("Hosting on {lobby}, waiting for a player"));
        }
        Ok(local_addr)
    }

    /// Joins a host at `host:port`, waiting at most `timeout` for the
    /// connection.
    ///
    /// The session enters `Connecting` (and the UI hears about it) before
    /// this call blocks. On success it is `Connected` and `READY` has been
    /// sent; the host's reply is applied by a later [`pump`](Self::pump).
    ///
    /// # Errors
    /// [`SessionError::InvalidPhase`] unless idle. A failed connection
    /// returns [`SessionError::Transport`] (timeout, refused, or other),
    /// posts one status line, and returns the session to `Idle`.
    pub fn join_session(
        &mut self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<SocketAddr, SessionError> {
        self.require_idle("join a session")?;

        self.core.set_role(Some(Role::Client));
        self.core.transition(SessionPhase::Connecting);

        let transport = self.new_transport();
        match transport.connect(host, port, timeout) {
            Ok(peer_addr) => {
                self.core.set_peer(peer_addr);
                self.core.transition(SessionPhase::Connected);
                self.transport = Some(transport);
                Ok(peer_addr)
            }
            Err(e) => {
                self.core.transition(SessionPhase::Idle);
                self.core.set_role(None);
                self.core
                    .status(&format!("Could not connect to {host}:{port}: {e}"));
                Err(e.into())
            }
        }
    }

    /// Host only: tells the peer to start and enters gameplay.
    ///
    /// # Errors
    /// [`SessionError::NotHost`] on the client,
    /// [`SessionError::InvalidPhase`] unless `PeerReady`. Neither changes
    /// anything. If `START` can't be sent the session closes and the send
    /// error is returned.
    pub fn start_session(&mut self) -> Result<(), SessionError> {
        let phase = self.core.phase();
        if phase == SessionPhase::Closed {
            return Err(SessionError::Closed);
        }
        if self.core.role() == Some(Role::Client) {
            return Err(SessionError::NotHost);
        }
        if phase != SessionPhase::PeerReady {
            return Err(SessionError::InvalidPhase {
                operation: "start the session",
                phase,
            });
        }

        self.send(&Message::Start)?;
        self.core.enter_session();
        Ok(())
    }

    /// Plays locally with no network. Gameplay starts immediately and no
    /// input is ever sent.
    ///
    /// # Errors
    /// [`SessionError::InvalidPhase`] unless idle.
    pub fn start_offline(&mut self) -> Result<(), SessionError> {
        self.require_idle("play offline")?;
        self.core.set_role(Some(Role::Offline));
        self.core.enter_session();
        Ok(())
    }

    /// Closes the session: stops listening, drops the connection, and
    /// notifies the UI and scene once. Calling it again does nothing.
    pub fn leave_session(&mut self) {
        if self.core.close(CloseReason::LocalLeave) {
            self.release_transport();
        }
    }

    /// Sends one input sample to the peer right now, outside the cadence.
    ///
    /// A no-op when playing offline.
    ///
    /// # Errors
    /// [`SessionError::InvalidPhase`] outside gameplay. If the send fails
    /// the session closes and the error is returned. If the peer has
    /// already hung up, `NotConnected` is returned and the next
    /// [`pump`](Self::pump) closes the session as `ConnectionLost`.
    pub fn send_input(&mut self, input: InputState) -> Result<(), SessionError> {
        match (self.core.phase(), self.core.role()) {
            (SessionPhase::Closed, _) => Err(SessionError::Closed),
            (SessionPhase::InSession, Some(Role::Offline)) => Ok(()),
            (SessionPhase::InSession, _) => self.send(&Message::Input(input)),
            (phase, _) => Err(SessionError::InvalidPhase {
                operation: "send input",
                phase,
            }),
        }
    }

    /// Applies everything the background tasks reported since the last
    /// call, then sends local input if the cadence is due. Returns how
    /// many queued events were applied.
    ///
    /// Call once per frame.
    pub fn pump(&mut self) -> usize {
        self.pump_at(Instant::now())
    }

    /// [`pump`](Self::pump) with an explicit clock reading.
    pub fn pump_at(&mut self, now: Instant) -> usize {
        let applied = self.queue.drain_and_run(&mut self.core);

        if self.core.phase() == SessionPhase::Closed {
            self.release_transport();
            return applied;
        }

        if let Some(input) = self.core.input_due(now) {
            // A failed send has already closed the session.
            if let Err(e) = self.send(&Message::Input(input)) {
                debug!(error = %e, "input send failed");
            }
        }
        applied
    }

    /// Consumes this session and returns a fresh idle one with the same
    /// config and collaborators. A session that is still open is left
    /// first.
    pub fn renew(mut self) -> Session {
        self.leave_session();
        let Session {
            runtime,
            config,
            core,
            ..
        } = self;
        info!("session renewed");
        Session::new(runtime, config, core.into_collaborators())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        self.core.phase()
    }

    /// Which side this is, once hosting, joining or offline play began.
    pub fn role(&self) -> Option<Role> {
        self.core.role()
    }

    /// Connected remote peers: 0 or 1.
    pub fn peer_count(&self) -> usize {
        self.core.peer_count()
    }

    /// Participants for lobby display, this side included: the host shows
    /// 1 while waiting and 2 once the peer is in. 0 when idle or closed.
    pub fn participant_count(&self) -> usize {
        match (self.core.role(), self.core.phase()) {
            (None, _) | (_, SessionPhase::Closed) => 0,
            _ => 1 + self.core.peer_count(),
        }
    }

    /// Address of the connected peer.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.core.peer_addr()
    }

    /// Address the host's listener is bound to.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.as_ref().and_then(TcpTransport::local_addr)
    }

    /// Host only: the address a player on the LAN should join. Uses this
    /// machine's outward-facing IP when bound to all interfaces.
    pub fn lobby_address(&self) -> Option<SocketAddr> {
        if self.core.role() != Some(Role::Host) || !self.core.phase().is_networked() {
            return None;
        }
        let bound = self.local_addr()?;
        let ip = if bound.ip().is_unspecified() {
            local_ip_address()
        } else {
            bound.ip()
        };
        Some(SocketAddr::new(ip, bound.port()))
    }

    /// Background tasks that have not exited yet. Drops to 0 shortly
    /// after the session closes.
    pub fn active_tasks(&self) -> usize {
        self.transport
            .as_ref()
            .map_or(0, TcpTransport::active_tasks)
    }

    /// The validated config in use.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn require_idle(&self, operation: &'static str) -> Result<(), SessionError> {
        match self.core.phase() {
            SessionPhase::Idle => Ok(()),
            SessionPhase::Closed => Err(SessionError::Closed),
            phase => Err(SessionError::InvalidPhase { operation, phase }),
        }
    }

    fn new_transport(&self) -> TcpTransport<SessionCore> {
        TcpTransport::new(
            self.runtime.clone(),
            self.queue.clone(),
            self.config.transport_config(),
        )
    }

    /// Sends `msg`, closing the session if the write fails.
    fn send(&mut self, msg: &Message) -> Result<(), SessionError> {
        let Some(transport) = &self.transport else {
            return Err(TransportError::NotConnected.into());
        };
        match transport.send(msg) {
            Ok(()) => Ok(()),
            // The receive loop saw the hangup first; its `ConnectionLost`
            // is queued and closes the session on the next drain.
            Err(TransportError::NotConnected) if !transport.is_closed() => {
                debug!(%msg, "peer already gone, waiting for connection lost");
                Err(TransportError::NotConnected.into())
            }
            Err(e) => {
                self.core.close(CloseReason::SendFailed(e.to_string()));
                self.release_transport();
                Err(e.into())
            }
        }
    }

    /// Closes the transport and discards queued events. The closed
    /// transport is kept so `active_tasks` can watch its tasks wind down.
    fn release_transport(&mut self) {
        if let Some(transport) = &self.transport {
            transport.close();
        }
        let dropped = self.queue.close();
        if dropped > 0 {
            debug!(dropped, "discarded events queued after close");
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("phase", &self.core.phase())
            .field("role", &self.core.role())
            .field("peer_addr", &self.core.peer_addr())
            .field("local_addr", &self.local_addr())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{recording, Call, Log};

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap()
    }

    fn loopback_config() -> SessionConfig {
        SessionConfig {
            bind_ip: std::net::Ipv4Addr::LOCALHOST.into(),
            ..SessionConfig::default()
        }
    }

    fn session(rt: &tokio::runtime::Runtime) -> (Session, Log) {
        let (collaborators, log) = recording(InputState::default());
        (
            Session::new(rt.handle().clone(), loopback_config(), collaborators),
            log,
        )
    }

    #[test]
    fn test_new_session_is_idle() {
        let rt = runtime();
        let (session, _log) = session(&rt);
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert_eq!(session.role(), None);
        assert_eq!(session.participant_count(), 0);
        assert_eq!(session.active_tasks(), 0);
    }

    #[test]
    fn test_create_session_enters_listening_as_host() {
        let rt = runtime();
        let (mut session, _log) = session(&rt);

        let addr = session.create_session(0).unwrap();

        assert_eq!(session.phase(), SessionPhase::Listening);
        assert_eq!(session.role(), Some(Role::Host));
        assert_eq!(session.local_addr(), Some(addr));
        assert_eq!(session.participant_count(), 1);
        assert_eq!(
            session.lobby_address(),
            Some(SocketAddr::new(std::net::Ipv4Addr::LOCALHOST.into(), addr.port()))
        );
    }

    #[test]
    fn test_create_session_twice_is_rejected() {
        let rt = runtime();
        let (mut session, _log) = session(&rt);
        session.create_session(0).unwrap();

        let err = session.create_session(0).unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidPhase {
                phase: SessionPhase::Listening,
                ..
            }
        ));
    }

    #[test]
    fn test_create_session_bind_failure_stays_idle_with_one_status() {
        let rt = runtime();
        let (mut first, _) = session(&rt);
        let port = first.create_session(0).unwrap().port();

        let (mut second, log) = session(&rt);
        let err = second.create_session(port).unwrap_err();

        assert!(matches!(err, SessionError::Transport(TransportError::Bind(_))));
        assert_eq!(second.phase(), SessionPhase::Idle);
        assert_eq!(second.role(), None);
        assert_eq!(log.count(|c| matches!(c, Call::Status(_))), 1);
    }

    #[test]
    fn test_join_session_refused_returns_to_idle_with_one_status() {
        let rt = runtime();
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let (mut session, log) = session(&rt);

        let err = session
            .join_session("127.0.0.1", port, Duration::from_secs(2))
            .unwrap_err();

        assert!(matches!(
            err,
            SessionError::Transport(TransportError::ConnectRefused(_))
        ));
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert_eq!(session.role(), None);
        assert_eq!(log.count(|c| matches!(c, Call::Status(_))), 1);
        // Connecting was announced before the attempt, then undone.
        assert_eq!(
            log.count(|c| *c == Call::Phase(SessionPhase::Idle, SessionPhase::Connecting)),
            1
        );
        assert_eq!(
            log.count(|c| *c == Call::Phase(SessionPhase::Connecting, SessionPhase::Idle)),
            1
        );
    }

    #[test]
    fn test_start_session_before_peer_ready_is_rejected() {
        let rt = runtime();
        let (mut session, log) = session(&rt);

        assert!(matches!(
            session.start_session(),
            Err(SessionError::InvalidPhase {
                phase: SessionPhase::Idle,
                ..
            })
        ));

        session.create_session(0).unwrap();
        assert!(matches!(
            session.start_session(),
            Err(SessionError::InvalidPhase {
                phase: SessionPhase::Listening,
                ..
            })
        ));
        assert_eq!(session.phase(), SessionPhase::Listening);
        assert_eq!(log.count(|c| *c == Call::Started), 0);
    }

    #[test]
    fn test_start_offline_enters_session_without_network() {
        let rt = runtime();
        let (mut session, log) = session(&rt);

        session.start_offline().unwrap();

        assert_eq!(session.phase(), SessionPhase::InSession);
        assert_eq!(session.role(), Some(Role::Offline));
        assert_eq!(session.participant_count(), 1);
        assert_eq!(session.active_tasks(), 0);
        assert_eq!(log.count(|c| *c == Call::EnterGameplay), 1);
        assert!(session.send_input(InputState::from_axis(1.0, true)).is_ok());
        assert!(matches!(session.start_session(), Err(SessionError::InvalidPhase { .. })));
    }

    #[test]
    fn test_send_input_outside_gameplay_is_rejected() {
        let rt = runtime();
        let (mut session, _log) = session(&rt);
        assert!(matches!(
            session.send_input(InputState::default()),
            Err(SessionError::InvalidPhase { .. })
        ));
    }

    #[test]
    fn test_leave_session_is_idempotent() {
        let rt = runtime();
        let (mut session, log) = session(&rt);
        session.create_session(0).unwrap();

        session.leave_session();
        session.leave_session();
        session.pump();

        assert_eq!(session.phase(), SessionPhase::Closed);
        assert_eq!(session.participant_count(), 0);
        assert_eq!(log.count(|c| matches!(c, Call::Closed(_))), 1);
        assert_eq!(log.count(|c| *c == Call::ReturnToMenu), 1);
        assert!(matches!(session.create_session(0), Err(SessionError::Closed)));
    }

    /// Host and client pumped until both are `PeerReady`.
    fn ready_pair(rt: &tokio::runtime::Runtime) -> ((Session, Log), (Session, Log)) {
        let (mut host, host_log) = session(rt);
        let (mut client, client_log) = session(rt);
        let port = host.create_session(0).unwrap().port();
        client
            .join_session("127.0.0.1", port, Duration::from_secs(2))
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while [&host, &client].iter().any(|s| s.phase() != SessionPhase::PeerReady) {
            assert!(Instant::now() < deadline, "peers never got ready");
            host.pump();
            client.pump();
            std::thread::sleep(Duration::from_millis(5));
        }
        ((host, host_log), (client, client_log))
    }

    #[test]
    fn test_send_after_peer_hangup_reports_connection_lost() {
        let rt = runtime();
        let ((mut host, host_log), (mut client, _)) = ready_pair(&rt);
        host.start_session().unwrap();
        client.leave_session();

        // Wait until the host's receive loop has seen the hangup, without
        // draining what it reported.
        let deadline = Instant::now() + Duration::from_secs(5);
        while host.transport.as_ref().is_some_and(TcpTransport::is_connected) {
            assert!(Instant::now() < deadline, "hangup never noticed");
            std::thread::sleep(Duration::from_millis(5));
        }

        let err = host.send_input(InputState::default()).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Transport(TransportError::NotConnected)
        ));
        assert_eq!(host.phase(), SessionPhase::InSession);

        let deadline = Instant::now() + Duration::from_secs(5);
        while host.phase() != SessionPhase::Closed {
            assert!(Instant::now() < deadline, "session never closed");
            host.pump();
            std::thread::sleep(Duration::from_millis(5));
        }
        let closed: Vec<_> = host_log
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Closed(reason) => Some(reason),
                _ => None,
            })
            .collect();
        assert_eq!(closed.len(), 1);
        assert!(matches!(closed[0], CloseReason::ConnectionLost(_)), "got {:?}", closed[0]);
    }

    #[test]
    fn test_renew_returns_idle_session_with_same_collaborators() {
        let rt = runtime();
        let (mut session, log) = session(&rt);
        session.start_offline().unwrap();

        let mut renewed = session.renew();
        assert_eq!(renewed.phase(), SessionPhase::Idle);
        assert_eq!(log.count(|c| matches!(c, Call::Closed(CloseReason::LocalLeave))), 1);

        renewed.start_offline().unwrap();
        assert_eq!(log.count(|c| *c == Call::EnterGameplay), 2);
    }
}
