//! The state a session mutates, and the rules for mutating it.
//!
//! `SessionCore` is the context of the session's execution queue: the
//! transport's background tasks enqueue [`TransportEvent`]s, and each
//! drain hands them to [`SessionCore::on_transport_event`] on the
//! pumping thread. User operations on [`Session`](crate::Session) go
//! through the same transition helpers, so every phase change is checked
//! against [`SessionPhase::can_transition_to`] and notified the same way.

use std::net::SocketAddr;
use std::time::Instant;

use tandem_protocol::{InputState, Message};
use tandem_tick::{Cadence, TickConfig};
use tandem_transport::{TransportEvent, TransportListener};
use tracing::{debug, info, trace, warn};

use crate::{CloseReason, Collaborators, Role, SessionPhase};

pub(crate) struct SessionCore {
    phase: SessionPhase,
    role: Option<Role>,
    peer_addr: Option<SocketAddr>,
    cadence: Cadence,
    collaborators: Collaborators,
}

impl SessionCore {
    pub(crate) fn new(collaborators: Collaborators, tick: TickConfig) -> Self {
        let mut cadence = Cadence::new(tick);
        cadence.pause();
        Self {
            phase: SessionPhase::Idle,
            role: None,
            peer_addr: None,
            cadence,
            collaborators,
        }
    }

    pub(crate) fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub(crate) fn role(&self) -> Option<Role> {
        self.role
    }

    pub(crate) fn set_role(&mut self, role: Option<Role>) {
        self.role = role;
    }

    pub(crate) fn peer_count(&self) -> usize {
        usize::from(self.peer_addr.is_some())
    }

    pub(crate) fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub(crate) fn set_peer(&mut self, addr: SocketAddr) {
        self.peer_addr = Some(addr);
    }

    pub(crate) fn into_collaborators(self) -> Collaborators {
        self.collaborators
    }

    /// Moves to `to` if the edge is legal, notifying the UI. Returns
    /// whether the phase changed.
    pub(crate) fn transition(&mut self, to: SessionPhase) -> bool {
        let from = self.phase;
        if !from.can_transition_to(to) {
            warn!(%from, %to, "illegal phase transition refused");
            return false;
        }
        self.phase = to;
        info!(%from, %to, role = ?self.role, "phase changed");
        self.collaborators.ui.on_phase_changed(from, to);
        true
    }

    /// Enters gameplay: starts the input cadence and switches scenes.
    pub(crate) fn enter_session(&mut self) -> bool {
        if !self.transition(SessionPhase::InSession) {
            return false;
        }
        self.cadence.reset();
        self.cadence.resume();
        self.collaborators.scene.enter_gameplay();
        self.collaborators.ui.on_session_started();
        true
    }

    /// Marks the session closed and notifies once. Returns `false` if it
    /// was already closed.
    ///
    /// Releasing the transport is the caller's job.
    pub(crate) fn close(&mut self, reason: CloseReason) -> bool {
        if self.phase == SessionPhase::Closed {
            debug!(%reason, "session already closed");
            return false;
        }
        if reason.is_failure() {
            warn!(phase = %self.phase, %reason, "session closed");
        } else {
            info!(phase = %self.phase, "session closed");
        }
        self.transition(SessionPhase::Closed);
        self.peer_addr = None;
        self.cadence.pause();
        self.collaborators.ui.on_session_closed(&reason);
        self.collaborators.scene.return_to_menu();
        true
    }

    pub(crate) fn status(&mut self, message: &str) {
        info!(status = message, "status");
        self.collaborators.ui.on_status(message);
    }

    /// Samples local input if a networked send is due at `now`.
    pub(crate) fn input_due(&mut self, now: Instant) -> Option<InputState> {
        if self.phase != SessionPhase::InSession || self.role == Some(Role::Offline) {
            return None;
        }
        let tick = self.cadence.poll(now)?;
        let input = self.collaborators.input.poll_input();
        trace!(tick = tick.tick, ?input, "input sample due");
        Some(input)
    }

    fn on_peer_connected(&mut self, addr: SocketAddr) {
        if self.phase != SessionPhase::Listening {
            debug!(%addr, phase = %self.phase, "peer connected outside the lobby, ignoring");
            return;
        }
        self.peer_addr = Some(addr);
        self.transition(SessionPhase::Connected);
        self.status(&format!("Player connected from {addr}"));
    }

    fn on_message(&mut self, msg: Message) {
        match (msg, self.role, self.phase) {
            (Message::Ready, Some(Role::Host), SessionPhase::Connected) => {
                self.transition(SessionPhase::PeerReady);
                self.collaborators.ui.on_network_ready(Role::Host);
            }
            (Message::HostReady, Some(Role::Client), SessionPhase::Connected) => {
                self.transition(SessionPhase::PeerReady);
                self.collaborators.ui.on_network_ready(Role::Client);
            }
            (Message::Start, Some(Role::Client), SessionPhase::PeerReady) => {
                self.enter_session();
            }
            (Message::Input(input), _, SessionPhase::InSession) => {
                self.collaborators.remote.apply_remote_input(input);
            }
            (msg, role, phase) => {
                debug!(%msg, ?role, %phase, "message does not fit the current phase, ignoring");
            }
        }
    }
}

impl TransportListener for SessionCore {
    fn on_transport_event(&mut self, event: TransportEvent) {
        if self.phase == SessionPhase::Closed {
            debug!(%event, "session closed, dropping event");
            return;
        }
        match event {
            TransportEvent::PeerConnected { addr } => self.on_peer_connected(addr),
            TransportEvent::Message(msg) => self.on_message(msg),
            TransportEvent::Malformed(e) => {
                warn!(error = %e, phase = %self.phase, "ignoring malformed message");
                self.status(&format!("Ignored a malformed message: {e}"));
            }
            TransportEvent::ConnectionLost { reason } => {
                self.close(CloseReason::ConnectionLost(reason));
            }
            TransportEvent::AcceptFailed { reason } => {
                self.close(CloseReason::AcceptFailed(reason));
            }
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
