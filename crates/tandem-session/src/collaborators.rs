//! The game-side hooks a session talks to.
//!
//! A session knows nothing about rendering, scenes or physics. It samples
//! input through an [`InputSource`], hands the peer's input to a
//! [`RemoteInputSink`], and reports progress through a [`UiNotifier`] and
//! a [`SceneTrigger`]. All four are called on the thread that pumps the
//! session, so implementations may freely touch game state.

use tandem_protocol::InputState;

use crate::{CloseReason, Role, SessionPhase};

/// Samples the local player's controls.
pub trait InputSource {
    /// The current input. Called once per cadence tick during gameplay.
    fn poll_input(&mut self) -> InputState;
}

/// Applies the remote player's controls to their avatar.
pub trait RemoteInputSink {
    /// Called once for every `INPUT` received during gameplay, in arrival
    /// order.
    fn apply_remote_input(&mut self, input: InputState);
}

/// Lobby and status display.
pub trait UiNotifier {
    /// Both sides have greeted each other. For the host this is the
    /// moment to enable the start button.
    fn on_network_ready(&mut self, role: Role);

    /// Gameplay has begun.
    fn on_session_started(&mut self);

    /// The session closed. Called exactly once per session.
    fn on_session_closed(&mut self, reason: &CloseReason);

    /// A one-line, human-readable status (errors, lobby info).
    fn on_status(&mut self, message: &str);

    /// Every phase change, for UIs that mirror the state machine.
    fn on_phase_changed(&mut self, from: SessionPhase, to: SessionPhase) {
        let _ = (from, to);
    }
}

/// Moves the game between its menu and gameplay scenes.
pub trait SceneTrigger {
    /// Load the gameplay scene.
    fn enter_gameplay(&mut self);

    /// Go back to the main menu.
    fn return_to_menu(&mut self);
}

/// The four hooks, boxed, as one bundle owned by the session.
pub struct Collaborators {
    pub input: Box<dyn InputSource>,
    pub remote: Box<dyn RemoteInputSink>,
    pub ui: Box<dyn UiNotifier>,
    pub scene: Box<dyn SceneTrigger>,
}

impl Collaborators {
    /// Bundles four hook implementations.
    pub fn new(
        input: impl InputSource + 'static,
        remote: impl RemoteInputSink + 'static,
        ui: impl UiNotifier + 'static,
        scene: impl SceneTrigger + 'static,
    ) -> Self {
        Self {
            input: Box::new(input),
            remote: Box::new(remote),
            ui: Box::new(ui),
            scene: Box::new(scene),
        }
    }

    /// Hooks that do nothing and report idle input. Useful for headless
    /// peers and tests; replace individual fields as needed.
    pub fn detached() -> Self {
        Self::new(Detached, Detached, Detached, Detached)
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// No-op implementation of every hook.
#[derive(Debug, Clone, Copy, Default)]
pub struct Detached;

impl InputSource for Detached {
    fn poll_input(&mut self) -> InputState {
        InputState::default()
    }
}

impl RemoteInputSink for Detached {
    fn apply_remote_input(&mut self, _input: InputState) {}
}

impl UiNotifier for Detached {
    fn on_network_ready(&mut self, _role: Role) {}
    fn on_session_started(&mut self) {}
    fn on_session_closed(&mut self, _reason: &CloseReason) {}
    fn on_status(&mut self, _message: &str) {}
}

impl SceneTrigger for Detached {
    fn enter_gameplay(&mut self) {}
    fn return_to_menu(&mut self) {}
}
