//! Recording collaborators for unit tests.

use std::sync::{Arc, Mutex};

use tandem_protocol::InputState;

use crate::{
    CloseReason, Collaborators, InputSource, RemoteInputSink, Role, SceneTrigger, SessionPhase,
    UiNotifier,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    NetworkReady(Role),
    Started,
    Closed(CloseReason),
    Status(String),
    Phase(SessionPhase, SessionPhase),
    Remote(InputState),
    EnterGameplay,
    ReturnToMenu,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Log(Arc<Mutex<Vec<Call>>>);

impl Log {
    fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.0.lock().unwrap().iter().filter(|c| pred(c)).count()
    }
}

#[derive(Clone)]
struct Recording {
    log: Log,
    input: InputState,
}

impl InputSource for Recording {
    fn poll_input(&mut self) -> InputState {
        self.input
    }
}

impl RemoteInputSink for Recording {
    fn apply_remote_input(&mut self, input: InputState) {
        self.log.push(Call::Remote(input));
    }
}

impl UiNotifier for Recording {
    fn on_network_ready(&mut self, role: Role) {
        self.log.push(Call::NetworkReady(role));
    }

    fn on_session_started(&mut self) {
        self.log.push(Call::Started);
    }

    fn on_session_closed(&mut self, reason: &CloseReason) {
        self.log.push(Call::Closed(reason.clone()));
    }

    fn on_status(&mut self, message: &str) {
        self.log.push(Call::Status(message.to_owned()));
    }

    fn on_phase_changed(&mut self, from: SessionPhase, to: SessionPhase) {
        self.log.push(Call::Phase(from, to));
    }
}

impl SceneTrigger for Recording {
    fn enter_gameplay(&mut self) {
        self.log.push(Call::EnterGameplay);
    }

    fn return_to_menu(&mut self) {
        self.log.push(Call::ReturnToMenu);
    }
}

/// Collaborators that report `input` when polled and record every other
/// call into the returned log.
pub(crate) fn recording(input: InputState) -> (Collaborators, Log) {
    let log = Log::default();
    let hooks = Recording {
        log: log.clone(),
        input,
    };
    (
        Collaborators::new(hooks.clone(), hooks.clone(), hooks.clone(), hooks),
        log,
    )
}
