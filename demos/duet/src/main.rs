//! Headless two-player demo.
//!
//! ```text
//! duet host [port]           wait for a player, start as soon as they're ready
//! duet join <host> [port]    join a host
//! duet loopback              host and join inside one process
//! duet offline               local play, no network
//! ```
//!
//! Each side "plays" by replaying a scripted input pattern and logs what
//! the other side sends. Set `TANDEM_CONFIG` to a JSON file to override
//! the session config, and `RUST_LOG` to change verbosity.

use std::thread;
use std::time::{Duration, Instant};

use tandem::prelude::*;
use tokio::runtime::Handle;
use tracing::info;

/// Roughly 60 frames per second.
const FRAME: Duration = Duration::from_millis(16);

/// How long each side plays before leaving.
const PLAY_TIME: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
enum Mode {
    Host { port: u16 },
    Join { host: String, port: u16 },
    Loopback,
    Offline,
}

fn parse_args(args: &[String], default_port: u16) -> Result<Mode, String> {
    let port_at = |i: usize| -> Result<u16, String> {
        match args.get(i) {
            Some(p) => p.parse().map_err(|_| format!("invalid port: {p}")),
            None => Ok(default_port),
        }
    };
    match args.first().map(String::as_str) {
        Some("host") => Ok(Mode::Host { port: port_at(1)? }),
        Some("join") => {
            let host = args.get(1).ok_or("join needs a host address")?.clone();
            Ok(Mode::Join {
                host,
                port: port_at(2)?,
            })
        }
        Some("loopback") | None => Ok(Mode::Loopback),
        Some("offline") => Ok(Mode::Offline),
        Some(other) => Err(format!("unknown mode: {other}")),
    }
}

// ---------------------------------------------------------------------------
// Game-side hooks
// ---------------------------------------------------------------------------

/// Walks right, then left, jumping now and then.
struct ScriptedInput {
    sample: u64,
}

impl InputSource for ScriptedInput {
    fn poll_input(&mut self) -> InputState {
        self.sample += 1;
        let axis = if (self.sample / 20) % 2 == 0 { 1.0 } else { -1.0 };
        InputState::from_axis(axis, self.sample % 15 == 0)
    }
}

/// Logs the other player's input whenever it changes.
#[derive(Default)]
struct RemoteAvatar {
    last: Option<InputState>,
    received: u64,
}

impl RemoteInputSink for RemoteAvatar {
    fn apply_remote_input(&mut self, input: InputState) {
        self.received += 1;
        if self.last != Some(input) {
            info!(
                left = input.left,
                right = input.right,
                jump = input.jump,
                received = self.received,
                "remote input changed"
            );
            self.last = Some(input);
        }
    }
}

struct Console {
    side: &'static str,
}

impl UiNotifier for Console {
    fn on_network_ready(&mut self, role: Role) {
        info!(side = self.side, %role, "both players ready");
    }

    fn on_session_started(&mut self) {
        info!(side = self.side, "game on");
    }

    fn on_session_closed(&mut self, reason: &CloseReason) {
        info!(side = self.side, %reason, "session over");
    }

    fn on_status(&mut self, message: &str) {
        info!(side = self.side, "{message}");
    }
}

struct Scenes {
    side: &'static str,
}

impl SceneTrigger for Scenes {
    fn enter_gameplay(&mut self) {
        info!(side = self.side, "loading gameplay scene");
    }

    fn return_to_menu(&mut self) {
        info!(side = self.side, "back to the menu");
    }
}

fn collaborators(side: &'static str) -> Collaborators {
    Collaborators::new(
        ScriptedInput { sample: 0 },
        RemoteAvatar::default(),
        Console { side },
        Scenes { side },
    )
}

// ---------------------------------------------------------------------------
// Frame loop
// ---------------------------------------------------------------------------

/// Pumps `session` once per frame for `play_time`, starting the game as
/// soon as the host can, then leaves.
fn play(session: &mut Session, play_time: Duration) -> Result<(), TandemError> {
    let deadline = Instant::now() + play_time;
    while Instant::now() < deadline {
        session.pump();
        match (session.phase(), session.role()) {
            (SessionPhase::PeerReady, Some(Role::Host)) => session.start_session()?,
            (SessionPhase::Closed, _) => return Ok(()),
            _ => {}
        }
        thread::sleep(FRAME);
    }
    session.leave_session();
    Ok(())
}

fn host(handle: Handle, config: SessionConfig, port: u16) -> Result<(), TandemError> {
    let mut session = Session::new(handle, config, collaborators("host"));
    session.create_session(port)?;
    play(&mut session, PLAY_TIME)
}

fn join(handle: Handle, config: SessionConfig, host: &str, port: u16) -> Result<(), TandemError> {
    let timeout = config.connect_timeout;
    let mut session = Session::new(handle, config, collaborators("client"));
    session.join_session(host, port, timeout)?;
    play(&mut session, PLAY_TIME)
}

fn loopback(handle: Handle, config: SessionConfig) -> Result<(), TandemError> {
    let mut host = Session::new(handle.clone(), config.clone(), collaborators("host"));
    let port = host.create_session(0)?.port();

    let client = thread::spawn(move || join(handle, config, "127.0.0.1", port));
    let hosted = play(&mut host, PLAY_TIME);

    match client.join() {
        Ok(joined) => joined?,
        Err(_) => tracing::error!("client thread panicked"),
    }
    hosted
}

fn offline(handle: Handle, config: SessionConfig) -> Result<(), TandemError> {
    let mut session = Session::new(handle, config, collaborators("offline"));
    session.start_offline()?;
    play(&mut session, Duration::from_secs(1))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tandem::init_tracing();

    let config = match std::env::var_os("TANDEM_CONFIG") {
        Some(path) => tandem::load_config(path)?,
        None => SessionConfig::default(),
    };
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mode = parse_args(&args, config.port)?;
    info!(?mode, lan_ip = %local_ip_address(), "starting duet");

    // Sessions block on the runtime from this thread, so it must not be
    // entered here; it only hosts the background tasks.
    let runtime = tokio::runtime::Runtime::new()?;
    let handle = runtime.handle().clone();

    match mode {
        Mode::Host { port } => host(handle, config, port)?,
        Mode::Join { host, port } => join(handle, config, &host, port)?,
        Mode::Loopback => loopback(handle, config)?,
        Mode::Offline => offline(handle, config)?,
    }
    Ok(())
}
