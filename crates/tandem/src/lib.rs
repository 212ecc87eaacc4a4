//! # Tandem
//!
//! Two-player peer sessions over TCP for small real-time games.
//!
//! One player hosts, the other joins by address. The two greet each
//! other, the host starts the game, and from then on each side streams
//! its controls to the other at a fixed rate. The game implements four
//! small traits ([`InputSource`](prelude::InputSource),
//! [`RemoteInputSink`](prelude::RemoteInputSink),
//! [`UiNotifier`](prelude::UiNotifier), [`SceneTrigger`](prelude::SceneTrigger))
//! and calls [`Session::pump`](prelude::Session::pump) once per frame.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tandem::prelude::*;
//!
//! fn main() -> Result<(), TandemError> {
//!     tandem::init_tracing();
//!     let rt = tokio::runtime::Runtime::new().expect("runtime");
//!     let config = SessionConfig::default();
//!
//!     let mut session = Session::new(rt.handle().clone(), config.clone(), Collaborators::detached());
//!     session.create_session(config.port)?;
//!     loop {
//!         session.pump();
//!         if session.phase() == SessionPhase::PeerReady {
//!             session.start_session()?;
//!         }
//!         # break;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Crates
//!
//! | Crate | Role |
//! |-------|------|
//! | `tandem-protocol` | Messages, JSON codec, length-prefixed framing |
//! | `tandem-dispatch` | Queue that moves background results onto the game thread |
//! | `tandem-transport` | TCP listener/connection and their background loops |
//! | `tandem-tick` | Polled fixed-rate cadence for the input stream |
//! | `tandem-session` | Phases, roles, and the `Session` API |

mod error;

use std::path::Path;

pub use error::TandemError;

pub use tandem_dispatch as dispatch;
pub use tandem_protocol as protocol;
pub use tandem_session as session;
pub use tandem_tick as tick;
pub use tandem_transport as transport;

use tandem_session::SessionConfig;

/// Everything a game needs to host, join and play.
pub mod prelude {
    pub use crate::TandemError;
    pub use tandem_protocol::{InputState, Message};
    pub use tandem_session::{
        CloseReason, Collaborators, Detached, InputSource, RemoteInputSink, Role, SceneTrigger,
        Session, SessionConfig, SessionError, SessionPhase, UiNotifier,
    };
    pub use tandem_transport::local_ip_address;
}

/// Installs a `tracing` subscriber that logs to stderr.
///
/// The filter comes from `RUST_LOG` (for example
/// `RUST_LOG=tandem_transport=debug`), defaulting to `info`. Does nothing
/// if a global subscriber is already set.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Reads a [`SessionConfig`] from a JSON file. Missing fields take their
/// defaults, and the result is validated.
///
/// # Errors
/// [`TandemError::ConfigIo`] if the file can't be read,
/// [`TandemError::ConfigParse`] if it isn't a valid config.
pub fn load_config(path: impl AsRef<Path>) -> Result<SessionConfig, TandemError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| TandemError::ConfigIo {
        path: path.to_path_buf(),
        source,
    })?;
    let config: SessionConfig =
        serde_json::from_str(&text).map_err(|source| TandemError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
    tracing::debug!(path = %path.display(), port = config.port, "config loaded");
    Ok(config.validated())
}
