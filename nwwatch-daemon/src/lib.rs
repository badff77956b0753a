//! nwwatch daemon: folder watch, debouncing, the serialized core loop and the
//! WebSocket fan-out to viewers.

pub mod config;
pub mod debounce;
mod error;
pub mod hub;
pub mod orchestrator;
pub mod protocol;
mod runtime;
pub mod server;
pub mod watcher;

pub use config::{DaemonConfig, LogFormat, StopPolicy};
pub use error::DaemonError;
pub use hub::{BroadcastHub, BroadcastReport, ClientId};
pub use orchestrator::{Orchestrator, OrchestratorHandle, WatchState, WatchStatus};
pub use protocol::{Frame, ServerMessage};
pub use runtime::{init_tracing, run, run_until, serve_on, start_blocking};
pub use watcher::{ChangeSource, NotifyChangeSource};
