use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::DaemonError;

pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(100);
pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
pub const DEFAULT_PORT: u16 = 8000;

/// Frames queued per client before it counts as unresponsive.
pub const CLIENT_BUFFER: usize = 256;

/// Commands queued to the core loop before callers wait.
pub const COMMAND_BUFFER: usize = 64;

pub const WS_ROUTE: &str = "/ws";
pub const HEALTH_ROUTE: &str = "/health";
pub const STATUS_ROUTE: &str = "/status";

/// What `stop_watching` does when nothing is being watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopPolicy {
    /// Logged no-op.
    #[default]
    Lenient,
    /// Returns [`DaemonError::NotWatching`].
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Runtime configuration for `nwwatch serve`.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub steps_dir: PathBuf,
    pub bind: SocketAddr,
    pub debounce: Duration,
    pub client_buffer: usize,
    pub stop_policy: StopPolicy,
    /// Served at `/` when set (the dashboard bundle).
    pub static_dir: Option<PathBuf>,
    pub log_format: LogFormat,
}

impl DaemonConfig {
    pub fn new(steps_dir: impl Into<PathBuf>) -> Self {
        Self {
            steps_dir: steps_dir.into(),
            bind: SocketAddr::new(DEFAULT_HOST, DEFAULT_PORT),
            debounce: DEBOUNCE_WINDOW,
            client_buffer: CLIENT_BUFFER,
            stop_policy: StopPolicy::default(),
            static_dir: None,
            log_format: LogFormat::default(),
        }
    }
}

/// Check that `dir` exists and is a directory.
///
/// A missing or non-directory steps folder is fatal at startup.
pub fn validate_watch_root(dir: &Path) -> Result<(), DaemonError> {
    if !dir.exists() {
        return Err(DaemonError::WatchRootMissing {
            path: dir.to_path_buf(),
        });
    }
    if !dir.is_dir() {
        return Err(DaemonError::WatchRootNotDirectory {
            path: dir.to_path_buf(),
        });
    }
    Ok(())
}
