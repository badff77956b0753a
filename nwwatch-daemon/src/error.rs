use std::path::PathBuf;

use thiserror::Error;

use crate::hub::ClientId;

/// Error surface for the daemon runtime, watcher, hub and server.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("already watching for step changes")]
    AlreadyWatching,

    #[error("not watching for step changes")]
    NotWatching,

    #[error("steps folder does not exist: {path}")]
    WatchRootMissing { path: PathBuf },

    #[error("steps path is not a directory: {path}")]
    WatchRootNotDirectory { path: PathBuf },

    #[error("failed to send to client {client}: {reason}")]
    ClientSend { client: ClientId, reason: String },

    #[error("daemon protocol error: {0}")]
    Protocol(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
