//! Error types for nwwatch-core.

use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong turning a step file into a [`crate::Step`].
///
/// These never escape [`crate::source::StepSource`]; the source logs them and
/// treats the file as absent.
#[derive(Debug, Error)]
pub enum StepError {
    /// Underlying I/O failure, with the offending path.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON or is missing a required field.
    #[error("failed to parse step file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Id is not two zero-padded two-digit groups joined by `-`.
    #[error("invalid task_id '{0}', expected NN-NN")]
    InvalidId(String),

    #[error("invalid status '{0}', expected one of: pending, in_progress, completed, failed, skipped")]
    InvalidStatus(String),

    /// The `task_id` inside the file disagrees with its file name.
    #[error("step file {path} declares task_id '{found}' but is named for '{expected}'")]
    IdMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },
}

/// Convenience constructor for [`StepError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StepError {
    StepError::Io {
        path: path.into(),
        source,
    }
}
