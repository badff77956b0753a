//! Domain types for workflow steps and the file events that change them.
//!
//! A [`Step`] is built once from a validated [`StepRecord`] and never mutated
//! afterwards; updates replace the whole value.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StepError;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Canonical step identifier: two groups of two ASCII digits, e.g. `01-02`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StepId(String);

impl StepId {
    /// Parse and validate a step id.
    pub fn parse(raw: &str) -> Result<Self, StepError> {
        if split_groups(raw).is_some() {
            Ok(Self(raw.to_owned()))
        } else {
            Err(StepError::InvalidId(raw.to_owned()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `(major, minor)` integers encoded in the id.
    pub fn version(&self) -> (u32, u32) {
        // Validated at construction.
        split_groups(&self.0).unwrap_or((0, 0))
    }
}

fn split_groups(raw: &str) -> Option<(u32, u32)> {
    let (major, minor) = raw.split_once('-')?;
    Some((two_digit_group(major)?, two_digit_group(minor)?))
}

fn two_digit_group(group: &str) -> Option<u32> {
    if group.len() != 2 || !group.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    group.parse().ok()
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for StepId {
    type Err = StepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for StepId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        StepId::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Progress state of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub const ALL: [StepStatus; 5] = [
        StepStatus::Pending,
        StepStatus::InProgress,
        StepStatus::Completed,
        StepStatus::Failed,
        StepStatus::Skipped,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepStatus {
    type Err = StepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| StepError::InvalidStatus(s.to_owned()))
    }
}

/// Kind of filesystem change reported for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Created => write!(f, "created"),
            ChangeKind::Modified => write!(f, "modified"),
            ChangeKind::Deleted => write!(f, "deleted"),
        }
    }
}

// ---------------------------------------------------------------------------
// On-disk record
// ---------------------------------------------------------------------------

/// The `validation` block of a step file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    #[serde(default)]
    pub status: Option<String>,
}

/// Raw JSON shape of one `<id>.json` step file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub task_id: String,
    pub project_id: String,
    pub phase: String,
    pub description: String,
    #[serde(default)]
    pub validation: Option<Validation>,
}

impl StepRecord {
    pub fn new(
        task_id: impl Into<String>,
        project_id: impl Into<String>,
        phase: impl Into<String>,
        description: impl Into<String>,
        status: StepStatus,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            project_id: project_id.into(),
            phase: phase.into(),
            description: description.into(),
            validation: Some(Validation {
                status: Some(status.as_str().to_owned()),
            }),
        }
    }

    /// Status named in the record; absent means `pending`.
    pub fn status(&self) -> Result<StepStatus, StepError> {
        match self.validation.as_ref().and_then(|v| v.status.as_deref()) {
            None => Ok(StepStatus::Pending),
            Some(raw) => raw.parse(),
        }
    }
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// A validated workflow step.
///
/// Serializes to the camelCase wire shape sent to viewers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    #[serde(rename = "taskId")]
    id: StepId,
    project_id: String,
    phase: String,
    description: String,
    status: StepStatus,
    #[serde(rename = "majorVersion")]
    major: u32,
    #[serde(rename = "minorVersion")]
    minor: u32,
}

impl Step {
    pub fn new(
        id: StepId,
        project_id: impl Into<String>,
        phase: impl Into<String>,
        description: impl Into<String>,
        status: StepStatus,
    ) -> Self {
        let (major, minor) = id.version();
        Self {
            id,
            project_id: project_id.into(),
            phase: phase.into(),
            description: description.into(),
            status,
            major,
            minor,
        }
    }

    pub fn id(&self) -> &StepId {
        &self.id
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn phase(&self) -> &str {
        &self.phase
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn status(&self) -> StepStatus {
        self.status
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    /// Back-convert to the on-disk record.
    pub fn to_record(&self) -> StepRecord {
        StepRecord::new(
            self.id.as_str(),
            self.project_id.as_str(),
            self.phase.as_str(),
            self.description.as_str(),
            self.status,
        )
    }
}

impl TryFrom<StepRecord> for Step {
    type Error = StepError;

    fn try_from(record: StepRecord) -> Result<Self, Self::Error> {
        let status = record.status()?;
        let id = StepId::parse(&record.task_id)?;
        Ok(Step::new(
            id,
            record.project_id,
            record.phase,
            record.description,
            status,
        ))
    }
}

// ---------------------------------------------------------------------------
// Events and transitions
// ---------------------------------------------------------------------------

/// A raw, undebounced change notification from a change source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl RawChange {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// One settled change for a path, carrying the kind of the last raw notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalFileEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl LogicalFileEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

impl fmt::Display for LogicalFileEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.path.display())
    }
}

/// Step-level state change derived from a logical file event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Upsert(Step),
    Remove(StepId),
}

impl Transition {
    pub fn step_id(&self) -> &StepId {
        match self {
            Transition::Upsert(step) => step.id(),
            Transition::Remove(id) => id,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
