//! Step sources: where step values are read from.
//!
//! [`StepSource`] is the capability the store and translator depend on;
//! [`JsonStepSource`] is the folder-of-JSON-files implementation.
//!
//! # Storage layout
//!
//! ```text
//! <steps_dir>/
//!   01-01.json
//!   01-02.json
//!   notes.txt      (ignored: not a step file)
//! ```
//!
//! Reads never fail to the caller: malformed files are logged with their
//! path and treated as absent.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{io_err, StepError};
use crate::resolver::{has_step_extension, PathResolver};
use crate::types::{Step, StepId, StepRecord};

/// Read access to the backing store of steps. No caching: every call re-reads.
pub trait StepSource: Send + Sync {
    /// Read and validate a single step. `None` when missing or malformed.
    fn read_one(&self, id: &StepId) -> Option<Step>;

    /// Every step currently readable from the backing store.
    ///
    /// Members that fail to read are omitted; one bad file never fails the scan.
    fn list_all(&self) -> Vec<Step>;

    /// Force a fresh read of one step.
    fn refresh(&self, id: &StepId) -> Option<Step> {
        self.read_one(id)
    }
}

/// Reads steps from `<dir>/<id>.json`.
#[derive(Debug, Clone)]
pub struct JsonStepSource {
    dir: PathBuf,
    resolver: PathResolver,
}

impl JsonStepSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            resolver: PathResolver::new(),
        }
    }

    /// `<dir>/<id>.json`, pure, no I/O.
    pub fn path_for(&self, id: &StepId) -> PathBuf {
        step_path_at(&self.dir, id)
    }

    /// Load one step file, surfacing the failure reason.
    pub fn load(&self, id: &StepId) -> Result<Step, StepError> {
        let path = self.path_for(id);
        let step = load_step_file(&path)?;
        if step.id() != id {
            return Err(StepError::IdMismatch {
                path,
                expected: id.to_string(),
                found: step.id().to_string(),
            });
        }
        Ok(step)
    }

    /// Load every step file in the folder, keeping each failure reason.
    ///
    /// Only enumeration errors fail the whole scan.
    pub fn scan(&self) -> Result<Vec<(StepId, Result<Step, StepError>)>, StepError> {
        Ok(self
            .member_ids()?
            .into_iter()
            .map(|id| {
                let loaded = self.load(&id);
                (id, loaded)
            })
            .collect())
    }

    fn member_ids(&self) -> Result<Vec<StepId>, StepError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| io_err(&self.dir, e))?;
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&self.dir, e))?;
            let path = entry.path();
            if !has_step_extension(&path) || path.is_dir() {
                continue;
            }
            if let Some(id) = self.resolver.resolve(&path) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

impl StepSource for JsonStepSource {
    fn read_one(&self, id: &StepId) -> Option<Step> {
        match self.load(id) {
            Ok(step) => Some(step),
            Err(StepError::Io { ref source, ref path }) if source.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "step file not found");
                None
            }
            Err(err) => {
                tracing::warn!(task_id = %id, error = %err, "skipping invalid step file");
                None
            }
        }
    }

    fn list_all(&self) -> Vec<Step> {
        let ids = match self.member_ids() {
            Ok(ids) => ids,
            Err(err) => {
                tracing::warn!(error = %err, "failed to enumerate steps directory");
                return Vec::new();
            }
        };
        ids.iter().filter_map(|id| self.read_one(id)).collect()
    }
}

/// `<dir>/<id>.json`
pub fn step_path_at(dir: &Path, id: &StepId) -> PathBuf {
    dir.join(format!("{id}.json"))
}

/// Parse a single step file.
pub fn load_step_file(path: &Path) -> Result<Step, StepError> {
    let contents = fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let record: StepRecord = serde_json::from_str(&contents).map_err(|source| StepError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    Step::try_from(record)
}

/// Write one step file atomically.
///
/// Writes `<id>.json.tmp` then renames it over `<id>.json`, so watchers see a
/// single complete file. Returns the final path.
pub fn write_step(dir: &Path, record: &StepRecord) -> Result<PathBuf, StepError> {
    let id = StepId::parse(&record.task_id)?;
    fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let path = step_path_at(dir, &id);
    let json = serde_json::to_string_pretty(record).map_err(|source| StepError::Json {
        path: path.clone(),
        source,
    })?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
    fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StepStatus;
    use tempfile::TempDir;

    fn id(raw: &str) -> StepId {
        StepId::parse(raw).expect("valid id")
    }

    #[test]
    fn write_then_read_round_trips_all_fields() {
        let dir = TempDir::new().expect("tempdir");
        let record = StepRecord::new("02-03", "nwave", "design", "Define API contracts", StepStatus::Failed);
        write_step(dir.path(), &record).expect("write");

        let step = JsonStepSource::new(dir.path())
            .read_one(&id("02-03"))
            .expect("step readable");
        assert_eq!(step.to_record(), record);
        assert_eq!((step.major(), step.minor()), (2, 3));
        assert!(!dir.path().join("02-03.json.tmp").exists(), "tmp file renamed away");
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = TempDir::new().expect("tempdir");
        assert!(JsonStepSource::new(dir.path()).read_one(&id("01-01")).is_none());
    }

    #[test]
    fn malformed_json_reads_as_none() {
        let dir = TempDir::new().expect("tempdir");
        fs::write(dir.path().join("01-01.json"), r#"{ "task_id": "bad", invalid json here }"#)
            .expect("write");
        let source = JsonStepSource::new(dir.path());
        assert!(source.read_one(&id("01-01")).is_none());
        assert!(matches!(source.load(&id("01-01")), Err(StepError::Json { .. })));
    }

    #[test]
    fn missing_required_field_reads_as_none() {
        let dir = TempDir::new().expect("tempdir");
        fs::write(
            dir.path().join("01-01.json"),
            r#"{"task_id":"01-01","project_id":"p","phase":"x"}"#,
        )
        .expect("write");
        assert!(JsonStepSource::new(dir.path()).read_one(&id("01-01")).is_none());
    }

    #[test]
    fn task_id_must_match_file_name() {
        let dir = TempDir::new().expect("tempdir");
        let record = StepRecord::new("01-02", "p", "x", "d", StepStatus::Pending);
        let body = serde_json::to_string(&record).expect("encode");
        fs::write(dir.path().join("01-01.json"), body).expect("write");

        let source = JsonStepSource::new(dir.path());
        assert!(source.read_one(&id("01-01")).is_none());
        assert!(matches!(source.load(&id("01-01")), Err(StepError::IdMismatch { .. })));
    }

    #[test]
    fn list_all_skips_bad_members_and_foreign_files() {
        let dir = TempDir::new().expect("tempdir");
        for (task, status) in [("01-01", StepStatus::Completed), ("01-02", StepStatus::Pending)] {
            write_step(dir.path(), &StepRecord::new(task, "p", "research", "d", status))
                .expect("write");
        }
        fs::write(dir.path().join("01-03.json"), "{ not json").expect("write");
        fs::write(dir.path().join("readme.txt"), "hello").expect("write");
        fs::write(dir.path().join("config.json"), "{}").expect("write");
        fs::create_dir(dir.path().join("02-01.json")).expect("mkdir");

        let steps = JsonStepSource::new(dir.path()).list_all();
        let ids: Vec<&str> = steps.iter().map(|s| s.id().as_str()).collect();
        assert_eq!(ids, vec!["01-01", "01-02"]);
    }

    #[test]
    fn scan_reports_failures_per_member() {
        let dir = TempDir::new().expect("tempdir");
        write_step(dir.path(), &StepRecord::new("01-01", "p", "x", "d", StepStatus::Skipped))
            .expect("write");
        fs::write(
            dir.path().join("01-02.json"),
            r#"{"task_id":"01-02","project_id":"p","phase":"x","description":"d","validation":{"status":"done"}}"#,
        )
        .expect("write");

        let scanned = JsonStepSource::new(dir.path()).scan().expect("scan");
        assert_eq!(scanned.len(), 2);
        assert!(scanned[0].1.is_ok());
        assert!(matches!(scanned[1].1, Err(StepError::InvalidStatus(_))));

        let missing = JsonStepSource::new(dir.path().join("nope"));
        assert!(matches!(missing.scan(), Err(StepError::Io { .. })));
    }

    #[test]
    fn list_all_on_missing_dir_is_empty() {
        let dir = TempDir::new().expect("tempdir");
        let source = JsonStepSource::new(dir.path().join("nope"));
        assert!(source.list_all().is_empty());
    }

    #[test]
    fn write_rejects_invalid_task_id() {
        let dir = TempDir::new().expect("tempdir");
        let record = StepRecord::new("1-1", "p", "x", "d", StepStatus::Pending);
        assert!(matches!(write_step(dir.path(), &record), Err(StepError::InvalidId(_))));
    }
}
