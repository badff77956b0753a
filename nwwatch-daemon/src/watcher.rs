//! Change sources: producers of raw step-file notifications.
//!
//! [`NotifyChangeSource`] wraps a `notify` watcher on the steps folder. The
//! OS callback runs on notify's own thread and does nothing but filter and
//! push [`RawChange`]s into the core loop's channel.

use std::fs;
use std::path::PathBuf;

use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use nwwatch_core::resolver::has_step_extension;
use nwwatch_core::{ChangeKind, RawChange};

use crate::config::validate_watch_root;
use crate::error::DaemonError;

/// Start/stop capability for anything that reports step file changes.
pub trait ChangeSource: Send {
    /// Begin pushing raw changes into `sink`.
    fn start(&mut self, sink: mpsc::UnboundedSender<RawChange>) -> Result<(), DaemonError>;

    /// Stop producing changes. Idempotent.
    fn stop(&mut self);
}

/// Non-recursive filesystem watch on the steps folder.
pub struct NotifyChangeSource {
    dir: PathBuf,
    active: Option<ActiveWatch>,
}

struct ActiveWatch {
    watcher: RecommendedWatcher,
    /// Canonical path handed to `watch`; `unwatch` must use the same one.
    root: PathBuf,
}

impl std::fmt::Debug for NotifyChangeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyChangeSource")
            .field("dir", &self.dir)
            .field("running", &self.is_running())
            .finish()
    }
}

impl NotifyChangeSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            active: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Tear down the active watch. `Ok(false)` when nothing was running.
    fn release(&mut self) -> Result<bool, DaemonError> {
        let Some(mut active) = self.active.take() else {
            return Ok(false);
        };
        active.watcher.unwatch(&active.root)?;
        tracing::info!(path = %active.root.display(), "stopped watching steps folder");
        Ok(true)
    }
}

impl ChangeSource for NotifyChangeSource {
    fn start(&mut self, sink: mpsc::UnboundedSender<RawChange>) -> Result<(), DaemonError> {
        if self.is_running() {
            return Err(DaemonError::AlreadyWatching);
        }
        validate_watch_root(&self.dir)?;

        // Canonicalize so that FSEvents paths (real paths such as
        // /private/var/... on macOS) line up with the watched root.
        let root = fs::canonicalize(&self.dir).unwrap_or_else(|_| self.dir.clone());

        let mut watcher = recommended_watcher(move |event: notify::Result<Event>| match event {
            Ok(event) => {
                for change in raw_changes(&event) {
                    let _ = sink.send(change);
                }
            }
            Err(err) => tracing::warn!(error = %err, "watcher event error"),
        })?;
        watcher.watch(&root, RecursiveMode::NonRecursive)?;
        tracing::info!(path = %root.display(), "watching steps folder");

        self.active = Some(ActiveWatch { watcher, root });
        Ok(())
    }

    fn stop(&mut self) {
        if let Err(err) = self.release() {
            tracing::warn!(path = %self.dir.display(), error = %err, "failed to unwatch steps folder");
        }
    }
}

impl Drop for NotifyChangeSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Map one notify event onto zero or more step file changes.
///
/// Directories and files without the step extension are dropped here, so
/// they never reach the debouncer.
pub fn raw_changes(event: &Event) -> Vec<RawChange> {
    let changes: Vec<(PathBuf, ChangeKind)> = match &event.kind {
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => Vec::new(),
        EventKind::Create(_) => tagged(&event.paths, ChangeKind::Created),
        EventKind::Remove(_) => tagged(&event.paths, ChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Name(mode)) => renamed(&event.paths, *mode),
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => tagged(&event.paths, ChangeKind::Modified),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    };

    changes
        .into_iter()
        .filter(|(path, _)| has_step_extension(path) && !path.is_dir())
        .map(|(path, kind)| RawChange::new(path, kind))
        .collect()
}

fn tagged(paths: &[PathBuf], kind: ChangeKind) -> Vec<(PathBuf, ChangeKind)> {
    paths.iter().map(|path| (path.clone(), kind)).collect()
}

fn renamed(paths: &[PathBuf], mode: RenameMode) -> Vec<(PathBuf, ChangeKind)> {
    match mode {
        RenameMode::From => tagged(paths, ChangeKind::Deleted),
        RenameMode::To => tagged(paths, ChangeKind::Created),
        RenameMode::Both => {
            let mut changes = Vec::new();
            if let Some(from) = paths.first() {
                changes.push((from.clone(), ChangeKind::Deleted));
            }
            if let Some(to) = paths.get(1) {
                changes.push((to.clone(), ChangeKind::Created));
            }
            changes
        }
        // Platform could not tell which side of the rename this is.
        RenameMode::Any | RenameMode::Other => paths
            .iter()
            .map(|path| {
                let kind = if path.exists() {
                    ChangeKind::Created
                } else {
                    ChangeKind::Deleted
                };
                (path.clone(), kind)
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, DataChange, MetadataKind};
    use tempfile::TempDir;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for path in paths {
            event = event.add_path(PathBuf::from(path));
        }
        event
    }

    #[test]
    fn create_modify_remove_map_to_change_kinds() {
        let created = raw_changes(&event(EventKind::Create(CreateKind::File), &["/s/01-01.json"]));
        assert_eq!(created, vec![RawChange::new("/s/01-01.json", ChangeKind::Created)]);

        let modified = raw_changes(&event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/s/01-01.json"],
        ));
        assert_eq!(modified, vec![RawChange::new("/s/01-01.json", ChangeKind::Modified)]);

        let removed = raw_changes(&event(EventKind::Remove(RemoveKind::File), &["/s/01-01.json"]));
        assert_eq!(removed, vec![RawChange::new("/s/01-01.json", ChangeKind::Deleted)]);
    }

    #[test]
    fn non_json_and_noise_events_are_filtered() {
        assert!(raw_changes(&event(EventKind::Create(CreateKind::File), &["/s/readme.txt"])).is_empty());
        assert!(raw_changes(&event(EventKind::Create(CreateKind::File), &["/s/01-01.json.tmp"])).is_empty());
        assert!(raw_changes(&event(EventKind::Create(CreateKind::Folder), &["/s/02-01.json"])).is_empty());
        assert!(raw_changes(&event(EventKind::Access(AccessKind::Any), &["/s/01-01.json"])).is_empty());
        assert!(raw_changes(&event(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
            &["/s/01-01.json"]
        ))
        .is_empty());
    }

    #[test]
    fn atomic_rename_reports_the_final_file_as_created() {
        let changes = raw_changes(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/s/01-01.json.tmp", "/s/01-01.json"],
        ));
        assert_eq!(changes, vec![RawChange::new("/s/01-01.json", ChangeKind::Created)]);
    }

    #[test]
    fn rename_away_reports_deleted() {
        let changes = raw_changes(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            &["/s/01-01.json"],
        ));
        assert_eq!(changes, vec![RawChange::new("/s/01-01.json", ChangeKind::Deleted)]);
    }

    #[test]
    fn start_fails_for_missing_folder() {
        let dir = TempDir::new().expect("tempdir");
        let mut source = NotifyChangeSource::new(dir.path().join("missing"));
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(matches!(source.start(tx), Err(DaemonError::WatchRootMissing { .. })));
        assert!(!source.is_running());
    }

    #[test]
    fn double_start_is_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let mut source = NotifyChangeSource::new(dir.path());
        let (tx, _rx) = mpsc::unbounded_channel();
        source.start(tx.clone()).expect("first start");
        assert!(matches!(source.start(tx), Err(DaemonError::AlreadyWatching)));
        source.stop();
        assert!(!source.is_running());
    }

    #[test]
    fn stop_unwatches_the_canonical_root() {
        let dir = TempDir::new().expect("tempdir");
        fs::create_dir(dir.path().join("sub")).expect("mkdir");
        let mut source = NotifyChangeSource::new(dir.path().join("sub").join(".."));
        let (tx, _rx) = mpsc::unbounded_channel();
        source.start(tx).expect("start");

        let canonical = fs::canonicalize(dir.path()).expect("canonical");
        assert_eq!(source.active.as_ref().map(|a| a.root.clone()), Some(canonical));
        assert!(source.release().expect("unwatch"));
        assert!(!source.release().expect("second release"));
    }
}
