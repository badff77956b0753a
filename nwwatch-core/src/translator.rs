//! Turns one settled file event into a step-level [`Transition`].
//!
//! Created and modified events take the same path: re-read the step and
//! upsert it. Only the resulting content matters to the step model.

use std::sync::Arc;

use crate::resolver::PathResolver;
use crate::source::StepSource;
use crate::store::StepStore;
use crate::types::{ChangeKind, LogicalFileEvent, Transition};

#[derive(Clone)]
pub struct ChangeTranslator {
    source: Arc<dyn StepSource>,
    resolver: PathResolver,
}

impl std::fmt::Debug for ChangeTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeTranslator").finish_non_exhaustive()
    }
}

impl ChangeTranslator {
    pub fn new(source: Arc<dyn StepSource>) -> Self {
        Self {
            source,
            resolver: PathResolver::new(),
        }
    }

    pub fn source(&self) -> &dyn StepSource {
        self.source.as_ref()
    }

    /// Apply `event` to `store`, returning the transition to broadcast, if any.
    pub fn apply(&self, store: &mut StepStore, event: &LogicalFileEvent) -> Option<Transition> {
        let Some(id) = self.resolver.resolve(&event.path) else {
            tracing::debug!(path = %event.path.display(), "resolution failed, ignoring change");
            return None;
        };

        match event.kind {
            ChangeKind::Deleted => match store.remove(&id) {
                Some(_) => Some(Transition::Remove(id)),
                None => {
                    tracing::info!(task_id = %id, "delete of unknown step, nothing to broadcast");
                    None
                }
            },
            ChangeKind::Created | ChangeKind::Modified => match self.source.refresh(&id) {
                Some(step) => {
                    store.upsert(step.clone());
                    Some(Transition::Upsert(step))
                }
                None => {
                    tracing::warn!(
                        task_id = %id,
                        kind = %event.kind,
                        "refresh failed after change",
                    );
                    None
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use tempfile::TempDir;

    use crate::source::{write_step, JsonStepSource};
    use crate::types::{StepId, StepRecord, StepStatus};

    fn setup() -> (TempDir, ChangeTranslator, StepStore) {
        let dir = TempDir::new().expect("tempdir");
        let source = Arc::new(JsonStepSource::new(dir.path()));
        let translator = ChangeTranslator::new(source.clone());
        let mut store = StepStore::new();
        store.ensure_loaded(source.as_ref());
        (dir, translator, store)
    }

    fn event(dir: &TempDir, name: &str, kind: ChangeKind) -> LogicalFileEvent {
        LogicalFileEvent::new(dir.path().join(name), kind)
    }

    #[test]
    fn created_file_becomes_upsert() {
        let (dir, translator, mut store) = setup();
        write_step(
            dir.path(),
            &StepRecord::new("01-01", "p", "research", "d", StepStatus::Pending),
        )
        .expect("write");

        let transition = translator
            .apply(&mut store, &event(&dir, "01-01.json", ChangeKind::Created))
            .expect("transition");
        match transition {
            Transition::Upsert(step) => assert_eq!(step.status(), StepStatus::Pending),
            other => panic!("expected upsert, got {other:?}"),
        }
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn repeated_modify_of_unchanged_file_is_idempotent() {
        let (dir, translator, mut store) = setup();
        write_step(
            dir.path(),
            &StepRecord::new("01-01", "p", "research", "d", StepStatus::InProgress),
        )
        .expect("write");

        let modified = event(&dir, "01-01.json", ChangeKind::Modified);
        let first = translator.apply(&mut store, &modified).expect("first");
        let second = translator.apply(&mut store, &modified).expect("second");
        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
        let id = StepId::parse("01-01").expect("id");
        assert_eq!(store.get(&id).map(|s| s.status()), Some(StepStatus::InProgress));
    }

    #[test]
    fn delete_of_known_step_becomes_remove() {
        let (dir, translator, mut store) = setup();
        let path = write_step(
            dir.path(),
            &StepRecord::new("01-01", "p", "research", "d", StepStatus::Pending),
        )
        .expect("write");
        translator.apply(&mut store, &event(&dir, "01-01.json", ChangeKind::Created));
        fs::remove_file(path).expect("remove");

        let transition = translator.apply(&mut store, &event(&dir, "01-01.json", ChangeKind::Deleted));
        assert_eq!(
            transition,
            Some(Transition::Remove(StepId::parse("01-01").expect("id")))
        );
        assert!(store.is_empty());
    }

    #[test]
    fn delete_of_unknown_step_yields_nothing() {
        let (dir, translator, mut store) = setup();
        assert!(translator
            .apply(&mut store, &event(&dir, "07-07.json", ChangeKind::Deleted))
            .is_none());
    }

    #[test]
    fn unresolvable_path_yields_nothing() {
        let (dir, translator, mut store) = setup();
        fs::write(dir.path().join("notes.json"), "{}").expect("write");
        assert!(translator
            .apply(&mut store, &event(&dir, "notes.json", ChangeKind::Modified))
            .is_none());
    }

    #[test]
    fn case_variant_sibling_does_not_touch_the_step() {
        let (dir, translator, mut store) = setup();
        let live = write_step(
            dir.path(),
            &StepRecord::new("01-01", "p", "research", "d", StepStatus::Pending),
        )
        .expect("write");
        translator.apply(&mut store, &event(&dir, "01-01.json", ChangeKind::Created));

        let sibling = dir.path().join("01-01.JSON");
        fs::write(&sibling, "{}").expect("write sibling");
        assert!(translator
            .apply(&mut store, &event(&dir, "01-01.JSON", ChangeKind::Created))
            .is_none());
        fs::remove_file(&sibling).expect("remove sibling");
        assert!(translator
            .apply(&mut store, &event(&dir, "01-01.JSON", ChangeKind::Deleted))
            .is_none());

        assert!(live.exists());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn malformed_file_leaves_previous_value_in_place() {
        let (dir, translator, mut store) = setup();
        write_step(
            dir.path(),
            &StepRecord::new("01-01", "p", "research", "d", StepStatus::Completed),
        )
        .expect("write");
        translator.apply(&mut store, &event(&dir, "01-01.json", ChangeKind::Created));

        fs::write(dir.path().join("01-01.json"), "{ truncated").expect("write");
        assert!(translator
            .apply(&mut store, &event(&dir, "01-01.json", ChangeKind::Modified))
            .is_none());
        let id = StepId::parse("01-01").expect("id");
        assert_eq!(store.get(&id).map(|s| s.status()), Some(StepStatus::Completed));
    }
}
