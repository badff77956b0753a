//! Authoritative in-memory mapping of step id → step.
//!
//! Lazily filled by a full scan of a [`StepSource`] on first read, then kept in
//! sync one transition at a time. Never persisted.

use std::collections::HashMap;

use crate::source::StepSource;
use crate::types::{Step, StepId};

#[derive(Debug, Default)]
pub struct StepStore {
    steps: HashMap<StepId, Step>,
    loaded: bool,
}

impl StepStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Perform the initial full scan if it has not happened yet.
    ///
    /// Returns the number of steps held afterwards.
    pub fn ensure_loaded(&mut self, source: &dyn StepSource) -> usize {
        if !self.loaded {
            let steps = source.list_all();
            self.steps = steps
                .into_iter()
                .map(|step| (step.id().clone(), step))
                .collect();
            self.loaded = true;
            tracing::debug!(count = self.steps.len(), "loaded steps into store");
        }
        self.steps.len()
    }

    /// Every step, in no particular order. Triggers the lazy load.
    pub fn all(&mut self, source: &dyn StepSource) -> Vec<Step> {
        self.ensure_loaded(source);
        self.steps.values().cloned().collect()
    }

    pub fn get(&self, id: &StepId) -> Option<&Step> {
        self.steps.get(id)
    }

    /// Insert or replace by id, returning the previous value.
    pub fn upsert(&mut self, step: Step) -> Option<Step> {
        self.steps.insert(step.id().clone(), step)
    }

    /// Delete by id, returning the previous value if there was one.
    pub fn remove(&mut self, id: &StepId) -> Option<Step> {
        self.steps.remove(id)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
