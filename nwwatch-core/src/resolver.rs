//! Maps step file paths to canonical [`StepId`]s.

use std::path::Path;

use crate::types::StepId;

/// Extension carried by step files.
pub const STEP_EXTENSION: &str = "json";

/// Derives a step id from the final segment of a path.
///
/// `/steps/01-02.json` resolves to `01-02`; anything that does not name a
/// step (`readme.txt`, `1-2.json`) resolves to `None`. Pure: no I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathResolver;

impl PathResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(&self, path: &Path) -> Option<StepId> {
        let name = path.file_name()?.to_str()?;
        let stem = strip_step_extension(name);
        match StepId::parse(stem) {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::debug!(path = %path.display(), "path does not name a step");
                None
            }
        }
    }
}

/// Step files are read back as `<id>.json`, so only the exact lowercase
/// extension names a step.
fn strip_step_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, STEP_EXTENSION)) => stem,
        _ => name,
    }
}

/// True when `path` carries the step file extension (case-insensitive).
pub fn has_step_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(STEP_EXTENSION))
        .unwrap_or(false)
}
