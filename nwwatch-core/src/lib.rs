//! nwwatch core library: step model, path resolution, step sources, the
//! in-memory step store and the change translator.
//!
//! Public API surface:
//! - [`types`]: [`Step`], [`StepId`], [`StepStatus`], file events, [`Transition`]
//! - [`resolver`]: file path → [`StepId`]
//! - [`source`]: [`StepSource`] capability + [`JsonStepSource`]
//! - [`store`]: [`StepStore`]
//! - [`translator`]: [`ChangeTranslator`]

pub mod error;
pub mod resolver;
pub mod source;
pub mod store;
pub mod translator;
pub mod types;

pub use error::StepError;
pub use resolver::PathResolver;
pub use source::{write_step, JsonStepSource, StepSource};
pub use store::StepStore;
pub use translator::ChangeTranslator;
pub use types::{
    ChangeKind, LogicalFileEvent, RawChange, Step, StepId, StepRecord, StepStatus, Transition,
    Validation,
};
