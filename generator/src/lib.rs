pub mod documents;
pub mod error;
pub mod merge;
pub mod registry;
pub mod render;
pub mod scan;
pub mod study;

pub use documents::{Configuration, MasterSpec, TargetSpec};
pub use error::{DocumentError, EngineError, EngineResult};
pub use merge::merge;
pub use registry::{PreparedTarget, Registry, materialize_parameters, resolve_target};
pub use render::{DEFAULT_TEMPLATE, render_artifact, render_block};
pub use scan::{Combination, ScanAxis, expand};
pub use study::{GeneratedArtifact, JobFailure, Study, StudyOptions, StudyReport, plan};
