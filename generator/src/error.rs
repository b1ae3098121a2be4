use std::path::PathBuf;

use studygen::{BlockError, TemplateError};
use thiserror::Error;

/// Errors raised while resolving, merging or rendering a generation target.
///
/// Cloneable so that a target which fails to prepare can be reported once
/// for every scan combination that depended on it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Block(#[from] BlockError),

    #[error("signature conflict: parameter '{parameter}' is declared as {first} and as {second}")]
    SignatureConflict {
        parameter: String,
        first: String,
        second: String,
    },

    #[error("block '{block}': requested output '{output}' is not produced by any merged block")]
    UnreachableOutput { block: String, output: String },

    #[error("import conflict: module '{module}' is imported as `{first}` and as `{second}`")]
    ImportConflict {
        module: String,
        first: String,
        second: String,
    },

    #[error("block '{block}' depends on '{dependency}', which is not in the registry")]
    MissingDependency { block: String, dependency: String },

    #[error("block '{block}' is already defined")]
    DuplicateDefinition { block: String },

    #[error("target '{target}' uses unknown block '{block}'")]
    UnknownBlock { block: String, target: String },

    #[error("unknown generation target '{0}'")]
    UnknownTarget(String),

    #[error("parameter '{parameter}' has no configured value and is not scanned")]
    MissingParameter { parameter: String },

    #[error("invalid scan of '{parameter}': {reason}")]
    InvalidScan { parameter: String, reason: String },

    #[error("two artifacts of target '{target}' would be written to {}", path.display())]
    DuplicateOutput { target: String, path: PathBuf },

    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    #[error("cannot write {}: {message}", path.display())]
    Io { path: PathBuf, message: String },
}

/// Errors raised while loading an input document.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {message}", path.display())]
    Yaml {
        path: PathBuf,
        message: String,
        /// Byte offset of the offending token, when known.
        location: Option<usize>,
    },

    #[error(
        "{}: {message}\nhint: to invoke the same block twice in a script, suffix the repeated key, e.g. `power__2`",
        path.display()
    )]
    DuplicateKey { path: PathBuf, message: String },

    #[error("{}: {message}", path.display())]
    Shape { path: PathBuf, message: String },
}

impl DocumentError {
    pub(crate) fn from_yaml(path: PathBuf, err: serde_yaml::Error) -> Self {
        let message = err.to_string();
        if message.contains("duplicate entry") {
            return DocumentError::DuplicateKey { path, message };
        }
        DocumentError::Yaml {
            path,
            location: err.location().map(|loc| loc.index()),
            message,
        }
    }

    pub fn path(&self) -> &PathBuf {
        match self {
            DocumentError::Io { path, .. }
            | DocumentError::Yaml { path, .. }
            | DocumentError::DuplicateKey { path, .. }
            | DocumentError::Shape { path, .. } => path,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
