use std::fmt;

use thiserror::Error;

/// Which side of a block signature a rename touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignaturePart {
    Argument,
    Output,
}

impl fmt::Display for SignaturePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignaturePart::Argument => write!(f, "argument"),
            SignaturePart::Output => write!(f, "output"),
        }
    }
}

/// Errors raised while constructing or renaming a single block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    #[error("block '{block}': expected {expected} {part} name(s), got {found}")]
    ArityMismatch {
        block: String,
        part: SignaturePart,
        expected: usize,
        found: usize,
    },

    #[error(
        "signature conflict in block '{block}': {part} '{name}' has type {found}, but the signature declares {expected}"
    )]
    TypeMismatch {
        block: String,
        part: SignaturePart,
        name: String,
        expected: String,
        found: String,
    },

    #[error("block '{block}': invalid return annotation '{annotation}': {reason}")]
    InvalidAnnotation {
        block: String,
        annotation: String,
        reason: String,
    },

    #[error("block '{block}': output name '{name}' is given more than once")]
    DuplicateOutput { block: String, name: String },

    #[error("block '{block}': parameter '{parameter}' {reason}")]
    ParameterMismatch {
        block: String,
        parameter: String,
        reason: String,
    },

    #[error("block '{name}' is defined more than once")]
    DuplicateBlock { name: String },
}

/// Errors raised while parsing or filling a text template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unterminated placeholder starting at byte {0}")]
    Unterminated(usize),

    #[error("empty placeholder at byte {0}")]
    EmptyPlaceholder(usize),

    #[error("template field '{0}' has no value")]
    UnknownField(String),
}
