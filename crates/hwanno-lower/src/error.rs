//! Errors and diagnostics produced while lowering annotations.
//!
//! Every [`LowerError`] is localized to a single annotation or a single wiring
//! problem. The pass records each one as a [`Diagnostic`] and keeps going;
//! [`PassFailure`] is only returned once the whole worklist has drained.

use std::fmt;

use hwanno_core::{Annotation, CoreError};
use thiserror::Error;

use crate::pass::LowerReport;

/// A failure to lower one annotation or to resolve one wiring problem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LowerError {
    /// The target path could not be split into tokens.
    #[error("cannot tokenize annotation path '{path}'")]
    Tokenize {
        /// The raw path as it appeared in the annotation.
        path: String,
    },

    /// The tokens do not name an existing entity.
    #[error("cannot resolve target '{path}': {reason}")]
    Resolution {
        /// The canonicalized path.
        path: String,
        /// What did not match.
        reason: String,
    },

    /// The annotation has no `class` field.
    #[error("annotation without a class")]
    Classless,

    /// No handler is registered for the class.
    #[error("unhandled annotation class '{class}'")]
    UnhandledClass { class: String },

    /// A local-only class was used with a non-local target.
    #[error(
        "target '{target}' is reached through an instance path, but annotation class \
         '{class}' cannot be non-local"
    )]
    NonLocalNotAllowed { class: String, target: String },

    /// The applier rejected the resolved target.
    #[error("unable to apply annotation '{class}': {reason}")]
    Apply { class: String, reason: String },

    /// An endpoint module of a wiring problem does not have exactly one
    /// absolute path.
    #[error(
        "wiring problem {problem}: module '{module}' has {count} instance paths, expected exactly one"
    )]
    AmbiguousPath {
        /// Index of the wiring problem.
        problem: usize,
        /// Name of the endpoint module.
        module: String,
        /// Number of absolute paths found.
        count: usize,
    },

    /// The design itself was malformed.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// A recorded error together with the annotation being processed.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub error: LowerError,
    pub annotation: Option<Annotation>,
}

impl Diagnostic {
    pub fn new(error: LowerError) -> Self {
        Diagnostic {
            error,
            annotation: None,
        }
    }

    pub fn with_annotation(error: LowerError, annotation: &Annotation) -> Self {
        Diagnostic {
            error,
            annotation: Some(annotation.clone()),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error: {}", self.error)?;
        if let Some(annotation) = &self.annotation {
            write!(f, "\n  note: see current annotation: {}", annotation)?;
        }
        Ok(())
    }
}

/// The pass finished with at least one recorded failure. All successful
/// mutations are kept in the design.
#[derive(Debug, Error)]
#[error("annotation lowering failed with {} error(s)", report.diagnostics.len())]
pub struct PassFailure {
    pub report: LowerReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_renders_note_with_annotation() {
        let anno = Annotation::targeted("circt.testLocalOnly", "~Top|Top/a:A>w");
        let diag = Diagnostic::with_annotation(
            LowerError::NonLocalNotAllowed {
                class: "circt.testLocalOnly".into(),
                target: "~Top|Top/a:A>w".into(),
            },
            &anno,
        );
        let text = diag.to_string();
        assert!(text.starts_with("error: target '~Top|Top/a:A>w'"));
        assert!(text.contains("cannot be non-local"));
        assert!(text.contains("note: see current annotation: {\"class\":\"circt.testLocalOnly\""));
    }

    #[test]
    fn core_errors_convert() {
        let err: LowerError = CoreError::ModuleNotFound { name: "X".into() }.into();
        assert_eq!(err.to_string(), "module not found: 'X'");
    }
}
