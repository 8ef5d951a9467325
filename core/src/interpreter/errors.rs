//! Runtime errors and internal consistency failures
//!
//! Construction problems are not errors in this sense: they are collected as
//! [`Diagnostic`](super::diagnostics::Diagnostic)s. A `RuntimeError` aborts the
//! statement chain currently executing; inside a trigger condition it only
//! means "not ready yet".

use std::path::PathBuf;

use thiserror::Error;

use super::diagnostics::Diagnostics;

/// Failure while evaluating or executing against a frame
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("no value bound to '{0}'")]
    Unbound(String),

    #[error("no such index")]
    NoSuchIndex,

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("cannot iterate over a value of type {0}")]
    NotIterable(String),

    #[error("while loop exceeded {0} iterations")]
    IterationLimit(u64),
}

/// A script unit could not be loaded
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("{name}: {} construction error(s)", diagnostics.error_count())]
    Construction {
        name: String,
        diagnostics: Diagnostics,
    },

    #[error("invalid script unit: {0}")]
    Format(#[from] serde_json::Error),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Report a broken engine invariant and abort.
///
/// Reaching this means a check that construction should have enforced was
/// bypassed; it is never the script's fault.
#[track_caller]
pub fn internal_error(msg: &str) -> ! {
    tracing::error!(target: "sift::internal", "internal error: {}", msg);
    panic!("internal error: {}", msg);
}
