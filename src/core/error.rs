//! Errors that abort judging before any test case runs

use std::io;
use thiserror::Error;

/// Failures of the judge itself.
///
/// Per-case outcomes such as `RE` or `TLE` are not errors; they are
/// reported as [`Verdict`](super::Verdict) values inside a `JudgeResult`.
#[derive(Debug, Error)]
pub enum JudgeError {
    /// Untrusted path content rejected before any tool was invoked
    #[error("Invalid source file path: {0}")]
    InvalidInput(String),

    /// No candidate build succeeded; carries the compiler diagnostics
    #[error("{0}")]
    CompileError(String),

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl JudgeError {
    /// True for failures that mean "no executable exists for this solution"
    pub fn is_compile_failure(&self) -> bool {
        matches!(
            self,
            JudgeError::CompileError(_) | JudgeError::InvalidInput(_)
        )
    }
}
