use serde::{Deserialize, Serialize};
use std::fmt;

use crate::runner::RunStatus;

/// Verdict of a single test-case run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "AC")]
    Accepted,
    #[serde(rename = "WA")]
    WrongAnswer,
    #[serde(rename = "TLE")]
    TimeLimitExceeded,
    #[serde(rename = "MLE")]
    MemoryLimitExceeded,
    #[serde(rename = "RE")]
    RuntimeError,
    #[serde(rename = "CE")]
    CompileError,
    #[serde(rename = "SE")]
    SystemError,
}

impl Verdict {
    /// Short code as printed in reports ("AC", "WA", ...)
    pub fn code(&self) -> &'static str {
        match self {
            Verdict::Accepted => "AC",
            Verdict::WrongAnswer => "WA",
            Verdict::TimeLimitExceeded => "TLE",
            Verdict::MemoryLimitExceeded => "MLE",
            Verdict::RuntimeError => "RE",
            Verdict::CompileError => "CE",
            Verdict::SystemError => "SE",
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Map a finished run to a verdict.
///
/// First match wins: memory ceiling, deadline, abnormal exit, spawn or
/// system failure. Only a clean `Exited(0)` reaches `check`, so the output
/// comparison is skipped for every other outcome.
pub fn classify(status: &RunStatus, check: impl FnOnce() -> Verdict) -> Verdict {
    match status {
        RunStatus::MemoryLimitExceeded => Verdict::MemoryLimitExceeded,
        RunStatus::TimeLimitExceeded => Verdict::TimeLimitExceeded,
        RunStatus::Exited(0) => check(),
        RunStatus::Exited(_) | RunStatus::Signaled(_) => Verdict::RuntimeError,
        RunStatus::SpawnFailed { kind, .. } if status_is_invocation_error(*kind) => {
            Verdict::RuntimeError
        }
        RunStatus::SpawnFailed { .. } | RunStatus::SystemError(_) => Verdict::SystemError,
    }
}

/// Spawn failures the user can fix (missing interpreter, non-executable file)
fn status_is_invocation_error(kind: std::io::ErrorKind) -> bool {
    matches!(
        kind,
        std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
    )
}
