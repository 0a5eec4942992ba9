//! Runner module - Process execution layer
//!
//! This module provides a unified interface for running programs:
//! - `PipedRunner`: for solutions (stdin fed from memory, stdout/stderr
//!   captured, wall-clock and memory ceilings enforced)
//! - `RedirectRunner`: for trusted helper scripts (generators, reference
//!   solutions) with file-redirected I/O and a wall-clock deadline only
//!
//! The runner module does NOT:
//! - Compare outputs or determine verdicts
//! - Compile sources
//! - Know about test-case bookkeeping

pub mod piped;
pub mod redirect;

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::io;
use std::time::Duration;

use crate::core::ResourceLimits;

/// Command specification for execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program path or name
    pub program: String,
    /// Arguments to the program
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(|a| a.into()).collect();
        self
    }

    /// Create from a command vector (first element is program, rest are args)
    pub fn from_vec(cmd: &[String]) -> Self {
        let mut iter = cmd.iter();
        let program = iter.next().cloned().unwrap_or_default();
        Self::new(program).with_args(iter.cloned())
    }

    /// Convert to a vector of strings (program + args)
    pub fn to_vec(&self) -> Vec<String> {
        let mut v = vec![self.program.clone()];
        v.extend(self.args.iter().cloned());
        v
    }

    /// Build a tokio command; stdio and process-group setup is left to the runner
    pub(crate) fn to_command(&self) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_vec().join(" "))
    }
}

/// Execution status (raw, no verdict interpretation)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// Program exited normally with given exit code
    Exited(i32),
    /// Killed by signal
    Signaled(i32),
    /// Deadline hit; the process group was killed
    TimeLimitExceeded,
    /// Memory ceiling crossed; the process group was killed
    MemoryLimitExceeded,
    /// The process could not be created
    SpawnFailed { kind: io::ErrorKind, message: String },
    /// OS failure while the child was running (e.g. wait failed)
    SystemError(String),
}

impl RunStatus {
    /// Check if execution was successful (exited with code 0)
    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Exited(0))
    }

    /// Human-readable description for non-successful outcomes
    pub fn describe(&self) -> Option<String> {
        match self {
            RunStatus::Exited(0) => None,
            RunStatus::Exited(code) => Some(format!("Exit code: {}", code)),
            RunStatus::Signaled(signal) => Some(format!("Signal: {}", signal)),
            RunStatus::TimeLimitExceeded => Some("Time limit exceeded".to_string()),
            RunStatus::MemoryLimitExceeded => Some("Memory limit exceeded".to_string()),
            RunStatus::SpawnFailed { message, .. } => Some(message.clone()),
            RunStatus::SystemError(message) => Some(message.clone()),
        }
    }

    pub(crate) fn from_exit_status(status: std::process::ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return RunStatus::Exited(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return RunStatus::Signaled(signal);
            }
        }
        RunStatus::Exited(-1)
    }

    pub(crate) fn spawn_failed(program: &str, err: &io::Error) -> Self {
        RunStatus::SpawnFailed {
            kind: err.kind(),
            message: format!("Failed to spawn {}: {}", program, err),
        }
    }
}

/// Outcome of running a program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub status: RunStatus,
    /// Wall-clock time from spawn to exit or termination
    pub time_ms: u64,
    /// Peak memory observed in KB (0 if never sampled)
    pub memory_kb: u64,
    /// Stdout content, cut at the capture ceiling
    pub stdout: String,
    /// Stderr content, cut at the capture ceiling
    pub stderr: String,
    /// True if either stream produced more than the ceiling
    pub truncated: bool,
}

impl RunOutcome {
    /// Outcome with no captured output
    pub fn bare(status: RunStatus, elapsed: Duration) -> Self {
        Self {
            status,
            time_ms: elapsed.as_millis() as u64,
            memory_kb: 0,
            stdout: String::new(),
            stderr: String::new(),
            truncated: false,
        }
    }

    /// Check if execution was successful
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Runner trait for executing solutions
#[async_trait]
pub trait Runner: Send + Sync {
    /// Run a command with the given limits, feeding `stdin` as its input.
    ///
    /// Spawn failures and limit violations are reported through
    /// [`RunStatus`]; `Err` is reserved for failures of the runner itself.
    async fn run(
        &self,
        cmd: &CommandSpec,
        limits: &ResourceLimits,
        stdin: &str,
    ) -> Result<RunOutcome>;
}

/// Kill the child's whole process group, then the child itself
pub(crate) fn kill_process_tree(child: &mut tokio::process::Child, pid: Option<u32>) {
    kill_process_group(pid);
    let _ = child.start_kill();
}

/// SIGKILL every process in the group led by `pid`.
///
/// Also used after a normal exit to reap descendants that still hold the
/// child's pipes; `ESRCH` then just means none are left.
#[cfg(unix)]
pub(crate) fn kill_process_group(pid: Option<u32>) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid else { return };
    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(err) => tracing::debug!("killpg({}) failed: {}", pid, err),
    }
}

#[cfg(not(unix))]
pub(crate) fn kill_process_group(_pid: Option<u32>) {}

// Re-exports
pub use piped::PipedRunner;
pub use redirect::RedirectRunner;
