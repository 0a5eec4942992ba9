//! Redirect runner implementation
//!
//! Executes trusted helper commands (test generators, reference solutions)
//! through the platform shell with stdin/stdout bound to files. Only a
//! wall-clock deadline is enforced; nothing is captured or sampled.

use std::fs::File;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::{kill_process_tree, RunOutcome, RunStatus};
use crate::config::JudgeConfig;

/// Runner for shell commands with file-redirected I/O
#[derive(Debug, Clone)]
pub struct RedirectRunner {
    kill_grace: Duration,
}

impl RedirectRunner {
    pub fn new(config: &JudgeConfig) -> Self {
        Self {
            kill_grace: config.drain_grace(),
        }
    }

    /// Run `command` in the shell.
    ///
    /// Without an input file the child reads from an empty stdin; without an
    /// output file its stdout goes to ours. Stderr is always inherited.
    pub async fn run(
        &self,
        command: &str,
        input: Option<&Path>,
        output: Option<&Path>,
        time_limit_ms: u64,
    ) -> RunOutcome {
        debug!(
            "Running redirected: {} < {:?} > {:?}",
            command, input, output
        );
        let started = Instant::now();

        let stdin = match input {
            Some(path) => match File::open(path) {
                Ok(file) => Stdio::from(file),
                Err(err) => {
                    return RunOutcome::bare(
                        RunStatus::spawn_failed(&path.display().to_string(), &err),
                        started.elapsed(),
                    )
                }
            },
            None => Stdio::null(),
        };
        let stdout = match output {
            Some(path) => match File::create(path) {
                Ok(file) => Stdio::from(file),
                Err(err) => {
                    return RunOutcome::bare(
                        RunStatus::spawn_failed(&path.display().to_string(), &err),
                        started.elapsed(),
                    )
                }
            },
            None => Stdio::inherit(),
        };

        let mut shell = shell_command(command);
        shell
            .stdin(stdin)
            .stdout(stdout)
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        #[cfg(unix)]
        shell.process_group(0);

        let mut child = match shell.spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!("Failed to spawn shell for {}: {}", command, err);
                return RunOutcome::bare(RunStatus::spawn_failed(command, &err), started.elapsed());
            }
        };
        let pid = child.id();

        let waited =
            tokio::time::timeout(Duration::from_millis(time_limit_ms), child.wait()).await;
        let elapsed = started.elapsed();

        let status = match waited {
            Ok(Ok(status)) => RunStatus::from_exit_status(status),
            Ok(Err(err)) => RunStatus::SystemError(format!("Failed to wait for child: {}", err)),
            Err(_) => {
                debug!("{} hit the {}ms deadline", command, time_limit_ms);
                kill_process_tree(&mut child, pid);
                if tokio::time::timeout(self.kill_grace, child.wait())
                    .await
                    .is_err()
                {
                    warn!("{} did not die after SIGKILL", command);
                }
                RunStatus::TimeLimitExceeded
            }
        };

        RunOutcome::bare(status, elapsed)
    }
}

impl Default for RedirectRunner {
    fn default() -> Self {
        Self::new(&JudgeConfig::default())
    }
}

#[cfg(unix)]
fn shell_command(command: &str) -> tokio::process::Command {
    let mut shell = tokio::process::Command::new("sh");
    shell.arg("-c").arg(command);
    shell
}

#[cfg(windows)]
fn shell_command(command: &str) -> tokio::process::Command {
    let mut shell = tokio::process::Command::new("cmd");
    shell.arg("/C").arg(command);
    shell
}
