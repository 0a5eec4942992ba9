//! Piped runner implementation
//!
//! Runs a solution with all three standard streams connected to pipes. Per
//! child, three tasks run for its whole lifetime:
//! - a writer that feeds the test input and closes stdin
//! - a drainer for stdout and one for stderr, each keeping at most
//!   `max_capture_bytes` and discarding the rest
//!
//! The orchestrating task waits for exit, the deadline or the memory ceiling,
//! whichever comes first. A child that never reads its input or floods its
//! output can not stall the parent, because no stream waits on another.
//! All three tasks are joined before the outcome is built.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::ChildStdin;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::{kill_process_group, kill_process_tree, CommandSpec, RunOutcome, RunStatus, Runner};
use crate::config::{JudgeConfig, MemoryMetric};
use crate::core::ResourceLimits;
use crate::monitor::MemoryProbe;

const READ_CHUNK: usize = 64 * 1024;

/// Runner that executes solutions with piped I/O and resource ceilings
#[derive(Debug, Clone)]
pub struct PipedRunner {
    max_capture_bytes: usize,
    poll_interval: Duration,
    memory_metric: MemoryMetric,
    drain_grace: Duration,
}

/// Bytes kept from one output stream
#[derive(Debug, Default)]
struct Captured {
    data: Vec<u8>,
    truncated: bool,
}

impl Captured {
    fn into_text(self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// How the wait loop ended
enum Exit {
    Completed(std::process::ExitStatus),
    TimedOut,
    MemoryExceeded,
    WaitFailed(std::io::Error),
}

impl PipedRunner {
    pub fn new(config: &JudgeConfig) -> Self {
        Self {
            max_capture_bytes: config.max_capture_bytes,
            poll_interval: config.memory_poll_interval(),
            memory_metric: config.memory_metric,
            drain_grace: config.drain_grace(),
        }
    }
}

impl Default for PipedRunner {
    fn default() -> Self {
        Self::new(&JudgeConfig::default())
    }
}

#[async_trait]
impl Runner for PipedRunner {
    async fn run(
        &self,
        cmd: &CommandSpec,
        limits: &ResourceLimits,
        stdin: &str,
    ) -> Result<RunOutcome> {
        debug!("Running {} with limits {:?}", cmd, limits);

        let mut command = cmd.to_command();
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let started = Instant::now();
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!("Failed to spawn {}: {}", cmd.program, err);
                return Ok(RunOutcome::bare(
                    RunStatus::spawn_failed(&cmd.program, &err),
                    started.elapsed(),
                ));
            }
        };
        let pid = child.id();

        let child_stdin = child.stdin.take().context("Child stdin was not piped")?;
        let child_stdout = child.stdout.take().context("Child stdout was not piped")?;
        let child_stderr = child.stderr.take().context("Child stderr was not piped")?;

        let input = stdin.as_bytes().to_vec();
        let cap = self.max_capture_bytes;
        let writer = tokio::spawn(feed_stdin(child_stdin, input));
        let stdout_task = tokio::spawn(read_limited(child_stdout, cap));
        let stderr_task = tokio::spawn(read_limited(child_stderr, cap));

        let probe = pid.map(|pid| MemoryProbe::new(pid, self.memory_metric));
        let mut peak_kb = 0u64;

        let deadline = tokio::time::sleep(Duration::from_millis(limits.time_limit_ms));
        tokio::pin!(deadline);
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Branch order is priority: a due memory sample is taken before an
        // exit is reaped or the deadline is honoured, so a child over the
        // ceiling is MLE even if it also exited or ran out of time.
        let exit = loop {
            tokio::select! {
                biased;
                _ = ticker.tick() => {
                    let Some(probe) = &probe else { continue };
                    if let Some(kb) = probe.sample().await {
                        peak_kb = peak_kb.max(kb);
                        if kb > limits.memory_limit_kb {
                            break Exit::MemoryExceeded;
                        }
                    }
                }
                status = child.wait() => break match status {
                    Ok(status) => Exit::Completed(status),
                    Err(err) => Exit::WaitFailed(err),
                },
                _ = &mut deadline => break Exit::TimedOut,
            }
        };
        let elapsed = started.elapsed();

        let status = match exit {
            Exit::Completed(status) => RunStatus::from_exit_status(status),
            Exit::TimedOut => {
                debug!("{} hit the {}ms deadline", cmd.program, limits.time_limit_ms);
                RunStatus::TimeLimitExceeded
            }
            Exit::MemoryExceeded => {
                debug!(
                    "{} exceeded {}KB (peak {}KB)",
                    cmd.program, limits.memory_limit_kb, peak_kb
                );
                RunStatus::MemoryLimitExceeded
            }
            Exit::WaitFailed(err) => {
                warn!("Waiting for {} failed: {}", cmd.program, err);
                RunStatus::SystemError(format!("Failed to wait for child: {}", err))
            }
        };

        if matches!(status, RunStatus::Exited(_) | RunStatus::Signaled(_)) {
            // Background descendants would keep the pipes open and outlive the run.
            kill_process_group(pid);
        } else {
            kill_process_tree(&mut child, pid);
            if tokio::time::timeout(self.drain_grace, child.wait())
                .await
                .is_err()
            {
                warn!("{} did not die after SIGKILL", cmd.program);
            }
        }

        join_or_abort(writer, self.drain_grace, "stdin writer").await;
        let stdout = join_or_abort(stdout_task, self.drain_grace, "stdout drainer").await;
        let stderr = join_or_abort(stderr_task, self.drain_grace, "stderr drainer").await;

        Ok(RunOutcome {
            status,
            time_ms: elapsed.as_millis() as u64,
            memory_kb: peak_kb,
            truncated: stdout.truncated || stderr.truncated,
            stdout: stdout.into_text(),
            stderr: stderr.into_text(),
        })
    }
}

/// Write the whole input, then drop the handle to signal EOF
async fn feed_stdin(mut stdin: ChildStdin, input: Vec<u8>) {
    if !input.is_empty() {
        match stdin.write_all(&input).await {
            Ok(()) => {}
            // The child exited or closed stdin without reading everything.
            Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => {}
            Err(err) => debug!("Writing stdin failed: {}", err),
        }
    }
    let _ = stdin.shutdown().await;
}

/// Read until EOF, keeping at most `limit` bytes
async fn read_limited<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> Captured {
    let mut captured = Captured::default();
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => {
                debug!("Reading child output failed: {}", err);
                break;
            }
        };
        let room = limit.saturating_sub(captured.data.len());
        if n > room {
            captured.truncated = true;
        }
        captured.data.extend_from_slice(&chunk[..n.min(room)]);
    }

    captured
}

/// Join a pipe task; abort it if a leftover descendant keeps the pipe open
async fn join_or_abort<T: Default>(mut handle: JoinHandle<T>, grace: Duration, name: &str) -> T {
    match tokio::time::timeout(grace, &mut handle).await {
        Ok(Ok(value)) => value,
        Ok(Err(err)) => {
            warn!("{} task failed: {}", name, err);
            T::default()
        }
        Err(_) => {
            warn!("{} still running after {:?}, aborting", name, grace);
            handle.abort();
            T::default()
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh").with_args(["-c", script])
    }

    fn limits(time_limit_ms: u64) -> ResourceLimits {
        ResourceLimits::new(time_limit_ms, 512 * 1024)
    }

    #[tokio::test]
    async fn test_echoes_stdin() {
        let runner = PipedRunner::default();
        let outcome = runner
            .run(&CommandSpec::new("cat"), &limits(2000), "1 2 3\n")
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::Exited(0));
        assert_eq!(outcome.stdout, "1 2 3\n");
        assert!(!outcome.truncated);
    }

    #[tokio::test]
    async fn test_large_output_without_newlines_does_not_deadlock() {
        let runner = PipedRunner::default();
        let outcome = runner
            .run(
                &sh("head -c 1048576 /dev/zero | tr '\\0' a"),
                &limits(5000),
                "",
            )
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::Exited(0));
        assert_eq!(outcome.stdout.len(), 1024 * 1024);
        assert!(!outcome.stdout.contains('\n'));
    }

    #[tokio::test]
    async fn test_output_is_capped() {
        let config = JudgeConfig::default().with_max_capture_bytes(64 * 1024);
        let runner = PipedRunner::new(&config);
        let outcome = runner
            .run(
                &sh("head -c 1048576 /dev/zero | tr '\\0' b; echo oops >&2"),
                &limits(5000),
                "",
            )
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::Exited(0));
        assert_eq!(outcome.stdout.len(), 64 * 1024);
        assert_eq!(outcome.stderr, "oops\n");
        assert!(outcome.truncated);
    }

    #[tokio::test]
    async fn test_child_ignoring_large_stdin() {
        let runner = PipedRunner::default();
        let input = "x".repeat(4 * 1024 * 1024);
        let outcome = runner
            .run(&sh("echo done"), &limits(5000), &input)
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::Exited(0));
        assert_eq!(outcome.stdout, "done\n");
    }

    #[tokio::test]
    async fn test_infinite_loop_times_out_and_is_killed() {
        let runner = PipedRunner::default();
        let outcome = runner
            .run(&sh("echo $$; while :; do :; done"), &limits(500), "")
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::TimeLimitExceeded);
        assert!(outcome.time_ms >= 500);
        assert!(outcome.time_ms <= 750, "took {}ms", outcome.time_ms);

        let pid: i32 = outcome.stdout.trim().parse().unwrap();
        let alive = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None);
        assert_eq!(alive, Err(nix::errno::Errno::ESRCH));
    }

    /// Alive and not a zombie waiting for its reaper
    #[cfg(target_os = "linux")]
    fn is_running(pid: i32) -> bool {
        std::fs::read_to_string(format!("/proc/{}/stat", pid))
            .ok()
            .and_then(|stat| {
                let state = stat.rsplit_once(')')?.1.trim_start().chars().next()?;
                Some(state != 'Z')
            })
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn test_background_child_does_not_swallow_output() {
        let runner = PipedRunner::default();
        let started = Instant::now();
        let outcome = runner
            .run(&sh("sleep 30 & echo $!; echo hi"), &limits(5000), "")
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::Exited(0));
        assert!(started.elapsed() < Duration::from_secs(5));
        let lines: Vec<&str> = outcome.stdout.lines().collect();
        assert_eq!(lines.len(), 2, "stdout was {:?}", outcome.stdout);
        assert_eq!(lines[1], "hi");

        #[cfg(target_os = "linux")]
        {
            let pid: i32 = lines[0].parse().unwrap();
            let mut gone = false;
            for _ in 0..50 {
                if !is_running(pid) {
                    gone = true;
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            assert!(gone, "background child {} still running", pid);
        }
    }

    #[tokio::test]
    async fn test_sleeping_child_is_charged_wall_time() {
        let runner = PipedRunner::default();
        let outcome = runner
            .run(&CommandSpec::new("sleep").with_args(["5"]), &limits(300), "")
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::TimeLimitExceeded);
    }

    #[tokio::test]
    async fn test_exit_code_and_signal() {
        let runner = PipedRunner::default();

        let outcome = runner.run(&sh("echo 3; exit 7"), &limits(2000), "").await.unwrap();
        assert_eq!(outcome.status, RunStatus::Exited(7));
        assert_eq!(outcome.stdout, "3\n");

        let outcome = runner.run(&sh("kill -9 $$"), &limits(2000), "").await.unwrap();
        assert_eq!(outcome.status, RunStatus::Signaled(9));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported_not_raised() {
        let runner = PipedRunner::default();
        let outcome = runner
            .run(&CommandSpec::new("/nonexistent/shuati-solution"), &limits(1000), "")
            .await
            .unwrap();

        match outcome.status {
            RunStatus::SpawnFailed { kind, message } => {
                assert_eq!(kind, std::io::ErrorKind::NotFound);
                assert!(message.contains("/nonexistent/shuati-solution"));
            }
            other => panic!("expected spawn failure, got {:?}", other),
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_memory_hog_is_stopped_before_deadline() {
        let runner = PipedRunner::default();
        // tail buffers a newline-free stream forever
        let outcome = runner
            .run(
                &CommandSpec::new("tail").with_args(["/dev/zero"]),
                &ResourceLimits::new(10_000, 64 * 1024),
                "",
            )
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::MemoryLimitExceeded);
        assert!(outcome.memory_kb > 64 * 1024);
        assert!(outcome.time_ms < 10_000);
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_independent() {
        let runner = PipedRunner::default();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let runner = runner.clone();
                tokio::spawn(async move {
                    runner
                        .run(&CommandSpec::new("cat"), &limits(5000), &format!("{}\n", i))
                        .await
                        .unwrap()
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            let outcome = handle.await.unwrap();
            assert_eq!(outcome.stdout, format!("{}\n", i));
        }
    }
}
