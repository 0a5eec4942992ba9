//! Judger module - the judging facade
//!
//! [`Judge`] exposes preparation, per-case runs and cleanup as separate
//! phases so a caller can compile once and run many cases:
//!
//! ```no_run
//! # async fn demo(judge: shuati::Judge, cases: Vec<shuati::TestCase>) -> anyhow::Result<()> {
//! let limits = judge.config().default_limits();
//! let artifact = judge.prepare("main.cpp".as_ref(), "cpp").await?;
//! for case in &cases {
//!     let result = judge.run(&artifact, case, &limits).await;
//!     println!("{} ({}ms)", result.verdict, result.time_ms);
//! }
//! judge.cleanup(artifact).await;
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::checker::{compare_output, token_equal_files};
use crate::compiler::{CompiledArtifact, Compiler};
use crate::config::JudgeConfig;
use crate::core::{classify, JudgeError, JudgeResult, ResourceLimits, TestCase, Verdict};
use crate::languages::LanguageRegistry;
use crate::runner::{PipedRunner, RedirectRunner, RunOutcome, Runner};

/// Entry point for preparing and judging solutions.
///
/// Cheap to clone; clones share the compiler, runner and configuration.
#[derive(Clone)]
pub struct Judge {
    config: Arc<JudgeConfig>,
    compiler: Arc<Compiler>,
    runner: Arc<dyn Runner>,
    redirect: RedirectRunner,
}

impl Judge {
    /// Build a judge, loading languages from `config.languages_path` or the built-in set
    pub fn new(config: JudgeConfig) -> Result<Self> {
        let languages = LanguageRegistry::load(&config)?;
        Ok(Self::with_languages(config, languages))
    }

    pub fn with_languages(config: JudgeConfig, languages: LanguageRegistry) -> Self {
        let compiler = Compiler::new(Arc::new(languages), &config);
        let runner = PipedRunner::new(&config);
        let redirect = RedirectRunner::new(&config);
        Self {
            config: Arc::new(config),
            compiler: Arc::new(compiler),
            runner: Arc::new(runner),
            redirect,
        }
    }

    /// Replace the solution runner
    pub fn with_runner(mut self, runner: impl Runner + 'static) -> Self {
        self.runner = Arc::new(runner);
        self
    }

    pub fn config(&self) -> &JudgeConfig {
        &self.config
    }

    /// Compile or otherwise prepare `source` for running
    pub async fn prepare(
        &self,
        source: &Path,
        language: &str,
    ) -> Result<CompiledArtifact, JudgeError> {
        self.compiler.prepare(source, language).await
    }

    /// Run one test case. Never fails; judge-side problems come back as `SE`.
    pub async fn run(
        &self,
        artifact: &CompiledArtifact,
        case: &TestCase,
        limits: &ResourceLimits,
    ) -> JudgeResult {
        match self
            .runner
            .run(&artifact.command(), limits, &case.input)
            .await
        {
            Ok(outcome) => self.compose(case, outcome),
            Err(err) => {
                error!("Runner failed for {}: {:#}", artifact.command(), err);
                JudgeResult::new(Verdict::SystemError, format!("{:#}", err)).with_case(case)
            }
        }
    }

    /// Run every case with at most `jobs` children alive at once.
    ///
    /// Results come back in case order.
    pub async fn run_all(
        &self,
        artifact: &CompiledArtifact,
        cases: &[TestCase],
        limits: &ResourceLimits,
        jobs: usize,
    ) -> Vec<JudgeResult> {
        if jobs <= 1 {
            let mut results = Vec::with_capacity(cases.len());
            for case in cases {
                results.push(self.run(artifact, case, limits).await);
            }
            return results;
        }

        let semaphore = Arc::new(Semaphore::new(jobs));
        let mut set = JoinSet::new();
        for (index, case) in cases.iter().enumerate() {
            let judge = self.clone();
            let artifact = artifact.clone();
            let case = case.clone();
            let limits = *limits;
            let semaphore = semaphore.clone();
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                (index, judge.run(&artifact, &case, &limits).await)
            });
        }

        let mut slots: Vec<Option<JudgeResult>> = vec![None; cases.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(err) => warn!("Judge task failed: {}", err),
            }
        }

        slots
            .into_iter()
            .zip(cases)
            .map(|(slot, case)| {
                slot.unwrap_or_else(|| {
                    JudgeResult::new(Verdict::SystemError, "Judge task failed").with_case(case)
                })
            })
            .collect()
    }

    /// Release the artifact's build output
    pub async fn cleanup(&self, artifact: CompiledArtifact) {
        self.compiler.cleanup(artifact).await;
    }

    /// Prepare, run every case in order, clean up.
    ///
    /// Any preparation failure yields a single `CE` result.
    pub async fn judge(
        &self,
        source: &Path,
        language: &str,
        cases: &[TestCase],
        limits: &ResourceLimits,
    ) -> Vec<JudgeResult> {
        let artifact = match self.prepare(source, language).await {
            Ok(artifact) => artifact,
            Err(err) => {
                warn!("Preparing {} failed: {}", source.display(), err);
                return vec![JudgeResult::new(Verdict::CompileError, err.to_string())];
            }
        };

        let results = self.run_all(&artifact, cases, limits, 1).await;
        let passed = results.iter().filter(|r| r.is_accepted()).count();
        info!(
            "Judged {}: {}/{} accepted",
            source.display(),
            passed,
            results.len()
        );

        self.cleanup(artifact).await;
        results
    }

    /// Run a trusted shell command with file-redirected stdin/stdout.
    ///
    /// The verdict is `AC`, `RE` or `TLE` (or `SE` when the OS fails us);
    /// output is never captured or compared.
    pub async fn run_redirected(
        &self,
        command: &str,
        input: Option<&Path>,
        output: Option<&Path>,
        time_limit_ms: u64,
    ) -> JudgeResult {
        let outcome = self
            .redirect
            .run(command, input, output, time_limit_ms)
            .await;
        let verdict = classify(&outcome.status, || Verdict::Accepted);

        let mut result = JudgeResult::new(verdict, outcome.status.describe().unwrap_or_default());
        result.time_ms = outcome.time_ms;
        result
    }

    /// Token comparison of two files on the blocking pool
    pub async fn token_equal_files(&self, a: &Path, b: &Path) -> std::io::Result<bool> {
        let (a, b) = (a.to_path_buf(), b.to_path_buf());
        tokio::task::spawn_blocking(move || token_equal_files(a, b))
            .await
            .map_err(std::io::Error::other)?
    }

    fn compose(&self, case: &TestCase, outcome: RunOutcome) -> JudgeResult {
        let verdict = classify(&outcome.status, || {
            compare_output(&outcome.stdout, &case.expected_output)
        });

        let mut message = match verdict {
            Verdict::WrongAnswer => "Output does not match expected".to_string(),
            _ => outcome.status.describe().unwrap_or_default(),
        };
        if outcome.truncated {
            if !message.is_empty() {
                message.push_str("; ");
            }
            message.push_str(&format!(
                "output truncated at {} bytes",
                self.config.max_capture_bytes
            ));
        }

        JudgeResult {
            verdict,
            time_ms: outcome.time_ms,
            memory_kb: outcome.memory_kb,
            message,
            error_output: outcome.stderr,
            input: case.input.clone(),
            output: outcome.stdout,
            expected: case.expected_output.clone(),
        }
    }
}
