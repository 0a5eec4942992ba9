//! Compiler module - Source preparation
//!
//! Turns a source file and a language tag into a [`CompiledArtifact`]:
//! - interpreted languages: an interpreter invocation, no validation
//! - compiled languages: a native executable next to the source, built with
//!   the first language standard the toolchain accepts
//!
//! The compiler is invoked directly with an argument vector, never through a
//! shell. Source paths are still checked against a character allow-list and
//! rejected, not sanitized, when they fall outside it.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::JudgeConfig;
use crate::core::{JudgeError, ScratchFile};
use crate::languages::{LanguageConfig, LanguageKind, LanguageRegistry};
use crate::runner::{kill_process_tree, CommandSpec};

/// Diagnostic phrases compilers use when they reject an option
const FLAG_REJECTIONS: &[&str] = &[
    "unrecognized command line option",
    "unrecognized command-line option",
    "invalid argument",
    "invalid value",
];

/// Invocable form of a prepared solution.
///
/// Produced by [`Compiler::prepare`] and consumed by [`Compiler::cleanup`];
/// runs only borrow it, so it can be shared across concurrent runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledArtifact {
    command: Vec<String>,
    language: String,
    executable: Option<PathBuf>,
}

impl CompiledArtifact {
    /// Command that starts the solution
    pub fn command(&self) -> CommandSpec {
        CommandSpec::from_vec(&self.command)
    }

    /// Canonical language name
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Build output owned by this artifact, if any
    pub fn executable(&self) -> Option<&Path> {
        self.executable.as_deref()
    }
}

/// Result of one compiler invocation
enum Attempt {
    Built,
    /// The standard flag was rejected or the compiler failed silently
    Soft(String),
    Hard(String),
}

pub struct Compiler {
    languages: Arc<LanguageRegistry>,
    compile_timeout: Duration,
    kill_grace: Duration,
}

impl Compiler {
    pub fn new(languages: Arc<LanguageRegistry>, config: &JudgeConfig) -> Self {
        Self {
            languages,
            compile_timeout: config.compile_timeout(),
            kill_grace: config.drain_grace(),
        }
    }

    /// Prepare `source` for running
    pub async fn prepare(
        &self,
        source: &Path,
        language: &str,
    ) -> Result<CompiledArtifact, JudgeError> {
        let config = self
            .languages
            .get(language)
            .ok_or_else(|| JudgeError::UnsupportedLanguage(language.to_string()))?;

        match &config.kind {
            LanguageKind::Interpreted { interpreter, args } => {
                let mut command = vec![interpreter.clone()];
                command.extend(args.iter().cloned());
                command.push(source.to_string_lossy().into_owned());
                debug!("Prepared interpreted {} as {:?}", config.name, command);
                Ok(CompiledArtifact {
                    command,
                    language: config.name.clone(),
                    executable: None,
                })
            }
            LanguageKind::Compiled {
                compiler,
                flags,
                std_flags,
            } => {
                validate_source_path(source)?;
                let executable = executable_path(source)?;
                self.compile(&config, compiler, flags, std_flags, source, &executable)
                    .await?;
                Ok(CompiledArtifact {
                    command: vec![executable.to_string_lossy().into_owned()],
                    language: config.name.clone(),
                    executable: Some(executable),
                })
            }
        }
    }

    /// Remove the build output of `artifact`
    pub async fn cleanup(&self, artifact: CompiledArtifact) {
        let Some(executable) = artifact.executable else {
            return;
        };
        match tokio::fs::remove_file(&executable).await {
            Ok(()) => debug!("Removed {}", executable.display()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!("Failed to remove {}: {}", executable.display(), err),
        }
    }

    async fn compile(
        &self,
        config: &LanguageConfig,
        compiler: &str,
        flags: &[String],
        std_flags: &[String],
        source: &Path,
        executable: &Path,
    ) -> Result<(), JudgeError> {
        let candidates: Vec<Option<&str>> = if std_flags.is_empty() {
            vec![None]
        } else {
            std_flags.iter().map(|f| Some(f.as_str())).collect()
        };

        let mut last_error = String::from("Compilation failed");
        for (attempt, std_flag) in candidates.iter().enumerate() {
            let std_arg = std_flag.map(|f| format!("-std={}", f));
            match self
                .compile_once(compiler, flags, std_arg.as_deref(), source, executable)
                .await?
            {
                Attempt::Built => {
                    info!(
                        "Compiled {} ({}) with {} after {} attempt(s)",
                        source.display(),
                        config.name,
                        std_arg.as_deref().unwrap_or("default standard"),
                        attempt + 1
                    );
                    return Ok(());
                }
                Attempt::Soft(message) => {
                    debug!(
                        "{} rejected {}, trying next standard",
                        compiler,
                        std_arg.as_deref().unwrap_or("default standard")
                    );
                    last_error = message;
                }
                Attempt::Hard(message) => return Err(JudgeError::CompileError(message)),
            }
        }

        Err(JudgeError::CompileError(last_error))
    }

    async fn compile_once(
        &self,
        compiler: &str,
        flags: &[String],
        std_arg: Option<&str>,
        source: &Path,
        executable: &Path,
    ) -> Result<Attempt, JudgeError> {
        match tokio::fs::remove_file(executable).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        let diagnostics = ScratchFile::with_suffix(".log")?;
        let mut command = tokio::process::Command::new(compiler);
        command.args(flags);
        if let Some(std_arg) = std_arg {
            command.arg(std_arg);
        }
        command
            .arg(source)
            .arg("-o")
            .arg(executable)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(diagnostics.writer()?)
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| JudgeError::Spawn {
            program: compiler.to_string(),
            source,
        })?;
        let pid = child.id();

        let status = match tokio::time::timeout(self.compile_timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                kill_process_tree(&mut child, pid);
                let _ = tokio::time::timeout(self.kill_grace, child.wait()).await;
                return Ok(Attempt::Hard(format!(
                    "Compilation timed out after {}ms",
                    self.compile_timeout.as_millis()
                )));
            }
        };

        if status.success() && executable.exists() {
            return Ok(Attempt::Built);
        }

        let text = diagnostics.read_lossy().await?;
        if text.trim().is_empty() {
            return Ok(Attempt::Soft("Compilation failed".to_string()));
        }
        match std_arg {
            Some(std_arg) if is_flag_rejection(&text, std_arg) => Ok(Attempt::Soft(text)),
            _ => Ok(Attempt::Hard(text)),
        }
    }
}

/// Reject paths containing anything but `[A-Za-z0-9._-/\\]`
pub fn validate_source_path(source: &Path) -> Result<(), JudgeError> {
    let text = source.to_string_lossy();
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '/' | '\\');
    if text.is_empty() || !text.chars().all(allowed) {
        return Err(JudgeError::InvalidInput(text.into_owned()));
    }
    Ok(())
}

/// True when `diagnostics` complain about `flag` itself
pub fn is_flag_rejection(diagnostics: &str, flag: &str) -> bool {
    diagnostics.contains(flag) && FLAG_REJECTIONS.iter().any(|p| diagnostics.contains(p))
}

/// Absolute build output path next to `source`.
///
/// A bare name such as `main` would be looked up in `PATH` when spawned.
fn executable_path(source: &Path) -> std::io::Result<PathBuf> {
    let executable = source.with_extension(std::env::consts::EXE_EXTENSION);
    let executable = if executable == source {
        source.with_extension("out")
    } else {
        executable
    };
    std::path::absolute(executable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok};

    fn compiler_for(toml: &str) -> Compiler {
        let registry = LanguageRegistry::from_toml_str(toml).unwrap();
        Compiler::new(Arc::new(registry), &JudgeConfig::default())
    }

    #[test]
    fn test_validate_source_path() {
        assert_ok!(validate_source_path(Path::new("problems/1000/sol_v2.cpp")));
        assert_ok!(validate_source_path(Path::new("work\\a-b.cpp")));

        let err = validate_source_path(Path::new("a\"; rm -rf /; \".cpp")).unwrap_err();
        assert!(matches!(err, JudgeError::InvalidInput(_)));
        assert!(err.to_string().starts_with("Invalid source file path"));

        assert_err!(validate_source_path(Path::new("test\"; echo pwned; \".cpp")));
        assert_err!(validate_source_path(Path::new("my solution.cpp")));
        assert_err!(validate_source_path(Path::new("$(id).cpp")));
        assert_err!(validate_source_path(Path::new("")));
    }

    #[test]
    fn test_is_flag_rejection() {
        let gcc = "g++: error: unrecognized command-line option '-std=c++20'; did you mean '-std=c++2a'?";
        assert!(is_flag_rejection(gcc, "-std=c++20"));
        assert!(!is_flag_rejection(gcc, "-std=gnu++20"));

        let old_gcc = "cc1plus: error: unrecognized command line option \"-std=c++2a\"";
        assert!(is_flag_rejection(old_gcc, "-std=c++2a"));

        let clang = "error: invalid value 'c++20' in '-std=c++20'";
        assert!(is_flag_rejection(clang, "-std=c++20"));

        let syntax = "main.cpp:3:1: error: expected ';' before '}' token";
        assert!(!is_flag_rejection(syntax, "-std=c++20"));
    }

    #[test]
    fn test_executable_path() {
        let cwd = std::env::current_dir().unwrap();

        let exe = executable_path(Path::new("work/main.cpp")).unwrap();
        assert!(exe.is_absolute());
        assert_eq!(exe.parent(), Some(cwd.join("work").as_path()));
        assert_ne!(exe.file_name(), Some(std::ffi::OsStr::new("main.cpp")));

        let bare = executable_path(Path::new("main.cpp")).unwrap();
        assert!(bare.is_absolute());
        assert_eq!(bare.parent(), Some(cwd.as_path()));

        let no_ext = executable_path(Path::new("work/main")).unwrap();
        assert_ne!(no_ext, cwd.join("work/main"));
    }

    #[tokio::test]
    async fn test_interpreted_prepare_is_a_no_op() {
        let compiler = compiler_for("[python]\ninterpreter = \"python3\"\naliases = [\"py\"]\n");
        let artifact = compiler
            .prepare(Path::new("does/not exist.py"), "py")
            .await
            .unwrap();

        assert_eq!(artifact.language(), "python");
        assert_eq!(artifact.executable(), None);
        assert_eq!(
            artifact.command().to_vec(),
            vec!["python3", "does/not exist.py"]
        );
        compiler.cleanup(artifact).await;
    }

    #[tokio::test]
    async fn test_unknown_language() {
        let compiler = compiler_for("[python]\ninterpreter = \"python3\"\n");
        let err = compiler
            .prepare(Path::new("main.rs"), "rust")
            .await
            .unwrap_err();
        assert!(matches!(err, JudgeError::UnsupportedLanguage(_)));
    }

    #[cfg(unix)]
    mod fake_compiler {
        use super::*;

        /// Write a shell script acting as a compiler; it runs as `sh <script> ...`
        fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
            let path = dir.join(name);
            std::fs::write(&path, format!("{}\n", body)).unwrap();
            path
        }

        /// Accepts only `-std=old`; writes "$@" to `calls.log`
        const PICKY: &str = r#"
echo "$@" >> "$(dirname "$0")/calls.log"
case "$1" in
  -std=old) ;;
  *) echo "cc: error: unrecognized command-line option '$1'" >&2; exit 1 ;;
esac
while [ "$#" -gt 0 ]; do
  if [ "$1" = "-o" ]; then shift; printf '#!/bin/sh\necho built\n' > "$1"; chmod +x "$1"; fi
  shift
done"#;

        fn registry_toml(compiler: &Path) -> String {
            format!(
                "[toy]\ncompiler = \"sh\"\nflags = [\"{}\"]\nstd_flags = [\"new\", \"newer\", \"old\"]\n",
                compiler.display()
            )
        }

        fn calls(dir: &Path) -> Vec<String> {
            std::fs::read_to_string(dir.join("calls.log"))
                .unwrap_or_default()
                .lines()
                .map(str::to_string)
                .collect()
        }

        #[tokio::test]
        async fn test_falls_back_to_older_standard() {
            let dir = TempDir::new().unwrap();
            let cc = script(dir.path(), "picky-cc", PICKY);
            let source = dir.path().join("main.toy");
            std::fs::write(&source, "print").unwrap();

            let compiler = compiler_for(&registry_toml(&cc));
            let artifact = compiler.prepare(&source, "toy").await.unwrap();

            let calls = calls(dir.path());
            assert_eq!(calls.len(), 3);
            assert!(calls[0].starts_with("-std=new "));
            assert!(calls[2].starts_with("-std=old "));

            let exe = artifact.executable().unwrap().to_path_buf();
            assert!(exe.exists());
            compiler.cleanup(artifact).await;
            assert!(!exe.exists());
        }

        #[tokio::test]
        async fn test_genuine_error_stops_immediately() {
            let dir = TempDir::new().unwrap();
            let cc = script(
                dir.path(),
                "broken-cc",
                "echo \"$@\" >> \"$(dirname \"$0\")/calls.log\"\necho \"main.toy:1:1: error: expected ';'\" >&2\nexit 1",
            );
            let source = dir.path().join("main.toy");
            std::fs::write(&source, "oops").unwrap();

            let compiler = compiler_for(&registry_toml(&cc));
            let err = compiler.prepare(&source, "toy").await.unwrap_err();

            match err {
                JudgeError::CompileError(message) => {
                    assert!(message.contains("expected ';'"))
                }
                other => panic!("expected compile error, got {:?}", other),
            }
            assert_eq!(calls(dir.path()).len(), 1);
        }

        #[tokio::test]
        async fn test_silent_failures_exhaust_all_standards() {
            let dir = TempDir::new().unwrap();
            let cc = script(
                dir.path(),
                "mute-cc",
                "echo \"$@\" >> \"$(dirname \"$0\")/calls.log\"\nexit 1",
            );
            let source = dir.path().join("main.toy");
            std::fs::write(&source, "").unwrap();

            let compiler = compiler_for(&registry_toml(&cc));
            let err = compiler.prepare(&source, "toy").await.unwrap_err();

            assert_eq!(err.to_string(), "Compilation failed");
            assert_eq!(calls(dir.path()).len(), 3);
        }

        #[tokio::test]
        async fn test_compile_timeout() {
            let dir = TempDir::new().unwrap();
            let cc = script(dir.path(), "slow-cc", "sleep 30");
            let source = dir.path().join("main.toy");
            std::fs::write(&source, "").unwrap();

            let registry = LanguageRegistry::from_toml_str(&registry_toml(&cc)).unwrap();
            let config = JudgeConfig::default().with_compile_time_limit_ms(200);
            let compiler = Compiler::new(Arc::new(registry), &config);

            let err = compiler.prepare(&source, "toy").await.unwrap_err();
            assert!(err.to_string().contains("timed out"));
        }

        #[tokio::test]
        async fn test_bare_relative_source_runs() {
            use crate::core::{ResourceLimits, TestCase, Verdict};
            use crate::judger::Judge;

            let dir = TempDir::new().unwrap();
            let cc = script(dir.path(), "picky-cc", PICKY);
            let source_file = tempfile::Builder::new()
                .prefix("shuati_bare_")
                .suffix(".toy")
                .tempfile_in(".")
                .unwrap();
            let source = PathBuf::from(source_file.path().file_name().unwrap());
            assert_eq!(source.parent(), Some(Path::new("")));

            let registry = LanguageRegistry::from_toml_str(&registry_toml(&cc)).unwrap();
            let judge = Judge::with_languages(JudgeConfig::default(), registry);
            let artifact = judge.prepare(&source, "toy").await.unwrap();
            let exe = artifact.executable().unwrap().to_path_buf();
            assert!(exe.is_absolute());

            let result = judge
                .run(&artifact, &TestCase::new("", "built"), &ResourceLimits::default())
                .await;
            assert_eq!(result.verdict, Verdict::Accepted, "{}", result.message);

            judge.cleanup(artifact).await;
            assert!(!exe.exists());
        }

        #[tokio::test]
        async fn test_injection_never_reaches_compiler() {
            let dir = TempDir::new().unwrap();
            let cc = script(dir.path(), "picky-cc", PICKY);
            let compiler = compiler_for(&registry_toml(&cc));

            let err = compiler
                .prepare(Path::new("a\"; rm -rf /; \".cpp"), "toy")
                .await
                .unwrap_err();

            assert!(matches!(err, JudgeError::InvalidInput(_)));
            assert!(calls(dir.path()).is_empty());
        }
    }
}
