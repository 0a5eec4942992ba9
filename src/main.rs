use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

use shuati::testdata::{generate_cases, load_cases_from_dir};
use shuati::{Judge, JudgeConfig, ResourceLimits, TestCase, TestReport};

#[derive(Parser)]
#[command(name = "shuati", version, about = "Local judge for competitive programming practice")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a solution and run it against test cases
    Test(TestArgs),
    /// Run a shell command with file-redirected input and output
    Exec {
        command: String,
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
        /// Wall-clock limit in milliseconds
        #[arg(long)]
        time_limit: Option<u64>,
    },
    /// Compare two files token by token
    Diff { a: PathBuf, b: PathBuf },
}

#[derive(clap::Args)]
struct TestArgs {
    source: PathBuf,
    /// Language tag; guessed from the file extension when omitted
    #[arg(long)]
    lang: Option<String>,
    /// Directory of NAME.in / NAME.out pairs
    #[arg(long)]
    data: Option<PathBuf>,
    /// Generator command (stdout becomes a test input)
    #[arg(long, requires = "solution")]
    generator: Option<String>,
    /// Reference solution command (reads the generated input)
    #[arg(long, requires = "generator")]
    solution: Option<String>,
    /// Number of generated cases
    #[arg(long, default_value_t = 5)]
    count: usize,
    /// Per-case time limit in milliseconds
    #[arg(long)]
    time_limit: Option<u64>,
    /// Per-case memory limit in KB
    #[arg(long)]
    memory_limit: Option<u64>,
    /// Cases run at the same time
    #[arg(long, default_value_t = 1)]
    jobs: usize,
    /// Where to write the JSON report
    #[arg(long)]
    report: Option<PathBuf>,
    #[arg(long, default_value = "local")]
    problem_id: String,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("shuati=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = JudgeConfig::from_env()?;
    let judge = Judge::new(config)?;

    match cli.command {
        Command::Test(args) => run_tests(&judge, args).await,
        Command::Exec {
            command,
            input,
            output,
            time_limit,
        } => {
            let time_limit = time_limit.unwrap_or(judge.config().default_time_limit_ms);
            let result = judge
                .run_redirected(&command, input.as_deref(), output.as_deref(), time_limit)
                .await;
            println!("{} ({}ms) {}", result.verdict, result.time_ms, result.message);
            Ok(exit_code(result.is_accepted()))
        }
        Command::Diff { a, b } => {
            let same = judge
                .token_equal_files(&a, &b)
                .await
                .with_context(|| format!("Failed to compare {} and {}", a.display(), b.display()))?;
            println!("{}", if same { "same" } else { "different" });
            Ok(exit_code(same))
        }
    }
}

async fn run_tests(judge: &Judge, args: TestArgs) -> Result<ExitCode> {
    let language = match args.lang.clone() {
        Some(lang) => lang,
        None => guess_language(&args.source)?,
    };
    let limits = ResourceLimits::new(
        args.time_limit
            .unwrap_or(judge.config().default_time_limit_ms),
        args.memory_limit
            .unwrap_or(judge.config().default_memory_limit_kb),
    );

    let cases = collect_cases(judge, &args).await?;
    if cases.is_empty() {
        warn!("No test cases found");
    }

    let artifact = match judge.prepare(&args.source, &language).await {
        Ok(artifact) => artifact,
        Err(err) if err.is_compile_failure() => {
            println!("Compile Error:\n{}", err);
            return Ok(ExitCode::FAILURE);
        }
        Err(err) => return Err(err.into()),
    };

    println!("=== Running {} test case(s) ===", cases.len());
    let results = judge.run_all(&artifact, &cases, &limits, args.jobs).await;
    judge.cleanup(artifact).await;

    for (i, result) in results.iter().enumerate() {
        println!(
            "Case {}: {} ({}ms, {}KB)",
            i + 1,
            result.verdict,
            result.time_ms,
            result.memory_kb
        );
    }

    let report = TestReport::new(args.problem_id, results);
    println!("\n[Result] {}", report.summary_line());
    if let Some(failed) = report.first_failure() {
        if !failed.message.is_empty() {
            println!("First failure: {}", failed.message);
        }
    }

    if let Some(path) = &args.report {
        report.save(path)?;
        info!("Report saved to {}", path.display());
    }

    Ok(exit_code(report.all_accepted()))
}

async fn collect_cases(judge: &Judge, args: &TestArgs) -> Result<Vec<TestCase>> {
    let mut cases = Vec::new();
    if let Some(dir) = &args.data {
        cases.extend(load_cases_from_dir(dir)?);
    }
    if let (Some(generator), Some(solution)) = (&args.generator, &args.solution) {
        let generated = generate_cases(
            judge,
            generator,
            solution,
            args.count,
            judge.config().default_time_limit_ms.max(5_000),
        )
        .await?;
        cases.extend(generated);
    }
    Ok(cases)
}

fn guess_language(source: &Path) -> Result<String> {
    let lang = match source.extension().and_then(|e| e.to_str()) {
        Some("cpp" | "cc" | "cxx") => "cpp",
        Some("py") => "python",
        _ => bail!(
            "Cannot guess the language of {}; pass --lang",
            source.display()
        ),
    };
    Ok(lang.to_string())
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
