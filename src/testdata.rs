//! Test case collection
//!
//! Two sources feed the judge besides cases handed in directly:
//! - a directory of `NAME.in` / `NAME.out` pairs
//! - a generator script plus a reference solution, run through the
//!   redirect runner round by round

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::core::{ScratchFile, TestCase};
use crate::judger::Judge;

/// Load every `*.in` file in `dir`, sorted by file name.
///
/// The matching `*.out` is the expected output; a missing one gives an empty
/// expectation.
pub fn load_cases_from_dir(dir: &Path) -> Result<Vec<TestCase>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read test data directory {}", dir.display()))?;

    let mut inputs = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "in") {
            inputs.push(path);
        }
    }
    inputs.sort();

    let mut cases = Vec::with_capacity(inputs.len());
    for input_path in inputs {
        let input = fs::read_to_string(&input_path)
            .with_context(|| format!("Failed to read {}", input_path.display()))?;
        let output_path = input_path.with_extension("out");
        let expected = if output_path.exists() {
            fs::read_to_string(&output_path)
                .with_context(|| format!("Failed to read {}", output_path.display()))?
        } else {
            warn!("No expected output for {}", input_path.display());
            String::new()
        };
        cases.push(TestCase::new(input, expected));
    }

    info!("Loaded {} test case(s) from {}", cases.len(), dir.display());
    Ok(cases)
}

/// Produce up to `count` cases from a generator and a reference solution.
///
/// Each round runs `generator` into a scratch input file, then `solution`
/// from that file into a scratch answer file. Rounds where either command
/// does not finish cleanly are logged and skipped.
pub async fn generate_cases(
    judge: &Judge,
    generator: &str,
    solution: &str,
    count: usize,
    time_limit_ms: u64,
) -> Result<Vec<TestCase>> {
    let mut cases = Vec::with_capacity(count);

    for round in 1..=count {
        let input = ScratchFile::with_suffix(".in")?;
        let answer = ScratchFile::with_suffix(".ans")?;

        let generated = judge
            .run_redirected(generator, None, Some(input.path()), time_limit_ms)
            .await;
        if !generated.is_accepted() {
            warn!(
                "Generator failed in round {}: {} {}",
                round, generated.verdict, generated.message
            );
            continue;
        }

        let solved = judge
            .run_redirected(
                solution,
                Some(input.path()),
                Some(answer.path()),
                time_limit_ms,
            )
            .await;
        if !solved.is_accepted() {
            warn!(
                "Reference solution failed in round {}: {} {}",
                round, solved.verdict, solved.message
            );
            continue;
        }

        cases.push(TestCase::new(
            input.read_lossy().await?,
            answer.read_lossy().await?,
        ));
    }

    info!("Generated {}/{} test case(s)", cases.len(), count);
    Ok(cases)
}
