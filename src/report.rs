//! Test report persistence

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::core::JudgeResult;

/// Overall verdict of a run with no cases
pub const SKIPPED: &str = "SKIPPED";

/// Summary of one `test` run, saved as JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestReport {
    pub problem_id: String,
    /// Seconds since the Unix epoch
    pub timestamp: u64,
    /// `AC`, the code of the first failing case, or `SKIPPED`
    pub verdict: String,
    pub pass_count: usize,
    pub total_count: usize,
    pub cases: Vec<JudgeResult>,
}

impl TestReport {
    pub fn new(problem_id: impl Into<String>, cases: Vec<JudgeResult>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let pass_count = cases.iter().filter(|c| c.is_accepted()).count();
        let verdict = if cases.is_empty() {
            SKIPPED
        } else {
            cases
                .iter()
                .find(|c| !c.is_accepted())
                .map_or("AC", |failed| failed.verdict.code())
        };

        Self {
            problem_id: problem_id.into(),
            timestamp,
            verdict: verdict.to_string(),
            pass_count,
            total_count: cases.len(),
            cases,
        }
    }

    pub fn all_accepted(&self) -> bool {
        !self.cases.is_empty() && self.pass_count == self.total_count
    }

    /// First case that was not accepted
    pub fn first_failure(&self) -> Option<&JudgeResult> {
        self.cases.iter().find(|c| !c.is_accepted())
    }

    pub fn summary_line(&self) -> String {
        if self.cases.is_empty() {
            "SKIPPED (No test cases found)".to_string()
        } else if self.all_accepted() {
            format!("All Accepted! ({}/{})", self.pass_count, self.total_count)
        } else {
            format!("Failed. Passed {}/{}", self.pass_count, self.total_count)
        }
    }

    /// Write pretty-printed JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid report {}", path.display()))
    }
}
