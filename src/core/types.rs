//! Values exchanged between the judge and its callers

use serde::{Deserialize, Serialize};

use super::verdict::Verdict;

/// One input/expected-output pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
    #[serde(default)]
    pub is_sample: bool,
}

impl TestCase {
    pub fn new(input: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            expected_output: expected_output.into(),
            is_sample: false,
        }
    }

    /// Mark the case as a problem-statement sample
    pub fn sample(mut self) -> Self {
        self.is_sample = true;
        self
    }
}

/// Result of running one test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeResult {
    pub verdict: Verdict,
    /// Wall-clock time from spawn to exit or termination
    pub time_ms: u64,
    /// Last sampled peak memory
    pub memory_kb: u64,
    pub message: String,
    /// Captured stderr of the program
    pub error_output: String,
    pub input: String,
    /// Captured stdout of the program
    pub output: String,
    pub expected: String,
}

impl JudgeResult {
    /// Result with only a verdict and message set
    pub fn new(verdict: Verdict, message: impl Into<String>) -> Self {
        Self {
            verdict,
            time_ms: 0,
            memory_kb: 0,
            message: message.into(),
            error_output: String::new(),
            input: String::new(),
            output: String::new(),
            expected: String::new(),
        }
    }

    /// Copy the case's input and expected output through for reporting
    pub fn with_case(mut self, case: &TestCase) -> Self {
        self.input = case.input.clone();
        self.expected = case.expected_output.clone();
        self
    }

    pub fn is_accepted(&self) -> bool {
        self.verdict.is_accepted()
    }
}

/// Per-run resource ceilings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub time_limit_ms: u64,
    pub memory_limit_kb: u64,
}

impl ResourceLimits {
    pub fn new(time_limit_ms: u64, memory_limit_kb: u64) -> Self {
        Self {
            time_limit_ms,
            memory_limit_kb,
        }
    }

    pub fn with_time_limit_ms(mut self, time_limit_ms: u64) -> Self {
        self.time_limit_ms = time_limit_ms;
        self
    }

    pub fn with_memory_limit_kb(mut self, memory_limit_kb: u64) -> Self {
        self.memory_limit_kb = memory_limit_kb;
        self
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            time_limit_ms: 2000,
            memory_limit_kb: 256 * 1024,
        }
    }
}
