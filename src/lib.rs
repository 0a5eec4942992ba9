//! Shuati - local judge engine
//!
//! Compiles a solution once, runs it against test cases under wall-clock and
//! memory ceilings, and classifies every run into a [`Verdict`].

pub mod checker;
pub mod compiler;
pub mod config;
pub mod core;
pub mod judger;
pub mod languages;
pub mod monitor;
pub mod report;
pub mod runner;
pub mod testdata;

pub use crate::compiler::CompiledArtifact;
pub use crate::config::{JudgeConfig, MemoryMetric};
pub use crate::core::{JudgeError, JudgeResult, ResourceLimits, TestCase, Verdict};
pub use crate::judger::Judge;
pub use crate::report::TestReport;
