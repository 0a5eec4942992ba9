//! Core judge types shared by every module

pub mod error;
pub mod scratch;
pub mod types;
pub mod verdict;

pub use error::JudgeError;
pub use scratch::ScratchFile;
pub use types::{JudgeResult, ResourceLimits, TestCase};
pub use verdict::{classify, Verdict};
