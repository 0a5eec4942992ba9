//! Judge configuration
//!
//! All tunables live in one [`JudgeConfig`] value handed to
//! [`Judge::new`](crate::judger::Judge::new). Nothing is read from global
//! state after construction.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};

use crate::core::ResourceLimits;

/// Which `/proc/<pid>/status` counter the memory probe reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryMetric {
    /// Peak virtual size (`VmPeak`)
    #[default]
    PeakVirtual,
    /// Peak resident set size (`VmHWM`)
    PeakResident,
}

impl MemoryMetric {
    pub fn status_field(&self) -> &'static str {
        match self {
            MemoryMetric::PeakVirtual => "VmPeak",
            MemoryMetric::PeakResident => "VmHWM",
        }
    }
}

impl FromStr for MemoryMetric {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "peak_virtual" | "vmpeak" => Ok(MemoryMetric::PeakVirtual),
            "peak_resident" | "vmhwm" => Ok(MemoryMetric::PeakResident),
            other => bail!("Unknown memory metric: {}", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JudgeConfig {
    /// Per-stream capture ceiling; bytes past it are read and discarded
    pub max_capture_bytes: usize,
    /// Memory sampling period (default: 10ms)
    pub memory_poll_interval_ms: u64,
    pub memory_metric: MemoryMetric,
    /// Per-attempt compile deadline (default: 30000ms = 30s)
    pub compile_time_limit_ms: u64,
    /// How long to wait for pipe tasks once the child is gone
    pub drain_grace_ms: u64,
    pub default_time_limit_ms: u64,
    pub default_memory_limit_kb: u64,
    /// Languages TOML replacing the built-in definitions
    pub languages_path: Option<PathBuf>,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            max_capture_bytes: 4 * 1024 * 1024,
            memory_poll_interval_ms: 10,
            memory_metric: MemoryMetric::default(),
            compile_time_limit_ms: 30_000,
            drain_grace_ms: 1_000,
            default_time_limit_ms: 2_000,
            default_memory_limit_kb: 256 * 1024,
            languages_path: None,
        }
    }
}

impl JudgeConfig {
    /// Load from `SHUATI_*` environment variables, after reading `.env` if present
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = parse_var(&lookup, "SHUATI_MAX_CAPTURE_BYTES")? {
            config.max_capture_bytes = v;
        }
        if let Some(v) = parse_var(&lookup, "SHUATI_MEMORY_POLL_MS")? {
            config.memory_poll_interval_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "SHUATI_MEMORY_METRIC")? {
            config.memory_metric = v;
        }
        if let Some(v) = parse_var(&lookup, "SHUATI_COMPILE_TIME_LIMIT_MS")? {
            config.compile_time_limit_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "SHUATI_DRAIN_GRACE_MS")? {
            config.drain_grace_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "SHUATI_TIME_LIMIT_MS")? {
            config.default_time_limit_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "SHUATI_MEMORY_LIMIT_KB")? {
            config.default_memory_limit_kb = v;
        }
        if let Some(path) = lookup("SHUATI_LANGUAGES_CONFIG").filter(|p| !p.is_empty()) {
            config.languages_path = Some(PathBuf::from(path));
        }

        if config.memory_poll_interval_ms == 0 {
            bail!("SHUATI_MEMORY_POLL_MS must be positive");
        }

        Ok(config)
    }

    pub fn with_max_capture_bytes(mut self, bytes: usize) -> Self {
        self.max_capture_bytes = bytes;
        self
    }

    pub fn with_memory_metric(mut self, metric: MemoryMetric) -> Self {
        self.memory_metric = metric;
        self
    }

    pub fn with_compile_time_limit_ms(mut self, ms: u64) -> Self {
        self.compile_time_limit_ms = ms;
        self
    }

    pub fn with_languages_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.languages_path = Some(path.into());
        self
    }

    pub fn memory_poll_interval(&self) -> Duration {
        Duration::from_millis(self.memory_poll_interval_ms.max(1))
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_millis(self.compile_time_limit_ms)
    }

    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.drain_grace_ms)
    }

    /// Limits used when the caller does not give any
    pub fn default_limits(&self) -> ResourceLimits {
        ResourceLimits::new(self.default_time_limit_ms, self.default_memory_limit_kb)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<T>()
        .map(Some)
        .map_err(|e| anyhow!("Invalid value for {}: {:?} ({})", key, raw, e))
}
