//! Peak memory sampling for running children
//!
//! Linux reads the peak counters in `/proc/<pid>/status`. Other platforms
//! report nothing and memory limits are not enforced there.
//!
//! Sampling is best-effort. The probe reads the kernel's peak counters, so a
//! short spike is still seen at the next sample, but a process that spikes
//! and exits between two samples is under-reported.

use crate::config::MemoryMetric;

#[derive(Debug, Clone, Copy)]
pub struct MemoryProbe {
    pid: u32,
    metric: MemoryMetric,
}

impl MemoryProbe {
    pub fn new(pid: u32, metric: MemoryMetric) -> Self {
        Self { pid, metric }
    }

    /// Current peak in KB, or `None` when the process is gone or unsupported
    #[cfg(target_os = "linux")]
    pub async fn sample(&self) -> Option<u64> {
        let status = tokio::fs::read_to_string(format!("/proc/{}/status", self.pid))
            .await
            .ok()?;
        parse_status_field(&status, self.metric.status_field())
    }

    #[cfg(not(target_os = "linux"))]
    pub async fn sample(&self) -> Option<u64> {
        let _ = (self.pid, self.metric);
        None
    }
}

/// Extract a `kB` field such as `VmPeak:   12345 kB`
pub fn parse_status_field(status: &str, field: &str) -> Option<u64> {
    status.lines().find_map(|line| {
        let value = line.strip_prefix(field)?.strip_prefix(':')?;
        value.split_whitespace().next()?.parse().ok()
    })
}
