// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-shot CPU/memory sampling for a single pid, via `ps`.

use sprited_core::ProcessUsage;
use thiserror::Error;
use tokio::process::Command;

use crate::subprocess::{run_with_timeout, SAMPLE_TIMEOUT};

#[derive(Debug, Error)]
pub enum ProcessSampleError {
    #[error("ps invocation failed: {0}")]
    Invocation(String),
    #[error("ps exited with status {status}: {stderr}")]
    NonZeroExit { status: i32, stderr: String },
    #[error("could not parse ps output line: {0:?}")]
    Parse(String),
}

/// Samples CPU percentage and resident-set size for a running process.
#[derive(Debug, Clone, Default)]
pub struct ProcessSampler;

impl ProcessSampler {
    pub fn new() -> Self {
        Self
    }

    /// For `pid <= 0` returns zero usage without touching the OS.
    pub async fn sample(&self, pid: i64) -> Result<ProcessUsage, ProcessSampleError> {
        if pid <= 0 {
            return Ok(ProcessUsage::ZERO);
        }

        let mut cmd = Command::new("ps");
        cmd.args(["-o", "%cpu=,rss=", "-p", &pid.to_string()]);

        let output = run_with_timeout(cmd, SAMPLE_TIMEOUT, "ps")
            .await
            .map_err(ProcessSampleError::Invocation)?;

        if !output.status.success() {
            // Process likely exited between check and sample; treat as zero usage.
            return Ok(ProcessUsage::ZERO);
        }

        let text = String::from_utf8_lossy(&output.stdout);
        let line = text.lines().next().unwrap_or("").trim();
        if line.is_empty() {
            return Ok(ProcessUsage::ZERO);
        }

        parse_ps_line(line)
    }
}

fn parse_ps_line(line: &str) -> Result<ProcessUsage, ProcessSampleError> {
    let mut fields = line.split_whitespace();
    let cpu_percent: f64 = fields
        .next()
        .ok_or_else(|| ProcessSampleError::Parse(line.to_string()))?
        .parse()
        .map_err(|_| ProcessSampleError::Parse(line.to_string()))?;
    let rss_kb: u64 = fields
        .next()
        .ok_or_else(|| ProcessSampleError::Parse(line.to_string()))?
        .parse()
        .map_err(|_| ProcessSampleError::Parse(line.to_string()))?;

    Ok(ProcessUsage { cpu_percent, memory_bytes: rss_kb * 1024 })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ps_line_converts_kb_to_bytes() {
        let usage = parse_ps_line("12.5 2048").unwrap();
        assert_eq!(usage.cpu_percent, 12.5);
        assert_eq!(usage.memory_bytes, 2_097_152);
    }

    #[test]
    fn parse_ps_line_rejects_malformed_input() {
        assert!(parse_ps_line("not-a-number 2048").is_err());
        assert!(parse_ps_line("12.5").is_err());
    }

    #[tokio::test]
    async fn sample_returns_zero_for_nonpositive_pid() {
        let sampler = ProcessSampler::new();
        assert_eq!(sampler.sample(0).await.unwrap(), ProcessUsage::ZERO);
        assert_eq!(sampler.sample(-7).await.unwrap(), ProcessUsage::ZERO);
    }

    #[tokio::test]
    async fn sample_reads_current_process() {
        let sampler = ProcessSampler::new();
        let pid = std::process::id() as i64;
        let usage = sampler.sample(pid).await.unwrap();
        assert!(usage.cpu_percent >= 0.0);
    }
}
