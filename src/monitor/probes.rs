//! Metric probe battery and snapshot assembly.
//!
//! Four independent remote probes sample CPU load, memory usage, uptime
//! text and root-filesystem usage. They run concurrently over the session's
//! multiplexed channels and each outcome is collected independently: a
//! failed probe is substituted with its documented default, and only when
//! all four fail is the owning session considered dead.
//!
//! The memory probe runs under `LC_ALL=C` because `free` emits translated
//! row labels in some locales, which would break the `grep Mem` filter.

use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};

use super::error::MonitorError;
use super::session::{CommandOutput, Transport};
use super::types::{DiskUsage, MetricsSnapshot};

/// CPU busy percentage: user + system columns of the `top` summary line.
const CPU_PROBE: &str = r#"top -bn1 | grep "Cpu(s)" | awk '{print $2 + $4}' || echo "0.0""#;

/// Used-memory percentage, locale pinned so the `Mem` label survives.
const MEMORY_PROBE: &str =
    r#"LC_ALL=C free | grep Mem | awk '{printf("%.2f", $3/$2 * 100.0)}' || echo "0.0""#;

/// Human-readable uptime, preferring the pretty format where available.
const UPTIME_PROBE: &str = "uptime -p 2>/dev/null || uptime";

/// Root-filesystem usage column from `df`.
const DISK_PROBE: &str = r#"df -h | grep -E "/$" | awk '{print $5}' | head -1"#;

/// Executes the probe battery against an established session.
pub struct CommandRunner {
    probe_timeout: Duration,
}

impl CommandRunner {
    pub fn new(probe_timeout: Duration) -> Self {
        Self { probe_timeout }
    }

    /// Run all four probes and assemble a snapshot.
    ///
    /// Partial failure never fails the call; each failed probe falls back
    /// to its default (cpu/memory 0, uptime "unknown", disk "0%"). If all
    /// four fail the call fails with [`MonitorError::SessionDead`] and the
    /// caller must tear the owning session down.
    pub async fn sample(&self, transport: &Transport) -> Result<MetricsSnapshot, MonitorError> {
        let timeout = self.probe_timeout;
        let outcomes = join_all([
            transport.exec(CPU_PROBE, timeout),
            transport.exec(MEMORY_PROBE, timeout),
            transport.exec(UPTIME_PROBE, timeout),
            transport.exec(DISK_PROBE, timeout),
        ])
        .await;

        let cpu = numeric_value(&outcomes[0], "cpu");
        let memory = numeric_value(&outcomes[1], "memory");
        let uptime = text_value(&outcomes[2], "uptime");
        let disk = text_value(&outcomes[3], "disk");

        let failed = [
            cpu.is_none(),
            memory.is_none(),
            uptime.is_none(),
            disk.is_none(),
        ]
        .iter()
        .filter(|f| **f)
        .count();

        if failed == 4 {
            return Err(MonitorError::SessionDead(
                "all metric probes failed".to_string(),
            ));
        }

        if failed > 0 {
            debug!("{} of 4 metric probes failed, substituting defaults", failed);
        }

        Ok(MetricsSnapshot {
            cpu: cpu.unwrap_or(0.0),
            memory: memory.unwrap_or(0.0),
            uptime: uptime.unwrap_or_else(|| "unknown".to_string()),
            disk: DiskUsage {
                usage: disk.unwrap_or_else(|| "0%".to_string()),
            },
        })
    }
}

/// A numeric probe succeeded if it ran and its output contains a decimal
/// token. Missing tokens are a probe failure, not a parse error.
fn numeric_value(outcome: &Result<CommandOutput, MonitorError>, probe: &str) -> Option<f64> {
    match outcome {
        Ok(output) => {
            let value = first_decimal_token(&output.stdout);
            if value.is_none() {
                warn!(probe, stdout = %output.stdout.trim(), "probe output had no numeric token");
            }
            value
        }
        Err(error) => {
            warn!(probe, %error, "probe execution failed");
            None
        }
    }
}

/// A text probe succeeded if it ran and produced non-empty output.
fn text_value(outcome: &Result<CommandOutput, MonitorError>, probe: &str) -> Option<String> {
    match outcome {
        Ok(output) => {
            let trimmed = output.stdout.trim();
            if trimmed.is_empty() {
                warn!(probe, "probe produced empty output");
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Err(error) => {
            warn!(probe, %error, "probe execution failed");
            None
        }
    }
}

/// Extract the first decimal token (`45.67`, `12`) from free-form text.
pub(crate) fn first_decimal_token(text: &str) -> Option<f64> {
    let bytes = text.as_bytes();
    let mut start = None;

    for (i, b) in bytes.iter().enumerate() {
        if b.is_ascii_digit() {
            if start.is_none() {
                start = Some(i);
            }
        } else if let Some(s) = start {
            // Allow a single dot inside the token
            if *b == b'.' && !text[s..i].contains('.') && i + 1 < bytes.len() && bytes[i + 1].is_ascii_digit() {
                continue;
            }
            return text[s..i].parse().ok();
        }
    }

    start.and_then(|s| text[s..].parse().ok())
}
