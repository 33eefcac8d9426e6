// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child memory sampling.
//!
//! Direct children are sampled from `/proc/<pid>/status`; containerized
//! commands fall back to a one-shot `docker stats` probe. Sampling is a
//! capability, not a requirement: every failure mode (no `/proc`, child
//! already gone, unparsable stats output) degrades to `None` and the
//! profile row simply omits the memory figure.

use tokio::process::Command;

/// Which `/proc` memory figure to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(dead_code)] // profiling defaults to the high-water mark
pub(crate) enum MemCategory {
    /// VmHWM: resident high-water mark.
    #[default]
    HighWater,
    /// VmPeak: peak virtual size.
    Peak,
    /// VmRSS: current resident size.
    Rss,
}

impl MemCategory {
    fn field(self) -> &'static str {
        match self {
            MemCategory::HighWater => "VmHWM",
            MemCategory::Peak => "VmPeak",
            MemCategory::Rss => "VmRSS",
        }
    }
}

/// Sample a direct child's memory in kB from `/proc/<pid>/status`.
///
/// Returns `None` when the file is gone (child exited) or `/proc` is
/// unavailable on this platform.
pub(crate) fn sample_direct(pid: u32, category: MemCategory) -> Option<f64> {
    let status = std::fs::read_to_string(format!("/proc/{}/status", pid)).ok()?;
    parse_proc_status(&status, category)
}

/// Parse a `/proc/<pid>/status` body for the requested memory line.
///
/// Lines look like `VmHWM:     1234 kB`; the kernel always reports kB.
pub(crate) fn parse_proc_status(status: &str, category: MemCategory) -> Option<f64> {
    let field = category.field();
    for line in status.lines() {
        let Some(rest) = line.strip_prefix(field) else {
            continue;
        };
        let Some(rest) = rest.strip_prefix(':') else {
            continue;
        };
        let mut parts = rest.split_whitespace();
        return parts.next().and_then(|n| n.parse::<f64>().ok());
    }
    None
}

/// Sample a container's memory in kB via one-shot `docker stats`.
pub(crate) async fn sample_container(container: &str) -> Option<f64> {
    let output = Command::new("docker")
        .args(["stats", container, "--format", "{{.MemUsage}}", "--no-stream"])
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    parse_mem_usage(&String::from_utf8_lossy(&output.stdout))
}

/// Blocking variant of [`sample_container`], for the synchronous
/// teardown path.
pub(crate) fn sample_container_blocking(container: &str) -> Option<f64> {
    let output = std::process::Command::new("docker")
        .args(["stats", container, "--format", "{{.MemUsage}}", "--no-stream"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    parse_mem_usage(&String::from_utf8_lossy(&output.stdout))
}

/// Parse a docker `MemUsage` string of the form `<num><unit> / <limit>`
/// into kB.
pub(crate) fn parse_mem_usage(mem_usage: &str) -> Option<f64> {
    let used = mem_usage.split('/').next()?.trim();
    let digits_end = used
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(used.len());
    let number: f64 = used[..digits_end].parse().ok()?;
    let unit = used[digits_end..].trim();
    match unit {
        "GiB" => Some(number * 1e6),
        "MiB" => Some(number * 1e3),
        "KiB" => Some(number),
        // B, or a unit docker grows later
        _ => None,
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
