//! Test helpers for behavioral specifications.
//!
//! Provides a small DSL for driving the `sluice` binary and polling the
//! on-disk markers it leaves behind.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::time::{Duration, Instant};

/// Polling cadence for on-disk marker checks.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Upper bound for any single wait in a spec.
pub const WAIT_MAX: Duration = Duration::from_secs(10);

/// Returns the path to a workspace binary, checking the llvm-cov target
/// directory first so coverage runs find the right build. Falls back to
/// resolving relative to the test binary itself.
fn binary_path(name: &str) -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));

    let llvm_cov_path = manifest_dir.join("target/llvm-cov-target/debug").join(name);
    if llvm_cov_path.exists() {
        return llvm_cov_path;
    }

    let standard = manifest_dir.join("target/debug").join(name);
    if standard.exists() {
        return standard;
    }

    // The test binary lives at target/debug/deps/specs-<hash>, so its
    // grandparent is target/debug/ where sluice is built.
    if let Ok(exe) = std::env::current_exe() {
        if let Some(debug_dir) = exe.parent().and_then(|d| d.parent()) {
            let fallback = debug_dir.join(name);
            if fallback.exists() {
                return fallback;
            }
        }
    }

    standard
}

/// Returns a Command configured to run the sluice binary.
pub fn sluice_cmd() -> Command {
    Command::new(binary_path("sluice"))
}

/// Run `sluice run` on a runbook and wait for it to finish.
pub fn run_pipeline(runbook: &Path, outfolder: &Path, extra_args: &[&str]) -> Output {
    sluice_cmd()
        .arg("run")
        .arg(runbook)
        .arg("--outfolder")
        .arg(outfolder)
        .args(extra_args)
        .output()
        .expect("failed to run sluice")
}

/// Start `sluice run` in the background.
pub fn spawn_pipeline(runbook: &Path, outfolder: &Path, extra_args: &[&str]) -> Child {
    sluice_cmd()
        .arg("run")
        .arg(runbook)
        .arg("--outfolder")
        .arg(outfolder)
        .args(extra_args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn sluice")
}

/// Write a runbook file into `dir` and return its path.
pub fn write_runbook(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("pipeline.toml");
    std::fs::write(&path, contents).unwrap();
    path
}

/// Poll until `predicate` holds or [`WAIT_MAX`] elapses.
pub fn wait_until(predicate: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < WAIT_MAX {
        if predicate() {
            return true;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    false
}

/// Poll until a path exists.
pub fn wait_for_path(path: &Path) -> bool {
    wait_until(|| path.exists())
}

/// Deliver SIGTERM to a process.
pub fn terminate(pid: u32) {
    let _ = Command::new("kill")
        .args(["-15", &pid.to_string()])
        .status();
}

/// Non-comment, non-empty rows of a pipeline's profile file.
pub fn profile_rows(outfolder: &Path, name: &str) -> Vec<String> {
    std::fs::read_to_string(outfolder.join(format!("{}_profile.tsv", name)))
        .unwrap_or_default()
        .lines()
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Names of all flag files in an output folder.
pub fn flags(outfolder: &Path) -> Vec<String> {
    let mut flags: Vec<String> = std::fs::read_dir(outfolder)
        .into_iter()
        .flatten()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".flag"))
        .collect();
    flags.sort();
    flags
}
