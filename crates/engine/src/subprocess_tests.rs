// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::manager::Settings;
use std::path::Path;
use std::time::Duration;

fn manager(dir: &Path) -> PipelineManager {
    PipelineManager::new(Settings::new("testpipe", dir)).unwrap()
}

#[tokio::test]
async fn successful_command_reports_zero() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(dir.path());

    let (code, _mem) = mgr
        .execute_command("true", false, None, "lockname")
        .await
        .unwrap();

    assert_eq!(code, 0);
    assert!(mgr.shared.state.lock().procs.is_empty());
}

#[tokio::test]
async fn nonzero_exit_is_a_process_error() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(dir.path());

    let err = mgr
        .execute_command("false", false, None, "lockname")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Process { code: 1, ref command } if command == "false"
    ));
    // The child was still profiled and unregistered.
    assert!(mgr.shared.state.lock().procs.is_empty());
    let profile = std::fs::read_to_string(dir.path().join("testpipe_profile.tsv")).unwrap();
    assert!(profile.lines().any(|l| l.starts_with("false\tlockname\t")));
}

#[tokio::test]
async fn spawn_failure_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(dir.path());

    let err = mgr
        .execute_command("definitely-not-a-real-binary-xyz", false, None, "l")
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Io(_)));
}

#[tokio::test]
async fn commands_are_recorded_in_the_commands_file() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(dir.path());

    mgr.execute_command("true", false, None, "l").await.unwrap();

    let commands = std::fs::read_to_string(dir.path().join("testpipe_commands.sh")).unwrap();
    // Each command sits on its own line, preceded by a blank line.
    assert!(commands.contains("\n\ntrue\n"), "commands: {commands:?}");
}

#[tokio::test]
async fn fire_and_forget_returns_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let mgr =
        PipelineManager::new(Settings::new("testpipe", dir.path()).wait(false)).unwrap();

    let started = std::time::Instant::now();
    let (code, mem) = mgr
        .execute_command("sleep 5", false, None, "l")
        .await
        .unwrap();

    assert_eq!((code, mem), (0, None));
    assert!(started.elapsed() < Duration::from_secs(1));
    // The pid stays registered; the supervisor still owns its teardown.
    assert_eq!(mgr.shared.state.lock().procs.len(), 1);
    mgr.shared.terminate_running_children();
}

#[tokio::test]
async fn terminate_running_children_delivers_sigterm() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(dir.path());

    let mut child = std::process::Command::new("sleep")
        .arg("30")
        .spawn()
        .unwrap();
    let pid = child.id();
    mgr.shared.state.lock().procs.insert(
        pid,
        crate::manager::ProcRecord {
            name: "sleep".to_string(),
            start: mgr.shared.clock.now(),
            container: None,
        },
    );

    mgr.shared.terminate_running_children();

    let status = child.wait().unwrap();
    assert!(!status.success());
    assert!(mgr.shared.state.lock().procs.is_empty());
    // A final profile row was recorded for the terminated child.
    let profile = std::fs::read_to_string(dir.path().join("testpipe_profile.tsv")).unwrap();
    assert!(profile.lines().any(|l| l.starts_with("sleep\t-\t")));
}

#[tokio::test]
async fn peak_memory_is_monotonic() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(dir.path());

    {
        let mut inner = mgr.shared.state.lock();
        inner.peak_memory_kb = 2_000_000.0;
    }
    // A small child cannot lower the recorded pipeline peak.
    mgr.execute_command("true", false, None, "l").await.unwrap();

    assert!(mgr.peak_memory_gb() >= 2.0);
}
