//! Resumption: existing targets and checkpoints make re-runs cheap.

use crate::prelude::*;

const RUNBOOK: &str = r#"
name = "demo"

[[step]]
cmd = "echo hi > out.txt"
target = "out.txt"
"#;

#[test]
fn second_run_skips_completed_work() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("results");
    let runbook = write_runbook(dir.path(), RUNBOOK);

    run_pipeline(&runbook, &out, &[]);
    assert_eq!(profile_rows(&out, "demo").len(), 1);

    let output = run_pipeline(&runbook, &out, &[]);

    assert_eq!(output.status.code(), Some(0));
    // No child was spawned the second time.
    assert_eq!(profile_rows(&out, "demo").len(), 1);
    let log = std::fs::read_to_string(out.join("demo_log.md")).unwrap();
    assert!(log.contains("Target exists:"), "log: {log}");
}

#[test]
fn checkpointed_stage_is_skipped_on_rerun() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("results");
    let runbook = write_runbook(
        dir.path(),
        r#"
name = "demo"

[[step]]
cmd = "date +%s%N > stamp.txt"
target = "stamp.txt"
checkpoint = "make stamp"
"#,
    );

    run_pipeline(&runbook, &out, &[]);
    assert!(out.join("make_stamp.checkpoint").is_file());
    let first = std::fs::read_to_string(out.join("stamp.txt")).unwrap();

    // Remove the target; only the checkpoint should prevent a re-run.
    std::fs::remove_file(out.join("stamp.txt")).unwrap();
    let output = run_pipeline(&runbook, &out, &[]);

    assert_eq!(output.status.code(), Some(0));
    assert!(!out.join("stamp.txt").exists(), "stage was re-executed");

    // With --overwrite-checkpoints the stage runs again.
    let output = run_pipeline(&runbook, &out, &["--overwrite-checkpoints"]);
    assert_eq!(output.status.code(), Some(0));
    let second = std::fs::read_to_string(out.join("stamp.txt")).unwrap();
    assert_ne!(first, second);
}
