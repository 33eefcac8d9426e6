//! Nofail steps: non-essential commands may fail without sinking the run.

use crate::prelude::*;

#[test]
fn nofail_step_failure_does_not_sink_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("results");
    let runbook = write_runbook(
        dir.path(),
        r#"
name = "demo"

[[step]]
cmd = "false"
lock = "optional-step"
nofail = true
errmsg = "optional step failed; carrying on"

[[step]]
cmd = "echo hi > out.txt"
target = "out.txt"
"#,
    );

    let output = run_pipeline(&runbook, &out, &[]);

    assert_eq!(output.status.code(), Some(0));
    assert!(out.join("out.txt").is_file());
    assert_eq!(flags(&out), vec!["demo_completed.flag".to_string()]);

    let log = std::fs::read_to_string(out.join("demo_log.md")).unwrap();
    assert!(log.contains("optional step failed"), "log: {log}");
    assert!(log.contains("nofail=true"), "log: {log}");
}

#[test]
fn ordinary_step_failure_fails_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("results");
    let runbook = write_runbook(
        dir.path(),
        r#"
name = "demo"

[[step]]
cmd = "false"
lock = "doomed-step"

[[step]]
cmd = "echo hi > out.txt"
target = "out.txt"
"#,
    );

    let output = run_pipeline(&runbook, &out, &[]);

    assert_eq!(output.status.code(), Some(1));
    assert!(out.join("demo_failed.flag").is_file());
    // The second step never ran.
    assert!(!out.join("out.txt").exists());
    // The failed step's lock is preserved for the post-mortem.
    assert!(out.join("lock.doomed-step").is_file());
}
