//! Dynamic recovery: a SIGTERM'd run leaves recovery markers that the
//! next run consumes.

use crate::prelude::*;

#[test]
fn sigterm_leaves_recovery_markers_and_rerun_consumes_them() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("results");

    // First launch: the step will outlive our patience.
    let slow = write_runbook(
        dir.path(),
        r#"
name = "demo"

[[step]]
cmd = "sleep 30"
target = "out.txt"
"#,
    );
    let mut child = spawn_pipeline(&slow, &out, &[]);

    assert!(
        wait_for_path(&out.join("lock.out.txt")),
        "pipeline never acquired its lock"
    );
    terminate(child.id());
    let status = child.wait().unwrap();
    assert_eq!(status.code(), Some(1));

    // Graceful failure: failed flag, recovery marker, lock preserved.
    assert!(out.join("demo_failed.flag").is_file());
    assert!(out.join("lock.out.txt").is_file());
    assert!(out.join("recover.lock.out.txt").is_file());
    assert!(!out.join("out.txt").exists());

    // Second launch (same pipeline, now with a fast producer): finds
    // the recovery file, seizes the lock, and redoes the work.
    let fast = write_runbook(
        dir.path(),
        r#"
name = "demo"

[[step]]
cmd = "echo done > out.txt"
target = "out.txt"
"#,
    );
    let output = run_pipeline(&fast, &out, &[]);

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(
        std::fs::read_to_string(out.join("out.txt")).unwrap(),
        "done\n"
    );
    assert!(!out.join("lock.out.txt").exists());
    assert!(!out.join("recover.lock.out.txt").exists());
    assert_eq!(flags(&out), vec!["demo_completed.flag".to_string()]);

    let log = std::fs::read_to_string(out.join("demo_log.md")).unwrap();
    assert!(log.contains("Got SIGTERM"), "log: {log}");
    assert!(
        log.contains("dynamic recovery file"),
        "log: {log}"
    );
}

#[test]
fn recover_flag_overrides_a_foreign_lock() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("results");
    std::fs::create_dir_all(&out).unwrap();
    // A dead run's lock, with no recovery marker.
    std::fs::write(out.join("lock.out.txt"), "").unwrap();

    let runbook = write_runbook(
        dir.path(),
        r#"
name = "demo"

[[step]]
cmd = "echo done > out.txt"
target = "out.txt"
"#,
    );
    let output = run_pipeline(&runbook, &out, &["--recover"]);

    assert_eq!(output.status.code(), Some(0));
    assert!(out.join("out.txt").is_file());
    assert!(!out.join("lock.out.txt").exists());
}
