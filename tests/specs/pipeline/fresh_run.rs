//! Fresh run: a single command in an empty output folder.

use crate::prelude::*;

const RUNBOOK: &str = r#"
name = "demo"

[[step]]
cmd = "echo hi > out.txt"
target = "out.txt"
"#;

#[test]
fn produces_target_and_completes() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("results");
    let runbook = write_runbook(dir.path(), RUNBOOK);

    let output = run_pipeline(&runbook, &out, &[]);

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(
        std::fs::read_to_string(out.join("out.txt")).unwrap(),
        "hi\n"
    );
    // Lock hygiene: nothing held after success.
    assert!(!out.join("lock.out.txt").exists());
    assert!(!out.join("recover.lock.out.txt").exists());
    // Exactly the completed flag remains.
    assert_eq!(flags(&out), vec!["demo_completed.flag".to_string()]);
}

#[test]
fn records_profile_commands_and_log() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("results");
    let runbook = write_runbook(dir.path(), RUNBOOK);

    run_pipeline(&runbook, &out, &[]);

    let rows = profile_rows(&out, "demo");
    assert_eq!(rows.len(), 1);
    // The logical command token leads the row.
    assert!(rows[0].starts_with("echo\tout.txt\t"), "row: {}", rows[0]);

    let commands = std::fs::read_to_string(out.join("demo_commands.sh")).unwrap();
    assert!(commands.contains("echo hi > out.txt"));

    let log = std::fs::read_to_string(out.join("demo_log.md")).unwrap();
    assert!(log.contains("Target to produce:"), "log: {log}");
    assert!(log.contains("Changed status from running to completed."));

    let stats = std::fs::read_to_string(out.join("stats.tsv")).unwrap();
    assert!(stats.lines().any(|l| l.starts_with("Time\t")));
    assert!(stats.lines().any(|l| l.starts_with("Success\t")));
}

#[test]
fn multi_mode_skips_the_run_log() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("results");
    let runbook = write_runbook(dir.path(), RUNBOOK);

    let output = run_pipeline(&runbook, &out, &["--multi"]);

    assert_eq!(output.status.code(), Some(0));
    assert!(!out.join("demo_log.md").exists());
    assert!(out.join("out.txt").is_file());
}
