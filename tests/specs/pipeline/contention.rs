//! Lock contention between cooperating managers sharing an outfolder.

use crate::prelude::*;
use sluice_core::Status;
use sluice_engine::{PipelineManager, RunOpts, Settings};

#[tokio::test]
async fn waiter_observes_the_target_and_skips() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().to_path_buf();
    let target = out.join("shared.txt");

    // Manager A holds the lock (simulating a run in progress elsewhere).
    std::fs::write(out.join("lock.shared.txt"), "").unwrap();

    let b = PipelineManager::new(Settings::new("pipe_b", &out)).unwrap();
    let task = {
        let b = b.clone();
        let target = target.clone();
        tokio::spawn(async move { b.run(RunOpts::new("echo never-runs").target(&target)).await })
    };

    // B advertises the wait.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert_eq!(b.status(), Status::Waiting);
    assert!(out.join("pipe_b_waiting.flag").is_file());

    // A finishes: target appears, lock is released.
    std::fs::write(&target, "payload").unwrap();
    std::fs::remove_file(out.join("lock.shared.txt")).unwrap();

    let code = task.await.unwrap().unwrap();
    assert_eq!(code, 0);
    assert_eq!(b.status(), Status::Running);
    // B never executed: A's payload is untouched.
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "payload");

    b.complete().await.unwrap();
    assert_eq!(flags(&out), vec!["pipe_b_completed.flag".to_string()]);
}

#[test]
fn two_processes_never_run_the_same_target_twice() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("results");

    // Both pipelines append to a shared audit file before producing the
    // same target; mutual exclusion means exactly one executes.
    let runbook_a = write_runbook(
        dir.path(),
        r#"
name = "pipe_a"

[[step]]
cmd = "bash -c 'echo ran >> audit.txt; sleep 0.8; echo done > shared.txt'"
target = "shared.txt"
shell = "never"
"#,
    );
    let mut first = spawn_pipeline(&runbook_a, &out, &[]);
    assert!(wait_for_path(&out.join("lock.shared.txt")));

    let runbook_b = dir.path().join("pipeline_b.toml");
    std::fs::write(
        &runbook_b,
        r#"
name = "pipe_b"

[[step]]
cmd = "bash -c 'echo ran >> audit.txt; echo done > shared.txt'"
target = "shared.txt"
shell = "never"
"#,
    )
    .unwrap();
    let second = run_pipeline(&runbook_b, &out, &[]);

    let first_status = first.wait().unwrap();
    assert!(first_status.success());
    assert_eq!(second.status.code(), Some(0));

    // One execution, two clean completions.
    assert_eq!(
        std::fs::read_to_string(out.join("audit.txt")).unwrap(),
        "ran\n"
    );
    assert_eq!(
        std::fs::read_to_string(out.join("shared.txt")).unwrap(),
        "done\n"
    );
}
