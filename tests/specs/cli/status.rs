//! `sluice status`: reading flag files back.

use crate::prelude::*;

#[test]
fn reports_pipeline_statuses_from_flags() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("rnaseq_completed.flag"), "").unwrap();
    std::fs::write(dir.path().join("wgbs_failed.flag"), "").unwrap();

    let output = sluice_cmd()
        .args(["status", "--outfolder"])
        .arg(dir.path())
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("rnaseq: completed"), "stdout: {stdout}");
    assert!(stdout.contains("wgbs: failed"), "stdout: {stdout}");
}

#[test]
fn name_filter_narrows_the_report() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("rnaseq_completed.flag"), "").unwrap();
    std::fs::write(dir.path().join("wgbs_failed.flag"), "").unwrap();

    let output = sluice_cmd()
        .args(["status", "--name", "rnaseq", "--outfolder"])
        .arg(dir.path())
        .output()
        .unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("rnaseq"));
    assert!(!stdout.contains("wgbs"));
}

#[test]
fn empty_folder_reports_nothing_found() {
    let dir = tempfile::tempdir().unwrap();
    let output = sluice_cmd()
        .args(["status", "--outfolder"])
        .arg(dir.path())
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("no pipeline flags"));
}
