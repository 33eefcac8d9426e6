//! CLI surface: help and argument errors.

use crate::prelude::*;

#[test]
fn help_lists_subcommands() {
    let output = sluice_cmd().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("run"), "help: {stdout}");
    assert!(stdout.contains("status"), "help: {stdout}");
}

#[test]
fn version_prints_and_exits_zero() {
    let output = sluice_cmd().arg("--version").output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("sluice"));
}

#[test]
fn unknown_subcommand_is_an_error() {
    let output = sluice_cmd().arg("frobnicate").output().unwrap();
    assert!(!output.status.success());
}

#[test]
fn run_requires_an_outfolder() {
    let output = sluice_cmd().args(["run", "pipeline.toml"]).output().unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--outfolder"));
}

#[test]
fn missing_runbook_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_pipeline(
        &dir.path().join("nonexistent.toml"),
        &dir.path().join("out"),
        &[],
    );
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("error"));
}
