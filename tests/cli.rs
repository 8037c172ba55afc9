use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const CHECKING_CSV: &str = "\
Date,Description,Amount,Type,Category
01/15/2025,Acme Market,12.50,Debit,
01/16/2025,Corner Bistro,\"$1,030.00\",Debit,Restaurants
01/17/2025,Mystery Shop,4.00,Debit,
";

/// Runs the binary with `$HOME` pointed at a scratch directory so settings
/// never touch the real user config.
fn ledgerline(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("ledgerline").unwrap();
    cmd.env("HOME", home).env_remove("RUST_LOG");
    cmd
}

fn initialized() -> (TempDir, PathBuf) {
    let home = tempfile::tempdir().unwrap();
    let data_dir = home.path().join("books");
    ledgerline(home.path())
        .args(["init", "--data-dir"])
        .arg(&data_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized"));
    (home, data_dir)
}

#[test]
fn help_lists_commands() {
    let home = tempfile::tempdir().unwrap();
    ledgerline(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ingest").and(predicate::str::contains("reconcile")));
}

#[test]
fn init_writes_defaults_once() {
    let (home, data_dir) = initialized();
    assert!(data_dir.join("ledgerline.db").exists());
    assert!(data_dir.join("rules.json").exists());
    assert!(data_dir.join("sources.json").exists());
    assert!(data_dir.join("archive").is_dir());

    ledgerline(home.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Kept existing rules.json"));
}

#[test]
fn commands_before_init_fail() {
    let home = tempfile::tempdir().unwrap();
    ledgerline(home.path())
        .arg("duplicates")
        .assert()
        .failure()
        .stderr(predicate::str::contains("ledgerline init"));
}

#[test]
fn ingest_routes_and_status_counts() {
    let (home, data_dir) = initialized();
    let input = home.path().join("checking.csv");
    std::fs::write(&input, CHECKING_CSV).unwrap();

    ledgerline(home.path())
        .args(["vendors", "learn", "Acme Market", "--category", "Groceries"])
        .assert()
        .success();

    ledgerline(home.path())
        .arg("ingest")
        .arg(&input)
        .args(["--source", "checking", "--archive"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cell errors").and(predicate::str::contains("Archived")));
    assert!(!input.exists());
    assert!(data_dir.join("archive").join("checking.csv").exists());

    ledgerline(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Ledger:      2").and(predicate::str::contains("Quarantine:  1")));

    ledgerline(home.path()).arg("export").assert().success();
    let exported = std::fs::read_to_string(data_dir.join("ledger.csv")).unwrap();
    assert!(exported.starts_with("date,vendor,amount,transaction_type,category"));
    assert!(exported.contains("2025-01-16,Corner Bistro,1030.00,Debit,Restaurants"));
    assert!(exported.contains("Groceries"));
}

#[test]
fn ingest_same_file_twice_is_refused() {
    let (home, _) = initialized();
    let input = home.path().join("checking.csv");
    std::fs::write(&input, CHECKING_CSV).unwrap();

    for expected in ["Ledger", "already been ingested"] {
        ledgerline(home.path())
            .arg("ingest")
            .arg(&input)
            .args(["--source", "checking"])
            .assert()
            .success()
            .stdout(predicate::str::contains(expected));
    }
}

#[test]
fn unknown_source_is_configuration_error() {
    let (home, _) = initialized();
    let input = home.path().join("in.csv");
    std::fs::write(&input, CHECKING_CSV).unwrap();

    ledgerline(home.path())
        .arg("ingest")
        .arg(&input)
        .args(["--source", "brokerage"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error for source 'brokerage'"));
}

#[test]
fn learn_rejects_unknown_category() {
    let (home, _) = initialized();
    ledgerline(home.path())
        .args(["vendors", "learn", "Acme", "--category", "Yachts"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown category"));
}

#[test]
fn reconcile_with_empty_queue_finishes() {
    let (home, _) = initialized();
    ledgerline(home.path())
        .args(["reconcile", "--timeout", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 resolved, 0 still pending"));
}
