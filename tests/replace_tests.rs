//! Crash-safe replacement and the guard-file gate: a failed replace never
//! corrupts the destination, and an unapproved target is never mutated.

mod common;

use common::{entry_count, errors, mirror, new_pair, temp_files, TGT};
use hobomirror::engine::SyncOptions;
use hobomirror::fs::memory::{FaultOp, MemoryFilesystem};
use hobomirror::report::Reporter;
use hobomirror::snapshot::PassthroughSnapshotter;
use hobomirror::task::{run_tasks, MirrorTask};

/// A rename failure after a completed content copy leaves the old bytes in
/// place plus a temp orphan; a rerun without the fault converges (S5).
#[test]
fn failed_rename_preserves_the_old_file() {
    let fs = new_pair();
    let new_bytes = vec![1u8; 256 * 1024];
    let old_bytes = vec![2u8; 128 * 1024];
    fs.add_file_with_mtime(r"C:\src\big.bin", &new_bytes, 2_000).unwrap();
    fs.add_file_with_mtime(r"T:\mirror\big.bin", &old_bytes, 1_000).unwrap();
    fs.inject_fault(FaultOp::Rename, r"T:\mirror\big.bin");

    let report = mirror(&fs);

    // Old content intact, orphaned temp file present, failure reported.
    assert_eq!(fs.file_content(r"T:\mirror\big.bin").unwrap(), old_bytes);
    assert_eq!(temp_files(&fs, TGT).len(), 1);
    assert_eq!(report.error_count(), 1, "{:?}", errors(&report));
    assert_eq!(report.critical_count(), 0);

    // Rerun with the fault gone: the replace completes.
    fs.clear_faults();
    let rerun = mirror(&fs);
    assert_eq!(fs.file_content(r"T:\mirror\big.bin").unwrap(), new_bytes);
    assert_eq!(rerun.error_count(), 0);
}

/// A content-copy failure aborts before the destination is ever touched.
#[test]
fn failed_copy_never_touches_the_destination() {
    let fs = new_pair();
    fs.add_file_with_mtime(r"C:\src\doc.txt", b"new", 2_000).unwrap();
    fs.add_file_with_mtime(r"T:\mirror\doc.txt", b"old", 1_000).unwrap();
    fs.inject_fault(FaultOp::ReadContent, r"C:\src\doc.txt");

    let report = mirror(&fs);

    assert_eq!(fs.file_content(r"T:\mirror\doc.txt").unwrap(), b"old");
    assert_eq!(report.error_count(), 1);
}

/// The temp file lands in the destination directory, not somewhere global.
#[test]
fn temp_file_is_a_sibling_of_the_destination() {
    let fs = new_pair();
    fs.add_file_with_mtime(r"C:\src\sub\f.bin", b"new!", 2_000).unwrap();
    fs.add_file_with_mtime(r"T:\mirror\sub\f.bin", b"old!", 1_000).unwrap();
    fs.inject_fault(FaultOp::Rename, r"T:\mirror\sub\f.bin");

    mirror(&fs);

    assert_eq!(temp_files(&fs, r"T:\mirror\sub").len(), 1);
    assert_eq!(temp_files(&fs, TGT).len(), 0);
}

fn guarded_target(fs: &MemoryFilesystem, approval: &[u8]) {
    fs.add_file(r"T:\mirror\__HoboMirrorTarget__.txt", approval).unwrap();
}

fn run_one_task(fs: &MemoryFilesystem) -> (Reporter, hobomirror::Result<()>) {
    let report = Reporter::with_capture();
    let tasks = vec![MirrorTask {
        source_root: r"C:\src".to_string(),
        target_root: r"T:\mirror".to_string(),
    }];
    let outcome = run_tasks(
        fs,
        &report,
        &SyncOptions::everything(),
        &tasks,
        &mut PassthroughSnapshotter,
    );
    (report, outcome)
}

/// A missing guard file means zero mutations and exit code 1 (S6, P4).
#[test]
fn missing_guard_file_blocks_all_mutations() {
    let fs = new_pair();
    fs.add_file(r"C:\src\new.txt", b"n").unwrap();
    fs.add_file(r"T:\mirror\stale.txt", b"s").unwrap();
    let before = entry_count(&fs, TGT);

    let (report, outcome) = run_one_task(&fs);

    assert!(outcome.is_err());
    assert_eq!(entry_count(&fs, TGT), before);
    assert!(fs.exists(r"T:\mirror\stale.txt"));
    assert!(!fs.exists(r"T:\mirror\new.txt"));
    assert_eq!(report.action_count(), 0);
    assert_eq!(report.exit_code(), 1);
}

/// A guard file without the approval word blocks the same way.
#[test]
fn unapproved_guard_file_blocks_all_mutations() {
    let fs = new_pair();
    guarded_target(&fs, b"deny");
    fs.add_file(r"C:\src\new.txt", b"n").unwrap();

    let (report, outcome) = run_one_task(&fs);

    assert!(outcome.is_err());
    assert!(!fs.exists(r"T:\mirror\new.txt"));
    assert_eq!(report.action_count(), 0);
}

/// With an approved guard file the task runs — and the guard file itself
/// is never compared, copied, or deleted.
#[test]
fn guard_file_survives_the_mirror() {
    let fs = new_pair();
    guarded_target(&fs, b"ALLOW destructive mirroring");
    fs.add_file(r"C:\src\data.txt", b"d").unwrap();

    let (report, outcome) = run_one_task(&fs);

    assert!(outcome.is_ok());
    assert_eq!(report.exit_code(), 0);
    assert_eq!(fs.file_content(r"T:\mirror\data.txt").unwrap(), b"d");
    assert!(fs.exists(r"T:\mirror\__HoboMirrorTarget__.txt"));
    assert!(!fs.exists(r"C:\src\__HoboMirrorTarget__.txt"));
    // No "deleted" change for the guard file either.
    assert!(common::changes(&report).iter().all(|l| !l.contains("__HoboMirrorTarget__")));
}

/// A guard file in the SOURCE is not replicated onto the target either.
#[test]
fn source_guard_file_is_not_copied() {
    let fs = new_pair();
    guarded_target(&fs, b"allow");
    fs.add_file(r"C:\src\__HoboMirrorTarget__.txt", b"allow").unwrap();
    fs.add_file(r"C:\src\payload.txt", b"p").unwrap();

    let (report, _) = run_one_task(&fs);

    // The target's own guard file stays exactly as the operator wrote it.
    assert_eq!(
        fs.file_content(r"T:\mirror\__HoboMirrorTarget__.txt").unwrap(),
        b"allow"
    );
    assert!(fs.exists(r"T:\mirror\payload.txt"));
    assert_eq!(report.error_count(), 0);
}
