//! Reparse-safe deletion: pruning a target tree removes links as single
//! entries and never reaches through them.

mod common;

use common::{mirror, new_pair, TGT};
use hobomirror::fs::AttributeFlags;

/// Deleting a tree that contains a junction leaves the junction target
/// untouched (S4).
#[test]
fn deep_delete_does_not_follow_junctions() {
    let fs = new_pair();
    // Stand-in for C:\windows: must survive unscathed.
    fs.add_file(r"C:\windows\notepad.exe", b"MZ").unwrap();
    fs.add_file(r"T:\mirror\d\sub\file.txt", b"bytes").unwrap();
    fs.add_junction(r"T:\mirror\d\link", r"\??\C:\windows", r"C:\windows").unwrap();

    let report = mirror(&fs);

    assert!(!fs.exists(r"T:\mirror\d"));
    assert!(fs.exists(r"C:\windows\notepad.exe"));
    assert_eq!(fs.file_content(r"C:\windows\notepad.exe").unwrap(), b"MZ");
    assert_eq!(report.error_count(), 0);
    // The junction's own children were never enumerated.
    assert!(
        !fs.listed_paths()
            .iter()
            .any(|p| p.to_lowercase().contains(r"mirror\d\link")),
        "listed: {:?}",
        fs.listed_paths()
    );
}

/// Directory symlinks on either side are opaque: their targets are never
/// listed during reconciliation (P2).
#[test]
fn reconciliation_never_enumerates_link_targets() {
    let fs = new_pair();
    fs.add_file(r"C:\real\inner\deep.txt", b"d").unwrap();
    fs.add_dir_symlink(r"C:\src\into_real", r"\??\C:\real", r"C:\real", false).unwrap();
    // A link pointing INTO the target itself must not cause re-entry.
    fs.add_dir_symlink(r"C:\src\into_mirror", r"\??\T:\mirror", r"T:\mirror", false).unwrap();

    let report = mirror(&fs);

    assert_eq!(report.error_count(), 0);
    assert_eq!(
        fs.reparse_of(r"T:\mirror\into_real").unwrap().substitute_name,
        r"\??\C:\real"
    );
    for listed in fs.listed_paths() {
        let l = listed.to_lowercase();
        assert!(
            !l.starts_with(r"c:\real"),
            "link target was enumerated: {listed}"
        );
        assert!(
            !l.contains("into_"),
            "a link itself was enumerated: {listed}"
        );
    }
}

/// Read-only entries delete without a separate attribute dance.
#[test]
fn read_only_entries_are_deleted() {
    let fs = new_pair();
    fs.add_file(r"T:\mirror\locked.txt", b"x").unwrap();
    fs.add_attr_flags(r"T:\mirror\locked.txt", AttributeFlags::READ_ONLY).unwrap();
    fs.add_dir(r"T:\mirror\lockeddir").unwrap();
    fs.add_attr_flags(r"T:\mirror\lockeddir", AttributeFlags::READ_ONLY).unwrap();

    let report = mirror(&fs);

    assert_eq!(fs.child_names(TGT), Vec::<String>::new());
    assert_eq!(report.error_count(), 0);
}

/// A deleted directory symlink takes only the link with it.
#[test]
fn deleting_a_dir_symlink_keeps_the_target() {
    let fs = new_pair();
    fs.add_file(r"C:\real\keep.txt", b"k").unwrap();
    fs.add_dir_symlink(r"T:\mirror\stale", r"\??\C:\real", r"C:\real", false).unwrap();

    mirror(&fs);

    assert!(!fs.exists(r"T:\mirror\stale"));
    assert!(fs.exists(r"C:\real\keep.txt"));
}
