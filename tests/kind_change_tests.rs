//! Entry-kind transitions: whenever an entry's kind differs between source
//! and target, the target entry is deleted and recreated as the source
//! kind, with an observable kind-change event.

mod common;

use common::{changes, mirror, new_pair};
use hobomirror::fs::memory::MemoryFilesystem;
use hobomirror::fs::{REPARSE_TAG_MOUNT_POINT, REPARSE_TAG_SYMLINK};
use rstest::rstest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    File,
    Dir,
    FileSymlink,
    DirSymlink,
    Junction,
}

impl Kind {
    fn label(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Dir => "directory",
            Self::FileSymlink => "file symlink",
            Self::DirSymlink => "directory symlink",
            Self::Junction => "junction",
        }
    }
}

fn stage(fs: &MemoryFilesystem, path: &str, kind: Kind) {
    match kind {
        Kind::File => fs.add_file_with_mtime(path, b"payload", 1_234).unwrap(),
        Kind::Dir => fs.add_dir(path).unwrap(),
        Kind::FileSymlink => fs
            .add_file_symlink(path, r"..\elsewhere.txt", r"..\elsewhere.txt", true)
            .unwrap(),
        Kind::DirSymlink => fs
            .add_dir_symlink(path, r"\??\C:\elsewhere", r"C:\elsewhere", false)
            .unwrap(),
        Kind::Junction => fs.add_junction(path, r"\??\C:\foo", r"C:\foo").unwrap(),
    }
}

fn assert_kind(fs: &MemoryFilesystem, path: &str, kind: Kind) {
    let attrs = fs.attrs_of(path).unwrap_or_else(|| panic!("{path} missing"));
    let reparse = fs.reparse_of(path);
    match kind {
        Kind::File => {
            assert!(!attrs.is_directory());
            assert_eq!(reparse, None);
            assert_eq!(fs.file_content(path).unwrap(), b"payload");
        }
        Kind::Dir => {
            assert!(attrs.is_directory());
            assert_eq!(reparse, None);
        }
        Kind::FileSymlink => {
            assert!(!attrs.is_directory());
            assert_eq!(reparse.unwrap().tag, REPARSE_TAG_SYMLINK);
        }
        Kind::DirSymlink => {
            assert!(attrs.is_directory());
            assert_eq!(reparse.unwrap().tag, REPARSE_TAG_SYMLINK);
        }
        Kind::Junction => {
            assert!(attrs.is_directory());
            assert_eq!(reparse.unwrap().tag, REPARSE_TAG_MOUNT_POINT);
        }
    }
}

/// Every directed transition among the five kinds produces
/// delete-then-create with a kind-change event.
#[rstest]
fn kind_transitions_recreate_the_entry(
    #[values(Kind::File, Kind::Dir, Kind::FileSymlink, Kind::DirSymlink, Kind::Junction)]
    existing: Kind,
    #[values(Kind::File, Kind::Dir, Kind::FileSymlink, Kind::DirSymlink, Kind::Junction)]
    desired: Kind,
) {
    if existing == desired {
        return;
    }
    let fs = new_pair();
    stage(&fs, r"C:\src\x", desired);
    stage(&fs, r"T:\mirror\x", existing);
    if existing == Kind::Dir {
        // Kind-change deletion must also clear the old directory's contents.
        fs.add_file(r"T:\mirror\x\leftover.txt", b"old").unwrap();
    }

    let report = mirror(&fs);

    assert_eq!(report.error_count(), 0, "{:?}", common::errors(&report));
    assert_kind(&fs, r"T:\mirror\x", desired);
    let expected = format!("kind change from {} to {}", existing.label(), desired.label());
    assert!(
        changes(&report).iter().any(|l| l.contains(&expected)),
        "missing \"{expected}\" in {:?}",
        changes(&report)
    );
}

/// File → junction specifically preserves the junction's substitute name
/// (S2).
#[test]
fn file_to_junction_swap_carries_the_target() {
    let fs = new_pair();
    fs.add_junction(r"C:\src\x", r"\??\C:\foo", r"C:\foo").unwrap();
    fs.add_file(r"T:\mirror\x", b"abcd").unwrap();

    let report = mirror(&fs);

    let reparse = fs.reparse_of(r"T:\mirror\x").unwrap();
    assert_eq!(reparse.tag, REPARSE_TAG_MOUNT_POINT);
    assert_eq!(reparse.substitute_name, r"\??\C:\foo");
    let change_lines = changes(&report);
    assert_eq!(change_lines.len(), 1);
    assert!(change_lines[0].contains("kind change from file to junction"));
}

/// A same-kind junction whose target moved is deleted and recreated.
#[test]
fn junction_target_change_recreates_the_link() {
    let fs = new_pair();
    fs.add_junction(r"C:\src\j", r"\??\C:\new", r"C:\new").unwrap();
    fs.add_junction(r"T:\mirror\j", r"\??\C:\old", r"C:\old").unwrap();

    let report = mirror(&fs);

    assert_eq!(fs.reparse_of(r"T:\mirror\j").unwrap().substitute_name, r"\??\C:\new");
    assert_eq!(changes(&report).len(), 1);
    assert!(changes(&report)[0].contains("modified junction"));
}

/// A symlink differing only in its relative flag still counts as changed.
#[test]
fn symlink_relative_flag_participates_in_comparison() {
    let fs = new_pair();
    fs.add_file_symlink(r"C:\src\s", "t.txt", "t.txt", true).unwrap();
    fs.add_file_symlink(r"T:\mirror\s", "t.txt", "t.txt", false).unwrap();

    let report = mirror(&fs);

    assert!(fs.reparse_of(r"T:\mirror\s").unwrap().is_relative());
    assert_eq!(changes(&report).len(), 1);
}

/// Matching links produce no changes at all.
#[test]
fn identical_links_are_left_alone() {
    let fs = new_pair();
    fs.add_junction(r"C:\src\j", r"\??\C:\t", r"C:\t").unwrap();
    fs.add_junction(r"T:\mirror\j", r"\??\C:\t", r"C:\t").unwrap();
    fs.add_dir_symlink(r"C:\src\d", r"\??\C:\u", r"C:\u", false).unwrap();
    fs.add_dir_symlink(r"T:\mirror\d", r"\??\C:\u", r"C:\u", false).unwrap();

    let report = mirror(&fs);

    assert_eq!(changes(&report), Vec::<String>::new());
}
