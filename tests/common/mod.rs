//! Shared helpers for the integration suites: staged in-memory trees, a
//! capturing reporter, and a whole-tree mirror-equivalence check.

#![allow(dead_code)]

use hobomirror::engine::{SyncEngine, SyncOptions};
use hobomirror::fs::memory::MemoryFilesystem;
use hobomirror::fs::Filesystem;
use hobomirror::path_util::{self, SnapshotRewriter};
use hobomirror::report::{Channel, Reporter};

/// Source root used by the engine-level suites.
pub const SRC: &str = r"C:\src";
/// Target root used by the engine-level suites.
pub const TGT: &str = r"T:\mirror";

/// A filesystem with empty source and target roots staged.
pub fn new_pair() -> MemoryFilesystem {
    let fs = MemoryFilesystem::new();
    fs.add_dir(SRC).unwrap();
    fs.add_dir(TGT).unwrap();
    fs
}

/// Run one mirror pass of `SRC` onto `TGT` with the given options,
/// returning the capturing reporter.
pub fn mirror_with(fs: &MemoryFilesystem, opts: &SyncOptions) -> Reporter {
    let report = Reporter::with_capture();
    let rewriter = SnapshotRewriter::identity();
    let engine = SyncEngine::new(fs, &report, opts, &rewriter);
    engine.sync_tree(SRC, TGT);
    report
}

/// Run one mirror pass with both propagation toggles on.
pub fn mirror(fs: &MemoryFilesystem) -> Reporter {
    mirror_with(fs, &SyncOptions::everything())
}

/// Captured Change lines of a run.
pub fn changes(report: &Reporter) -> Vec<String> {
    report.lines(Channel::Change)
}

/// Captured Error lines of a run.
pub fn errors(report: &Reporter) -> Vec<String> {
    report.lines(Channel::Error)
}

/// Assert that `tgt_dir` mirrors `src_dir`: same entries (guard file
/// aside), same kinds, contents, reparse fields, attributes, and security
/// descriptors. Root-level attributes are exempt — the engine never copies
/// attributes onto the top-level pair.
pub fn assert_mirrored(fs: &MemoryFilesystem, src_dir: &str, tgt_dir: &str) {
    assert_dir_mirrored(fs, src_dir, tgt_dir, false);
}

fn assert_dir_mirrored(fs: &MemoryFilesystem, src_dir: &str, tgt_dir: &str, check_attrs: bool) {
    if check_attrs {
        assert_eq!(
            fs.attrs_of(src_dir),
            fs.attrs_of(tgt_dir),
            "directory attributes differ: {src_dir} vs {tgt_dir}"
        );
    }
    assert_eq!(
        fs.security_of(src_dir),
        fs.security_of(tgt_dir),
        "security descriptors differ: {src_dir} vs {tgt_dir}"
    );

    let src_names = fs.child_names(src_dir);
    let tgt_names: Vec<String> = fs
        .child_names(tgt_dir)
        .into_iter()
        .filter(|n| !n.eq_ignore_ascii_case(hobomirror::GUARD_FILE_NAME))
        .collect();
    assert_eq!(src_names, tgt_names, "entry sets differ: {src_dir} vs {tgt_dir}");

    for name in src_names {
        let s = path_util::join(src_dir, &name);
        let t = path_util::join(tgt_dir, &name);
        let s_attrs = fs.attrs_of(&s).unwrap();
        let t_attrs = fs.attrs_of(&t).unwrap();
        assert_eq!(s_attrs, t_attrs, "attributes differ: {s} vs {t}");
        assert_eq!(fs.reparse_of(&s), fs.reparse_of(&t), "reparse differs: {s} vs {t}");
        assert_eq!(
            fs.security_of(&s),
            fs.security_of(&t),
            "security differs: {s} vs {t}"
        );
        if s_attrs.is_directory() && !s_attrs.is_reparse_point() {
            assert_dir_mirrored(fs, &s, &t, false);
        } else if !s_attrs.is_directory() {
            assert_eq!(fs.file_content(&s), fs.file_content(&t), "content differs: {s} vs {t}");
        }
    }
}

/// Number of entries under a directory, recursively (reparse points count
/// as single entries).
pub fn entry_count(fs: &MemoryFilesystem, dir: &str) -> usize {
    let mut count = 0;
    for name in fs.child_names(dir) {
        count += 1;
        let child = path_util::join(dir, &name);
        let attrs = fs.attrs_of(&child).unwrap();
        if attrs.is_directory() && !attrs.is_reparse_point() {
            count += entry_count(fs, &child);
        }
    }
    count
}

/// The `~HoboMirror-*.tmp` orphans directly under `dir`.
pub fn temp_files(fs: &MemoryFilesystem, dir: &str) -> Vec<String> {
    fs.child_names(dir)
        .into_iter()
        .filter(|n| n.starts_with("~HoboMirror-") && n.ends_with(".tmp"))
        .collect()
}

/// Sanity helper: the trait-level listing of a directory must succeed.
pub fn list_names(fs: &MemoryFilesystem, dir: &str) -> Vec<String> {
    fs.list_dir(dir)
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect()
}
