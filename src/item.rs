//! Entry classification
//!
//! An [`Item`] is one classified filesystem entry. The kind is a tagged
//! variant so impossible states (a plain file carrying reparse data, a
//! junction with a length) are unrepresentable.

use crate::error::{MirrorError, Result};
use crate::fs::{
    DirEntry, FileAttributes, Filesystem, ReparseData, REPARSE_TAG_MOUNT_POINT, REPARSE_TAG_SYMLINK,
};
use crate::path_util;

/// Target fields of a symbolic link, compared field-for-field during
/// reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymlinkTarget {
    pub substitute_name: String,
    pub print_name: String,
    pub relative: bool,
}

/// Target fields of a junction. Junctions have no relative form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JunctionTarget {
    pub substitute_name: String,
    pub print_name: String,
}

/// The five entry kinds with their per-kind payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKind {
    File { length: u64 },
    Dir,
    FileSymlink(SymlinkTarget),
    DirSymlink(SymlinkTarget),
    Junction(JunctionTarget),
}

impl ItemKind {
    /// Human-readable kind label used in Change/Action messages.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::File { .. } => "file",
            Self::Dir => "directory",
            Self::FileSymlink(_) => "file symlink",
            Self::DirSymlink(_) => "directory symlink",
            Self::Junction(_) => "junction",
        }
    }

    /// True for the plain-directory kind only. Junctions and directory
    /// symlinks are opaque leaf entries and are deliberately excluded: this
    /// predicate decides what the engine may traverse.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Dir)
    }

    /// Same kind, payload ignored.
    #[must_use]
    pub fn same_kind(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// One classified filesystem entry.
#[derive(Debug, Clone)]
pub struct Item {
    /// Absolute path as presented to the OS (snapshot-space on the source
    /// side).
    pub full_path: String,
    /// Leaf name as returned by the listing, case preserved.
    pub name: String,
    /// Timestamps + attribute bits.
    pub attrs: FileAttributes,
    pub kind: ItemKind,
}

impl Item {
    /// Relabel this item as a plain directory, keeping path and attributes.
    ///
    /// Snapshot-volume roots present as reparse points but must be walked;
    /// the orchestrator forces the root pair to `Dir` through this.
    #[must_use]
    pub fn into_forced_dir(mut self) -> Self {
        self.kind = ItemKind::Dir;
        self
    }
}

fn kind_from_reparse(path: &str, is_directory: bool, data: ReparseData) -> Result<ItemKind> {
    match data.tag {
        REPARSE_TAG_MOUNT_POINT => Ok(ItemKind::Junction(JunctionTarget {
            substitute_name: data.substitute_name,
            print_name: data.print_name,
        })),
        REPARSE_TAG_SYMLINK => {
            let target = SymlinkTarget {
                relative: data.is_relative(),
                substitute_name: data.substitute_name,
                print_name: data.print_name,
            };
            Ok(if is_directory {
                ItemKind::DirSymlink(target)
            } else {
                ItemKind::FileSymlink(target)
            })
        }
        tag => Err(MirrorError::UnrecognizedReparseTag {
            path: path.to_string(),
            tag,
        }),
    }
}

/// Classify one row of a directory listing into an [`Item`].
///
/// The listing already carries attributes and length, so only reparse
/// entries cost an extra read.
///
/// # Errors
///
/// Fails if reparse data cannot be read or carries an unrecognized tag.
pub fn classify_entry(fs: &dyn Filesystem, dir_path: &str, entry: &DirEntry) -> Result<Item> {
    let full_path = path_util::join(dir_path, &entry.name);
    let kind = if entry.attrs.is_reparse_point() {
        let data = fs.get_reparse_data(&full_path)?.ok_or_else(|| {
            MirrorError::Unreachable(format!(
                "reparse attribute set but no reparse data on {full_path}"
            ))
        })?;
        kind_from_reparse(&full_path, entry.attrs.is_directory(), data)?
    } else if entry.attrs.is_directory() {
        ItemKind::Dir
    } else {
        ItemKind::File { length: entry.length }
    };
    Ok(Item {
        full_path,
        name: entry.name.clone(),
        attrs: entry.attrs,
        kind,
    })
}

/// Classify an arbitrary path in one attribute pass.
///
/// # Errors
///
/// Fails if the entry cannot be inspected or carries an unrecognized
/// reparse tag.
pub fn classify_path(fs: &dyn Filesystem, path: &str) -> Result<Item> {
    let attrs = fs.get_attributes(path)?;
    let kind = if attrs.is_reparse_point() {
        let data = fs.get_reparse_data(path)?.ok_or_else(|| {
            MirrorError::Unreachable(format!("reparse attribute set but no reparse data on {path}"))
        })?;
        kind_from_reparse(path, attrs.is_directory(), data)?
    } else if attrs.is_directory() {
        ItemKind::Dir
    } else {
        ItemKind::File {
            length: fs.file_length(path)?,
        }
    };
    Ok(Item {
        full_path: path.to_string(),
        name: path_util::leaf(path).to_string(),
        attrs,
        kind,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::error::ErrorKind;
    use crate::fs::memory::MemoryFilesystem;

    #[test]
    fn classifies_all_five_kinds() {
        let fs = MemoryFilesystem::new();
        fs.add_dir(r"C:\d").unwrap();
        fs.add_file(r"C:\d\f.bin", b"abcd").unwrap();
        fs.add_junction(r"C:\d\j", r"\??\C:\t", r"C:\t").unwrap();
        fs.add_file_symlink(r"C:\d\fl", "f.bin", "f.bin", true).unwrap();
        fs.add_dir_symlink(r"C:\d\dl", r"\??\C:\t", r"C:\t", false).unwrap();

        let by_name = |n: &str| {
            let entries = fs.list_dir(r"C:\d").unwrap();
            let e = entries.iter().find(|e| e.name == n).unwrap().clone();
            classify_entry(&fs, r"C:\d", &e).unwrap()
        };

        assert_eq!(by_name("f.bin").kind, ItemKind::File { length: 4 });
        assert!(matches!(by_name("j").kind, ItemKind::Junction(_)));
        assert!(matches!(by_name("fl").kind, ItemKind::FileSymlink(ref t) if t.relative));
        assert!(matches!(by_name("dl").kind, ItemKind::DirSymlink(ref t) if !t.relative));

        let d = classify_path(&fs, r"C:\d").unwrap();
        assert_eq!(d.kind, ItemKind::Dir);
        assert_eq!(d.name, "d");
    }

    #[test]
    fn unknown_reparse_tag_is_an_error() {
        let fs = MemoryFilesystem::new();
        fs.add_dir(r"C:\d").unwrap();
        fs.add_raw_reparse(r"C:\d\weird", 0x8000_0017, false).unwrap();
        let err = classify_path(&fs, r"C:\d\weird").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnrecognizedReparseTag);
    }

    #[test]
    fn forced_dir_overrides_link_classification() {
        let fs = MemoryFilesystem::new();
        fs.add_junction(r"C:\snaproot", r"\??\Volume{x}", r"\\?\Volume{x}").unwrap();
        let item = classify_path(&fs, r"C:\snaproot").unwrap().into_forced_dir();
        assert_eq!(item.kind, ItemKind::Dir);
    }

    #[test]
    fn kind_comparison_ignores_payload() {
        let a = ItemKind::File { length: 1 };
        let b = ItemKind::File { length: 2 };
        assert!(a.same_kind(&b));
        assert!(!a.same_kind(&ItemKind::Dir));
        assert!(ItemKind::Dir.is_dir());
        let j = ItemKind::Junction(JunctionTarget {
            substitute_name: String::new(),
            print_name: String::new(),
        });
        assert!(!j.is_dir());
    }
}
