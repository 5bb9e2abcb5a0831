//! Filesystem primitives
//!
//! The [`Filesystem`] trait is the seam between the engine and the OS. All
//! implementations provide "backup semantics": directory handles may be
//! opened, ACL checks are bypassed given the process privileges, and reparse
//! points are always operated on as the reparse point itself — never the
//! target. Handles are scoped to a single call; nothing here keeps one open
//! across operations.
//!
//! Two implementations exist: [`memory::MemoryFilesystem`] backs the test
//! suite (with fault injection), and `windows::WindowsFilesystem` is the
//! production backend.

pub mod memory;
#[cfg(windows)]
pub mod windows;

use bitflags::bitflags;
use filetime::FileTime;

use crate::error::Result;

/// Chunk size for content copies; the progress callback fires per chunk.
pub const COPY_CHUNK_SIZE: usize = 128 * 1024;

/// Reparse tag for junctions (mount points).
pub const REPARSE_TAG_MOUNT_POINT: u32 = 0xA000_0003;

/// Reparse tag for symbolic links.
pub const REPARSE_TAG_SYMLINK: u32 = 0xA000_000C;

/// Symlink flag bit: the substitute name is relative to the link's parent.
pub const SYMLINK_FLAG_RELATIVE: u32 = 0x0000_0001;

bitflags! {
    /// Win32 `FILE_ATTRIBUTE_*` bits, round-trippable through
    /// [`Filesystem::get_attributes`] / [`Filesystem::set_attributes`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct AttributeFlags: u32 {
        const READ_ONLY           = 0x0000_0001;
        const HIDDEN              = 0x0000_0002;
        const SYSTEM              = 0x0000_0004;
        const DIRECTORY           = 0x0000_0010;
        const ARCHIVE             = 0x0000_0020;
        const NORMAL              = 0x0000_0080;
        const TEMPORARY           = 0x0000_0100;
        const SPARSE_FILE         = 0x0000_0200;
        const REPARSE_POINT       = 0x0000_0400;
        const COMPRESSED          = 0x0000_0800;
        const OFFLINE             = 0x0000_1000;
        const NOT_CONTENT_INDEXED = 0x0000_2000;
        const ENCRYPTED           = 0x0000_4000;
    }
}

/// The four timestamps plus attribute bits of one entry. Opaque to the
/// engine beyond the `DIRECTORY`/`REPARSE_POINT` bits and write-time
/// equality; round-trips through set_attributes unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAttributes {
    pub creation: FileTime,
    pub access: FileTime,
    pub write: FileTime,
    pub change: FileTime,
    pub flags: AttributeFlags,
}

impl FileAttributes {
    /// Attributes with all timestamps at the epoch and the given bits.
    #[must_use]
    pub fn with_flags(flags: AttributeFlags) -> Self {
        let zero = FileTime::zero();
        Self {
            creation: zero,
            access: zero,
            write: zero,
            change: zero,
            flags,
        }
    }

    /// True iff the directory bit is set.
    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.flags.contains(AttributeFlags::DIRECTORY)
    }

    /// True iff the reparse-point bit is set.
    #[must_use]
    pub fn is_reparse_point(&self) -> bool {
        self.flags.contains(AttributeFlags::REPARSE_POINT)
    }
}

/// One row of a directory listing: leaf name (case preserved), attributes,
/// and file length, produced in a single enumeration pass so the engine
/// never opens a per-entry handle just to compare.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub attrs: FileAttributes,
    pub length: u64,
}

/// Decoded reparse data of a junction or symlink.
///
/// `substitute_name` is the raw NT-namespace form (`\??\…`), `print_name`
/// the user-visible form. The two textual families are kept distinct;
/// [`raw_to_nice`] / [`nice_to_raw`] are pure substitutions and nothing ever
/// normalizes one into the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReparseData {
    pub tag: u32,
    pub substitute_name: String,
    pub print_name: String,
    pub symlink_flags: u32,
}

impl ReparseData {
    /// Junction data (`tag = MOUNT_POINT`, no symlink flags).
    #[must_use]
    pub fn junction(substitute_name: impl Into<String>, print_name: impl Into<String>) -> Self {
        Self {
            tag: REPARSE_TAG_MOUNT_POINT,
            substitute_name: substitute_name.into(),
            print_name: print_name.into(),
            symlink_flags: 0,
        }
    }

    /// Symlink data (`tag = SYMLINK`).
    #[must_use]
    pub fn symlink(
        substitute_name: impl Into<String>,
        print_name: impl Into<String>,
        relative: bool,
    ) -> Self {
        Self {
            tag: REPARSE_TAG_SYMLINK,
            substitute_name: substitute_name.into(),
            print_name: print_name.into(),
            symlink_flags: if relative { SYMLINK_FLAG_RELATIVE } else { 0 },
        }
    }

    /// For symlinks: is the target relative to the link's parent?
    #[must_use]
    pub fn is_relative(&self) -> bool {
        self.symlink_flags & SYMLINK_FLAG_RELATIVE != 0
    }
}

/// Translate a raw NT-namespace name (`\??\…`) to the user-facing form
/// (`\\?\…`). Names without the raw prefix pass through.
#[must_use]
pub fn raw_to_nice(name: &str) -> String {
    name.strip_prefix(r"\??\")
        .map_or_else(|| name.to_string(), |rest| format!(r"\\?\{rest}"))
}

/// Translate a user-facing name (`\\?\…`) to the raw NT-namespace form
/// (`\??\…`). Names without the nice prefix pass through.
#[must_use]
pub fn nice_to_raw(name: &str) -> String {
    name.strip_prefix(r"\\?\")
        .map_or_else(|| name.to_string(), |rest| format!(r"\??\{rest}"))
}

/// Progress of one content copy. Emitted at start (`copied == 0`), after
/// each [`COPY_CHUNK_SIZE`] chunk, and at completion (`copied == total`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyProgress {
    pub total: u64,
    pub copied: u64,
}

/// Filesystem primitives with backup semantics.
///
/// Contracts shared by every method: reparse points are never followed (an
/// operation on a link path touches the link itself), failures carry the
/// [`crate::error::MirrorError`] taxonomy, and no method retains state
/// between calls.
pub trait Filesystem {
    /// List the children of a directory in one pass: name, attributes and
    /// length per entry. Never recurses, never follows reparse points,
    /// skips `.`/`..`. Fails as a whole on an unreadable directory —
    /// a partial listing is never returned.
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be enumerated.
    fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>>;

    /// Read timestamps and attribute bits.
    ///
    /// # Errors
    ///
    /// Fails if the entry cannot be opened for attribute access.
    fn get_attributes(&self, path: &str) -> Result<FileAttributes>;

    /// Write timestamps and attribute bits. The `DIRECTORY` and
    /// `REPARSE_POINT` bits of the existing entry are authoritative and
    /// are not modified by this call.
    ///
    /// # Errors
    ///
    /// Fails if the entry cannot be opened for attribute write.
    fn set_attributes(&self, path: &str, attrs: &FileAttributes) -> Result<()>;

    /// File size in bytes.
    ///
    /// # Errors
    ///
    /// Fails if the entry cannot be opened.
    fn file_length(&self, path: &str) -> Result<u64>;

    /// Delete a file or an EMPTY directory (recursion is the engine's job).
    /// Deletes a reparse point itself, never its target; deletes read-only
    /// entries.
    ///
    /// # Errors
    ///
    /// Fails if the entry does not exist or the directory is non-empty.
    fn delete(&self, path: &str) -> Result<()>;

    /// Rename, atomic within a volume. With `overwrite`, the existing
    /// target must be a file (overwriting a directory fails); a read-only
    /// bit on the target is ignored.
    ///
    /// # Errors
    ///
    /// Fails if the source is missing, the target exists without
    /// `overwrite`, or the target is a directory.
    fn rename(&self, old_path: &str, new_path: &str, overwrite: bool) -> Result<()>;

    /// Copy file bytes from `src` to a newly created `dst` (which must not
    /// exist), yielding [`CopyProgress`] at start, per chunk, and at end.
    /// Copies content only — the caller propagates attributes and security
    /// afterwards.
    ///
    /// # Errors
    ///
    /// Fails if the source cannot be read or the destination cannot be
    /// created/written.
    fn copy_file_content(
        &self,
        src: &str,
        dst: &str,
        progress: &mut dyn FnMut(CopyProgress),
    ) -> Result<()>;

    /// Create a zero-length file. Fails if the path exists.
    ///
    /// # Errors
    ///
    /// Fails if the path exists or the parent is missing.
    fn create_empty_file(&self, path: &str) -> Result<()>;

    /// Create an empty directory. Fails if the path exists.
    ///
    /// # Errors
    ///
    /// Fails if the path exists or the parent is missing.
    fn create_directory(&self, path: &str) -> Result<()>;

    /// Read a file as text (lossy). Used for the guard-file check.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be opened or read.
    fn read_to_string(&self, path: &str) -> Result<String>;

    /// Decode the reparse data of an entry, or `None` iff the entry exists
    /// and is not a reparse point.
    ///
    /// # Errors
    ///
    /// Fails if the entry cannot be opened.
    fn get_reparse_data(&self, path: &str) -> Result<Option<ReparseData>>;

    /// Set MOUNT_POINT data on an existing directory. The directory must be
    /// empty when it is not already a junction; an existing junction may be
    /// overwritten; an existing symlink is an error.
    ///
    /// # Errors
    ///
    /// Fails per the contract above or if the entry cannot be opened.
    fn set_junction_data(&self, path: &str, substitute_name: &str, print_name: &str)
        -> Result<()>;

    /// Set SYMLINK data on an existing zero-length file or empty directory.
    /// An existing symlink may be overwritten; an existing junction is an
    /// error.
    ///
    /// # Errors
    ///
    /// Fails per the contract above or if the entry cannot be opened.
    fn set_symlink_data(
        &self,
        path: &str,
        substitute_name: &str,
        print_name: &str,
        relative: bool,
    ) -> Result<()>;

    /// Remove only the MOUNT_POINT reparse metadata; the directory remains.
    ///
    /// # Errors
    ///
    /// Fails if the entry is not a junction.
    fn delete_junction_data(&self, path: &str) -> Result<()>;

    /// Remove only the SYMLINK reparse metadata; the file/directory remains.
    ///
    /// # Errors
    ///
    /// Fails if the entry is not a symlink.
    fn delete_symlink_data(&self, path: &str) -> Result<()>;

    /// Read the full binary security descriptor (owner + group + DACL +
    /// SACL + inheritability).
    ///
    /// # Errors
    ///
    /// Fails if the descriptor cannot be read.
    fn get_security_descriptor(&self, path: &str, is_dir: bool) -> Result<Vec<u8>>;

    /// Apply all sections of a binary security descriptor. Directory-side
    /// writes may expand inheritable ACEs into existing children, which is
    /// why the engine applies a directory's descriptor before syncing its
    /// children.
    ///
    /// # Errors
    ///
    /// Fails if the descriptor cannot be written.
    fn set_security_descriptor(&self, path: &str, is_dir: bool, descriptor: &[u8]) -> Result<()>;
}
