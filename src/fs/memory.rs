//! In-memory filesystem
//!
//! A tree-backed [`Filesystem`] implementation honoring every contract of
//! the trait: case-insensitive component lookup, reparse points that are
//! never followed, deletes that refuse non-empty directories, overwrite
//! renames that refuse directories, and chunked copy progress. It backs the
//! test suite, where it adds two capabilities a real volume can't offer:
//! per-(operation, path) fault injection and a log of every directory the
//! engine listed.

use std::cell::RefCell;
use std::collections::BTreeMap;

use filetime::FileTime;

use crate::error::{MirrorError, Result};
use crate::fs::{
    AttributeFlags, CopyProgress, DirEntry, FileAttributes, Filesystem, ReparseData,
    COPY_CHUNK_SIZE, REPARSE_TAG_MOUNT_POINT, REPARSE_TAG_SYMLINK,
};
use crate::path_util;

/// Operations that can be made to fail for a specific path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOp {
    List,
    ReadContent,
    Rename,
    Delete,
    SetAttributes,
    ReadSecurity,
    WriteSecurity,
}

#[derive(Debug, Clone)]
struct Fault {
    op: FaultOp,
    path: String,
}

#[derive(Debug, Clone)]
struct Node {
    name: String,
    attrs: FileAttributes,
    content: Vec<u8>,
    reparse: Option<ReparseData>,
    security: Vec<u8>,
    children: BTreeMap<String, Node>,
}

impl Node {
    fn new(name: &str, flags: AttributeFlags) -> Self {
        Self {
            name: name.to_string(),
            attrs: FileAttributes::with_flags(flags),
            content: Vec::new(),
            reparse: None,
            security: Vec::new(),
            children: BTreeMap::new(),
        }
    }

    fn is_dir(&self) -> bool {
        self.attrs.is_directory()
    }
}

fn fold(s: &str) -> String {
    s.to_lowercase()
}

fn components(path: &str) -> Vec<String> {
    let stripped = path
        .strip_prefix(path_util::VERBATIM_PREFIX)
        .unwrap_or(path);
    stripped
        .split(path_util::is_sep)
        .filter(|c| !c.is_empty())
        .map(fold)
        .collect()
}

fn get<'a>(node: &'a Node, comps: &[String]) -> Option<&'a Node> {
    match comps.split_first() {
        None => Some(node),
        Some((head, rest)) => get(node.children.get(head)?, rest),
    }
}

fn get_mut<'a>(node: &'a mut Node, comps: &[String]) -> Option<&'a mut Node> {
    match comps.split_first() {
        None => Some(node),
        Some((head, rest)) => get_mut(node.children.get_mut(head)?, rest),
    }
}

/// In-memory [`Filesystem`] with fault injection and an access log.
pub struct MemoryFilesystem {
    root: RefCell<Node>,
    faults: RefCell<Vec<Fault>>,
    list_log: RefCell<Vec<String>>,
}

impl MemoryFilesystem {
    /// An empty filesystem (no drives yet).
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: RefCell::new(Node::new("", AttributeFlags::DIRECTORY)),
            faults: RefCell::new(Vec::new()),
            list_log: RefCell::new(Vec::new()),
        }
    }

    fn check_fault(&self, op: FaultOp, path: &str) -> Result<()> {
        let folded: String = components(path).join("\\");
        let hit = self
            .faults
            .borrow()
            .iter()
            .any(|f| f.op == op && f.path == folded);
        if hit {
            Err(MirrorError::AccessDenied { path: path.to_string() })
        } else {
            Ok(())
        }
    }

    /// Make `op` fail with access-denied for `path` until
    /// [`MemoryFilesystem::clear_faults`] is called.
    pub fn inject_fault(&self, op: FaultOp, path: &str) {
        self.faults.borrow_mut().push(Fault {
            op,
            path: components(path).join("\\"),
        });
    }

    /// Remove all injected faults.
    pub fn clear_faults(&self) {
        self.faults.borrow_mut().clear();
    }

    /// Every path passed to [`Filesystem::list_dir`], in call order.
    #[must_use]
    pub fn listed_paths(&self) -> Vec<String> {
        self.list_log.borrow().clone()
    }

    // ------------------------------------------------------------------
    // Tree builders (used by tests to stage scenarios)
    // ------------------------------------------------------------------

    fn insert_node(&self, path: &str, node: Node) -> Result<()> {
        let comps = components(path);
        let Some((leaf_comp, parents)) = comps.split_last() else {
            return Err(MirrorError::io(path, "cannot create the root"));
        };
        let mut root = self.root.borrow_mut();
        // Builders auto-create missing intermediate directories.
        let mut cur = &mut *root;
        for (idx, comp) in parents.iter().enumerate() {
            if !cur.children.contains_key(comp) {
                let display: Vec<&str> = path
                    .strip_prefix(path_util::VERBATIM_PREFIX)
                    .unwrap_or(path)
                    .split(path_util::is_sep)
                    .filter(|c| !c.is_empty())
                    .collect();
                cur.children
                    .insert(comp.clone(), Node::new(display[idx], AttributeFlags::DIRECTORY));
            }
            cur = cur.children.get_mut(comp).ok_or_else(|| {
                MirrorError::Unreachable(format!("lost freshly inserted component in {path}"))
            })?;
        }
        if cur.children.contains_key(leaf_comp) {
            return Err(MirrorError::io(path, "already exists"));
        }
        cur.children.insert(leaf_comp.clone(), node);
        Ok(())
    }

    /// Create a directory, including missing parents.
    ///
    /// # Errors
    ///
    /// Fails if the path already exists.
    pub fn add_dir(&self, path: &str) -> Result<()> {
        self.insert_node(
            path,
            Node::new(path_util::leaf(path), AttributeFlags::DIRECTORY),
        )
    }

    /// Create a file with `content`, including missing parents.
    ///
    /// # Errors
    ///
    /// Fails if the path already exists.
    pub fn add_file(&self, path: &str, content: &[u8]) -> Result<()> {
        let mut node = Node::new(path_util::leaf(path), AttributeFlags::ARCHIVE);
        node.content = content.to_vec();
        self.insert_node(path, node)
    }

    /// Create a file and stamp its write time (unix seconds).
    ///
    /// # Errors
    ///
    /// Fails if the path already exists.
    pub fn add_file_with_mtime(&self, path: &str, content: &[u8], mtime: i64) -> Result<()> {
        self.add_file(path, content)?;
        self.set_write_time(path, FileTime::from_unix_time(mtime, 0))
    }

    /// Create a junction to `substitute_name`.
    ///
    /// # Errors
    ///
    /// Fails if the path already exists.
    pub fn add_junction(&self, path: &str, substitute_name: &str, print_name: &str) -> Result<()> {
        let mut node = Node::new(
            path_util::leaf(path),
            AttributeFlags::DIRECTORY | AttributeFlags::REPARSE_POINT,
        );
        node.reparse = Some(ReparseData::junction(substitute_name, print_name));
        self.insert_node(path, node)
    }

    /// Create a file symlink.
    ///
    /// # Errors
    ///
    /// Fails if the path already exists.
    pub fn add_file_symlink(
        &self,
        path: &str,
        substitute_name: &str,
        print_name: &str,
        relative: bool,
    ) -> Result<()> {
        let mut node = Node::new(path_util::leaf(path), AttributeFlags::REPARSE_POINT);
        node.reparse = Some(ReparseData::symlink(substitute_name, print_name, relative));
        self.insert_node(path, node)
    }

    /// Create a directory symlink.
    ///
    /// # Errors
    ///
    /// Fails if the path already exists.
    pub fn add_dir_symlink(
        &self,
        path: &str,
        substitute_name: &str,
        print_name: &str,
        relative: bool,
    ) -> Result<()> {
        let mut node = Node::new(
            path_util::leaf(path),
            AttributeFlags::DIRECTORY | AttributeFlags::REPARSE_POINT,
        );
        node.reparse = Some(ReparseData::symlink(substitute_name, print_name, relative));
        self.insert_node(path, node)
    }

    /// Create a reparse point with an arbitrary tag (for foreign-tag
    /// scenarios).
    ///
    /// # Errors
    ///
    /// Fails if the path already exists.
    pub fn add_raw_reparse(&self, path: &str, tag: u32, is_dir: bool) -> Result<()> {
        let mut flags = AttributeFlags::REPARSE_POINT;
        if is_dir {
            flags |= AttributeFlags::DIRECTORY;
        }
        let mut node = Node::new(path_util::leaf(path), flags);
        node.reparse = Some(ReparseData {
            tag,
            substitute_name: String::new(),
            print_name: String::new(),
            symlink_flags: 0,
        });
        self.insert_node(path, node)
    }

    fn with_node_mut<T>(&self, path: &str, f: impl FnOnce(&mut Node) -> T) -> Result<T> {
        let comps = components(path);
        let mut root = self.root.borrow_mut();
        let node = get_mut(&mut root, &comps)
            .ok_or_else(|| MirrorError::NotFound { path: path.to_string() })?;
        Ok(f(node))
    }

    /// Stamp the write time of an existing entry.
    ///
    /// # Errors
    ///
    /// Fails if the entry does not exist.
    pub fn set_write_time(&self, path: &str, write: FileTime) -> Result<()> {
        self.with_node_mut(path, |n| n.attrs.write = write)
    }

    /// Replace all four timestamps of an existing entry.
    ///
    /// # Errors
    ///
    /// Fails if the entry does not exist.
    pub fn set_timestamps(&self, path: &str, stamp: FileTime) -> Result<()> {
        self.with_node_mut(path, |n| {
            n.attrs.creation = stamp;
            n.attrs.access = stamp;
            n.attrs.write = stamp;
            n.attrs.change = stamp;
        })
    }

    /// Merge extra attribute bits (e.g. HIDDEN, READ_ONLY) into an entry.
    ///
    /// # Errors
    ///
    /// Fails if the entry does not exist.
    pub fn add_attr_flags(&self, path: &str, flags: AttributeFlags) -> Result<()> {
        self.with_node_mut(path, |n| n.attrs.flags |= flags)
    }

    /// Set the stored security descriptor bytes of an entry.
    ///
    /// # Errors
    ///
    /// Fails if the entry does not exist.
    pub fn set_security_bytes(&self, path: &str, bytes: &[u8]) -> Result<()> {
        self.with_node_mut(path, |n| n.security = bytes.to_vec())
    }

    // ------------------------------------------------------------------
    // Inspection (used by tests to verify outcomes)
    // ------------------------------------------------------------------

    fn with_node<T>(&self, path: &str, f: impl FnOnce(&Node) -> T) -> Option<T> {
        let comps = components(path);
        let root = self.root.borrow();
        get(&root, &comps).map(f)
    }

    /// Does the entry exist?
    #[must_use]
    pub fn exists(&self, path: &str) -> bool {
        self.with_node(path, |_| ()).is_some()
    }

    /// Content bytes of a file, if it exists.
    #[must_use]
    pub fn file_content(&self, path: &str) -> Option<Vec<u8>> {
        self.with_node(path, |n| n.content.clone())
    }

    /// Reparse data of an entry, if it exists and has any.
    #[must_use]
    pub fn reparse_of(&self, path: &str) -> Option<ReparseData> {
        self.with_node(path, |n| n.reparse.clone()).flatten()
    }

    /// Attributes of an entry, if it exists.
    #[must_use]
    pub fn attrs_of(&self, path: &str) -> Option<FileAttributes> {
        self.with_node(path, |n| n.attrs)
    }

    /// Security descriptor bytes of an entry, if it exists.
    #[must_use]
    pub fn security_of(&self, path: &str) -> Option<Vec<u8>> {
        self.with_node(path, |n| n.security.clone())
    }

    /// Display names of a directory's children, sorted case-insensitively.
    #[must_use]
    pub fn child_names(&self, path: &str) -> Vec<String> {
        self.with_node(path, |n| {
            n.children.values().map(|c| c.name.clone()).collect()
        })
        .unwrap_or_default()
    }
}

impl Default for MemoryFilesystem {
    fn default() -> Self {
        Self::new()
    }
}

impl Filesystem for MemoryFilesystem {
    fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        self.check_fault(FaultOp::List, path)?;
        self.list_log.borrow_mut().push(path.to_string());
        let comps = components(path);
        let root = self.root.borrow();
        let node = get(&root, &comps)
            .ok_or_else(|| MirrorError::NotFound { path: path.to_string() })?;
        if !node.is_dir() {
            return Err(MirrorError::io(path, "not a directory"));
        }
        Ok(node
            .children
            .values()
            .map(|c| DirEntry {
                name: c.name.clone(),
                attrs: c.attrs,
                length: if c.is_dir() { 0 } else { c.content.len() as u64 },
            })
            .collect())
    }

    fn get_attributes(&self, path: &str) -> Result<FileAttributes> {
        self.with_node(path, |n| n.attrs)
            .ok_or_else(|| MirrorError::NotFound { path: path.to_string() })
    }

    fn set_attributes(&self, path: &str, attrs: &FileAttributes) -> Result<()> {
        self.check_fault(FaultOp::SetAttributes, path)?;
        let structural = AttributeFlags::DIRECTORY | AttributeFlags::REPARSE_POINT;
        self.with_node_mut(path, |n| {
            let kept = n.attrs.flags & structural;
            n.attrs = *attrs;
            n.attrs.flags = (attrs.flags - structural) | kept;
        })
    }

    fn file_length(&self, path: &str) -> Result<u64> {
        self.with_node(path, |n| if n.is_dir() { 0 } else { n.content.len() as u64 })
            .ok_or_else(|| MirrorError::NotFound { path: path.to_string() })
    }

    fn delete(&self, path: &str) -> Result<()> {
        self.check_fault(FaultOp::Delete, path)?;
        let comps = components(path);
        let Some((leaf_comp, parents)) = comps.split_last() else {
            return Err(MirrorError::io(path, "cannot delete the root"));
        };
        let mut root = self.root.borrow_mut();
        let parent = get_mut(&mut root, parents)
            .ok_or_else(|| MirrorError::NotFound { path: path.to_string() })?;
        let node = parent
            .children
            .get(leaf_comp)
            .ok_or_else(|| MirrorError::NotFound { path: path.to_string() })?;
        // A reparse directory deletes as the single link entry it is.
        if node.is_dir() && node.reparse.is_none() && !node.children.is_empty() {
            return Err(MirrorError::io(path, "directory not empty"));
        }
        parent.children.remove(leaf_comp);
        Ok(())
    }

    fn rename(&self, old_path: &str, new_path: &str, overwrite: bool) -> Result<()> {
        self.check_fault(FaultOp::Rename, new_path)?;
        let old_comps = components(old_path);
        let new_comps = components(new_path);
        let Some((old_leaf, old_parents)) = old_comps.split_last() else {
            return Err(MirrorError::io(old_path, "cannot rename the root"));
        };
        let Some((new_leaf, new_parents)) = new_comps.split_last() else {
            return Err(MirrorError::io(new_path, "cannot rename onto the root"));
        };
        let mut root = self.root.borrow_mut();

        if let Some(existing) = get(&root, &new_comps) {
            if !overwrite {
                return Err(MirrorError::io(new_path, "already exists"));
            }
            if existing.is_dir() {
                return Err(MirrorError::io(new_path, "cannot overwrite a directory"));
            }
        }
        if get(&root, new_parents).is_none() {
            return Err(MirrorError::NotFound { path: new_path.to_string() });
        }

        let moved = {
            let old_parent = get_mut(&mut root, old_parents)
                .ok_or_else(|| MirrorError::NotFound { path: old_path.to_string() })?;
            old_parent
                .children
                .remove(old_leaf)
                .ok_or_else(|| MirrorError::NotFound { path: old_path.to_string() })?
        };
        let new_parent = get_mut(&mut root, new_parents)
            .ok_or_else(|| MirrorError::NotFound { path: new_path.to_string() })?;
        let mut moved = moved;
        moved.name = path_util::leaf(new_path).to_string();
        new_parent.children.insert(new_leaf.clone(), moved);
        Ok(())
    }

    fn copy_file_content(
        &self,
        src: &str,
        dst: &str,
        progress: &mut dyn FnMut(CopyProgress),
    ) -> Result<()> {
        self.check_fault(FaultOp::ReadContent, src)?;
        let content = {
            let comps = components(src);
            let root = self.root.borrow();
            let node = get(&root, &comps)
                .ok_or_else(|| MirrorError::NotFound { path: src.to_string() })?;
            if node.is_dir() {
                return Err(MirrorError::io(src, "not a file"));
            }
            node.content.clone()
        };
        if self.exists(dst) {
            return Err(MirrorError::io(dst, "already exists"));
        }

        let total = content.len() as u64;
        progress(CopyProgress { total, copied: 0 });
        let mut copied = 0u64;
        for chunk in content.chunks(COPY_CHUNK_SIZE) {
            copied += chunk.len() as u64;
            progress(CopyProgress { total, copied });
        }
        if total == 0 {
            progress(CopyProgress { total, copied: 0 });
        }

        let mut node = Node::new(path_util::leaf(dst), AttributeFlags::ARCHIVE);
        node.content = content;
        self.insert_node(dst, node)
    }

    fn create_empty_file(&self, path: &str) -> Result<()> {
        if self.exists(path) {
            return Err(MirrorError::io(path, "already exists"));
        }
        self.insert_node(path, Node::new(path_util::leaf(path), AttributeFlags::ARCHIVE))
    }

    fn create_directory(&self, path: &str) -> Result<()> {
        if self.exists(path) {
            return Err(MirrorError::io(path, "already exists"));
        }
        self.insert_node(
            path,
            Node::new(path_util::leaf(path), AttributeFlags::DIRECTORY),
        )
    }

    fn read_to_string(&self, path: &str) -> Result<String> {
        self.check_fault(FaultOp::ReadContent, path)?;
        self.with_node(path, |n| String::from_utf8_lossy(&n.content).into_owned())
            .ok_or_else(|| MirrorError::NotFound { path: path.to_string() })
    }

    fn get_reparse_data(&self, path: &str) -> Result<Option<ReparseData>> {
        self.with_node(path, |n| n.reparse.clone())
            .ok_or_else(|| MirrorError::NotFound { path: path.to_string() })
    }

    fn set_junction_data(
        &self,
        path: &str,
        substitute_name: &str,
        print_name: &str,
    ) -> Result<()> {
        let comps = components(path);
        let mut root = self.root.borrow_mut();
        let node = get_mut(&mut root, &comps)
            .ok_or_else(|| MirrorError::NotFound { path: path.to_string() })?;
        if !node.is_dir() {
            return Err(MirrorError::io(path, "not a directory"));
        }
        match &node.reparse {
            Some(r) if r.tag == REPARSE_TAG_SYMLINK => {
                return Err(MirrorError::io(path, "existing symlink in the way"));
            }
            None if !node.children.is_empty() => {
                return Err(MirrorError::io(path, "directory not empty"));
            }
            _ => {}
        }
        node.reparse = Some(ReparseData::junction(substitute_name, print_name));
        node.attrs.flags |= AttributeFlags::REPARSE_POINT;
        Ok(())
    }

    fn set_symlink_data(
        &self,
        path: &str,
        substitute_name: &str,
        print_name: &str,
        relative: bool,
    ) -> Result<()> {
        let comps = components(path);
        let mut root = self.root.borrow_mut();
        let node = get_mut(&mut root, &comps)
            .ok_or_else(|| MirrorError::NotFound { path: path.to_string() })?;
        match &node.reparse {
            Some(r) if r.tag == REPARSE_TAG_MOUNT_POINT => {
                return Err(MirrorError::io(path, "existing junction in the way"));
            }
            None if node.is_dir() && !node.children.is_empty() => {
                return Err(MirrorError::io(path, "directory not empty"));
            }
            None if !node.is_dir() && !node.content.is_empty() => {
                return Err(MirrorError::io(path, "file not empty"));
            }
            _ => {}
        }
        node.reparse = Some(ReparseData::symlink(substitute_name, print_name, relative));
        node.attrs.flags |= AttributeFlags::REPARSE_POINT;
        Ok(())
    }

    fn delete_junction_data(&self, path: &str) -> Result<()> {
        self.with_node_mut(path, |n| match &n.reparse {
            Some(r) if r.tag == REPARSE_TAG_MOUNT_POINT => {
                n.reparse = None;
                n.attrs.flags -= AttributeFlags::REPARSE_POINT;
                Ok(())
            }
            _ => Err(MirrorError::io(path, "not a junction")),
        })?
    }

    fn delete_symlink_data(&self, path: &str) -> Result<()> {
        self.with_node_mut(path, |n| match &n.reparse {
            Some(r) if r.tag == REPARSE_TAG_SYMLINK => {
                n.reparse = None;
                n.attrs.flags -= AttributeFlags::REPARSE_POINT;
                Ok(())
            }
            _ => Err(MirrorError::io(path, "not a symlink")),
        })?
    }

    fn get_security_descriptor(&self, path: &str, _is_dir: bool) -> Result<Vec<u8>> {
        self.check_fault(FaultOp::ReadSecurity, path)?;
        self.with_node(path, |n| n.security.clone())
            .ok_or_else(|| MirrorError::NotFound { path: path.to_string() })
    }

    fn set_security_descriptor(&self, path: &str, _is_dir: bool, descriptor: &[u8]) -> Result<()> {
        self.check_fault(FaultOp::WriteSecurity, path)?;
        self.with_node_mut(path, |n| n.security = descriptor.to_vec())
    }
}
