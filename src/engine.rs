//! The sync engine
//!
//! Given a source directory (usually in snapshot space) and a target
//! directory, [`SyncEngine::sync_tree`] walks both sides depth-first and
//! applies the minimal sequence of mutations making the target equal the
//! source. Reconciliation of one directory runs in four phases whose order
//! is load-bearing:
//!
//! 1. removals and kind-changes (delete at the target),
//! 2. same-name same-kind reconciliation (recurse / refresh content / fix
//!    link targets),
//! 3. additions (create at the target),
//! 4. attribute + security refresh of the surviving children,
//!
//! followed by the directory's own attribute copy. The directory's security
//! descriptor is applied *before* any child work: writing an inheritable
//! ACL can cascade into existing children, and children synced afterwards
//! must win with their own descriptors.
//!
//! Reparse points are never traversed, on either side: a junction or
//! directory symlink is one opaque entry, compared and replaced by its
//! target fields alone.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use filetime::FileTime;
use rand::Rng;

use crate::exec::Exec;
use crate::fs::Filesystem;
use crate::item::{classify_entry, classify_path, Item, ItemKind};
use crate::path_util::{self, SnapshotRewriter};
use crate::report::Reporter;
use crate::task::GUARD_FILE_NAME;

/// Minimum interval between copy-progress report lines.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Behavior switches for one run.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Absolute source paths (original-volume space) dropped from the
    /// source set; their target counterparts get deleted.
    pub ignore_paths: Vec<String>,
    /// Leaf directory names dropped from the source set wherever they
    /// appear.
    pub ignore_dir_names: Vec<String>,
    /// Propagate security descriptors this run.
    pub refresh_access_control: bool,
    /// Propagate timestamps and attribute bits.
    pub update_metadata: bool,
}

impl SyncOptions {
    /// Options with both propagation toggles on and empty ignore lists.
    #[must_use]
    pub fn everything() -> Self {
        Self {
            refresh_access_control: true,
            update_metadata: true,
            ..Self::default()
        }
    }
}

/// One mirroring run over one `(source, target)` pair.
pub struct SyncEngine<'a> {
    exec: Exec<'a>,
    opts: &'a SyncOptions,
    rewriter: &'a SnapshotRewriter,
}

fn fold_name(name: &str) -> String {
    name.to_lowercase()
}

fn names_equal(a: &str, b: &str) -> bool {
    fold_name(a) == fold_name(b)
}

fn fmt_time(t: FileTime) -> String {
    format!("{}.{:09}", t.unix_seconds(), t.nanoseconds())
}

/// Non-directories sort before directories, then case-insensitive by name.
/// Deletes thereby clear leaves before pruning containers, and failures in
/// leaf handling don't cascade into subtree descents.
fn sort_items(items: &mut [Item]) {
    items.sort_by_cached_key(|i| (i.kind.is_dir(), fold_name(&i.name)));
}

fn temp_copy_name() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..16)
        .map(|_| char::from(rng.sample(rand::distr::Alphanumeric)))
        .collect();
    format!("~HoboMirror-{suffix}.tmp")
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl<'a> SyncEngine<'a> {
    #[must_use]
    pub fn new(
        fs: &'a dyn Filesystem,
        report: &'a Reporter,
        opts: &'a SyncOptions,
        rewriter: &'a SnapshotRewriter,
    ) -> Self {
        Self {
            exec: Exec::new(fs, report),
            opts,
            rewriter,
        }
    }

    fn report(&self) -> &'a Reporter {
        self.exec.report
    }

    /// Mirror `target_root` to match `source_root`.
    ///
    /// Both roots must resolve; they are then treated as plain directories
    /// regardless of classification — snapshot-volume roots present as
    /// reparse points but must be walked.
    pub fn sync_tree(&self, source_root: &str, target_root: &str) {
        let display_root = self.rewriter.to_display(source_root);
        let Some(src_attrs) = self.exec.attempt("inspect source root", &display_root, |fs| {
            fs.get_attributes(source_root)
        }) else {
            self.report()
                .error(&format!("Mirror task aborted; source root unusable: {display_root}"));
            return;
        };
        let Some(tgt_attrs) = self.exec.attempt("inspect target root", target_root, |fs| {
            fs.get_attributes(target_root)
        }) else {
            self.report()
                .error(&format!("Mirror task aborted; target root unusable: {target_root}"));
            return;
        };
        let src = Item {
            full_path: source_root.to_string(),
            name: path_util::leaf(source_root).to_string(),
            attrs: src_attrs,
            kind: ItemKind::Dir,
        };
        let tgt = Item {
            full_path: target_root.to_string(),
            name: path_util::leaf(target_root).to_string(),
            attrs: tgt_attrs,
            kind: ItemKind::Dir,
        };
        self.sync_dir(&src, &tgt, true);
    }

    /// Reconcile one directory pair, containing any unexpected failure so
    /// sibling subtrees still get synced.
    fn sync_dir(&self, src: &Item, tgt: &Item, top_level: bool) {
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.sync_dir_inner(src, tgt, top_level)
        }));
        let failure = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };
        let display = self.rewriter.to_display(&src.full_path);
        self.report()
            .error(&format!("Unexpected failure while syncing {display}: {failure}"));
        self.report()
            .critical(&format!("Subtree abandoned after unexpected failure: {display}"));
    }

    fn sync_dir_inner(
        &self,
        src: &Item,
        tgt: &Item,
        top_level: bool,
    ) -> crate::error::Result<()> {
        let Some(mut src_items) = self.list_children(src) else {
            return Ok(());
        };
        let Some(mut tgt_items) = self.list_children(tgt) else {
            return Ok(());
        };

        // The guard file is never compared, copied, or deleted.
        src_items.retain(|i| !names_equal(&i.name, GUARD_FILE_NAME));
        tgt_items.retain(|i| !names_equal(&i.name, GUARD_FILE_NAME));

        src_items.retain(|i| {
            let display = self.rewriter.to_display(&i.full_path);
            if self
                .opts
                .ignore_paths
                .iter()
                .any(|p| path_util::paths_equal(p, &display))
            {
                self.report().debug(&format!("Ignoring path: {display}"));
                return false;
            }
            if i.kind.is_dir()
                && self
                    .opts
                    .ignore_dir_names
                    .iter()
                    .any(|n| names_equal(n, &i.name))
            {
                self.report()
                    .debug(&format!("Ignoring directory name: {display}"));
                return false;
            }
            true
        });

        sort_items(&mut src_items);
        sort_items(&mut tgt_items);

        // The directory's own descriptor goes first: inheritable ACEs
        // cascade into existing children, and the children synced below
        // must end up with their own descriptors on top.
        if self.opts.refresh_access_control {
            self.copy_security(&src.full_path, &tgt.full_path, true);
        }

        let src_by_name: BTreeMap<String, &Item> = src_items
            .iter()
            .map(|i| (fold_name(&i.name), i))
            .collect();

        // Phase 1: removals and kind-changes.
        let mut live: BTreeMap<String, Item> = BTreeMap::new();
        for t in tgt_items {
            match src_by_name.get(&fold_name(&t.name)) {
                None => {
                    self.report().change(
                        Some(&t.full_path),
                        &format!("Found deleted {}: {}", t.kind.label(), t.full_path),
                    );
                    self.act_delete(&t);
                }
                Some(s) if !s.kind.same_kind(&t.kind) => {
                    self.report().change(
                        Some(&t.full_path),
                        &format!(
                            "Found kind change from {} to {}: {}",
                            t.kind.label(),
                            s.kind.label(),
                            t.full_path
                        ),
                    );
                    self.act_delete(&t);
                }
                Some(_) => {
                    live.insert(fold_name(&t.name), t);
                }
            }
        }

        // Phase 2: same-name same-kind reconciliation.
        for s in &src_items {
            if let Some(t) = live.get(&fold_name(&s.name)) {
                self.sync_existing(s, t);
            }
        }

        // Phase 3: additions.
        for s in &src_items {
            if live.contains_key(&fold_name(&s.name)) {
                continue;
            }
            let tgt_path = path_util::join(&tgt.full_path, &s.name);
            self.report().change(
                Some(&tgt_path),
                &format!(
                    "Found new {}: {}",
                    s.kind.label(),
                    self.rewriter.to_display(&s.full_path)
                ),
            );
            if self.create_at_target(s, &tgt_path) {
                if let Some(created) = self.exec.attempt("inspect created entry", &tgt_path, |fs| {
                    classify_path(fs, &tgt_path)
                }) {
                    live.insert(fold_name(&s.name), created);
                }
            }
        }

        // Phase 4: attribute and security refresh of surviving children.
        // Plain directories are covered by their own sync_dir call.
        for s in &src_items {
            if s.kind.is_dir() {
                continue;
            }
            if let Some(t) = live.get(&fold_name(&s.name)) {
                if self.opts.refresh_access_control {
                    self.copy_security(&s.full_path, &t.full_path, s.attrs.is_directory());
                }
                if self.opts.update_metadata {
                    self.exec.attempt("set attributes on", &t.full_path, |fs| {
                        fs.set_attributes(&t.full_path, &s.attrs)
                    });
                }
            }
        }

        // Attributes of this directory last; a reparse-point root's attrs
        // cannot be meaningfully applied, so the top level is skipped.
        if !top_level && self.opts.update_metadata {
            self.exec.attempt("set attributes on", &tgt.full_path, |fs| {
                fs.set_attributes(&tgt.full_path, &src.attrs)
            });
        }
        Ok(())
    }

    /// List and classify the children of a directory. `None` means the
    /// listing failed (reported) and the subtree is skipped; individual
    /// children that fail classification are reported and dropped.
    fn list_children(&self, dir: &Item) -> Option<Vec<Item>> {
        let display = self.rewriter.to_display(&dir.full_path);
        let entries = self
            .exec
            .attempt("list directory", &display, |fs| fs.list_dir(&dir.full_path))?;
        let mut items = Vec::with_capacity(entries.len());
        for entry in &entries {
            let child_display = path_util::join(&display, &entry.name);
            if let Some(item) = self.exec.attempt("classify", &child_display, |fs| {
                classify_entry(fs, &dir.full_path, entry)
            }) {
                items.push(item);
            }
        }
        Some(items)
    }

    fn sync_existing(&self, s: &Item, t: &Item) {
        let display = self.rewriter.to_display(&s.full_path);
        match (&s.kind, &t.kind) {
            (ItemKind::Dir, ItemKind::Dir) => self.sync_dir(s, t, false),
            (ItemKind::File { length: src_len }, ItemKind::File { length: tgt_len }) => {
                // The freshness test is size + write time; an equal-size
                // equal-mtime content change is not detected.
                if src_len != tgt_len || s.attrs.write != t.attrs.write {
                    self.report().change(
                        Some(&t.full_path),
                        &format!(
                            "Found modified file: {display} (size {tgt_len} -> {src_len}, modified {} -> {})",
                            fmt_time(t.attrs.write),
                            fmt_time(s.attrs.write)
                        ),
                    );
                    self.act_copy_or_replace_file(&s.full_path, &t.full_path);
                }
            }
            (ItemKind::FileSymlink(want), ItemKind::FileSymlink(have))
            | (ItemKind::DirSymlink(want), ItemKind::DirSymlink(have)) => {
                if want != have {
                    self.report().change(
                        Some(&t.full_path),
                        &format!(
                            "Found modified {}: {display} (target {} -> {})",
                            s.kind.label(),
                            have.substitute_name,
                            want.substitute_name
                        ),
                    );
                    self.recreate_link(s, &t.full_path);
                }
            }
            (ItemKind::Junction(want), ItemKind::Junction(have)) => {
                if want.substitute_name != have.substitute_name
                    || want.print_name != have.print_name
                {
                    self.report().change(
                        Some(&t.full_path),
                        &format!(
                            "Found modified junction: {display} (target {} -> {})",
                            have.substitute_name, want.substitute_name
                        ),
                    );
                    self.recreate_link(s, &t.full_path);
                }
            }
            _ => {
                // Phase 1 deleted every kind-changed entry before Phase 2.
                self.report().critical(&format!(
                    "Same-kind reconciliation reached with differing kinds: {}",
                    t.full_path
                ));
            }
        }
    }

    /// Delete-then-create for a link whose target fields differ.
    fn recreate_link(&self, s: &Item, tgt_path: &str) {
        if self
            .exec
            .act("Delete", tgt_path, "delete", |fs| fs.delete(tgt_path))
            .is_none()
        {
            return;
        }
        self.create_at_target(s, tgt_path);
    }

    /// Create the target-side counterpart of a source item. For plain
    /// directories this also recurses into the new pair.
    fn create_at_target(&self, s: &Item, tgt_path: &str) -> bool {
        match &s.kind {
            ItemKind::Dir => {
                if self
                    .exec
                    .act("Create directory", tgt_path, "create directory", |fs| {
                        fs.create_directory(tgt_path)
                    })
                    .is_none()
                {
                    return false;
                }
                if let Some(created) = self
                    .exec
                    .attempt("inspect created directory", tgt_path, |fs| {
                        classify_path(fs, tgt_path)
                    })
                {
                    self.sync_dir(s, &created, false);
                }
                true
            }
            ItemKind::File { .. } => self.act_copy_or_replace_file(&s.full_path, tgt_path),
            ItemKind::FileSymlink(link) => self
                .exec
                .act("Create file symlink", tgt_path, "create file symlink", |fs| {
                    fs.create_empty_file(tgt_path)?;
                    fs.set_symlink_data(
                        tgt_path,
                        &link.substitute_name,
                        &link.print_name,
                        link.relative,
                    )
                })
                .is_some(),
            ItemKind::DirSymlink(link) => self
                .exec
                .act(
                    "Create directory symlink",
                    tgt_path,
                    "create directory symlink",
                    |fs| {
                        fs.create_directory(tgt_path)?;
                        fs.set_symlink_data(
                            tgt_path,
                            &link.substitute_name,
                            &link.print_name,
                            link.relative,
                        )
                    },
                )
                .is_some(),
            ItemKind::Junction(link) => self
                .exec
                .act("Create junction", tgt_path, "create junction", |fs| {
                    fs.create_directory(tgt_path)?;
                    fs.set_junction_data(tgt_path, &link.substitute_name, &link.print_name)
                })
                .is_some(),
        }
    }

    /// Recursive, reparse-safe delete. Junctions and symlinks are removed
    /// as single entries; only plain directories are descended into.
    fn act_delete(&self, item: &Item) -> bool {
        self.act_delete_path(&item.full_path, item.kind.is_dir())
    }

    fn act_delete_path(&self, path: &str, is_plain_dir: bool) -> bool {
        if !is_plain_dir {
            return self
                .exec
                .act("Delete", path, "delete", |fs| fs.delete(path))
                .is_some();
        }
        let Some(mut entries) = self
            .exec
            .attempt("list directory", path, |fs| fs.list_dir(path))
        else {
            return false;
        };
        entries.sort_by_cached_key(|e| {
            (
                e.attrs.is_directory() && !e.attrs.is_reparse_point(),
                fold_name(&e.name),
            )
        });
        for entry in &entries {
            let child = path_util::join(path, &entry.name);
            let plain_dir = entry.attrs.is_directory() && !entry.attrs.is_reparse_point();
            self.act_delete_path(&child, plain_dir);
        }
        self.exec
            .act("Delete directory", path, "delete", |fs| fs.delete(path))
            .is_some()
    }

    /// Crash-safe file replacement: copy into a fresh temp name beside the
    /// destination, then swap with an overwrite rename. The destination is
    /// only ever observable with the complete old bytes or the complete
    /// new bytes. A failed copy or rename leaves the temp file behind;
    /// cleanup is deliberately not attempted.
    fn act_copy_or_replace_file(&self, src_path: &str, tgt_final: &str) -> bool {
        let Some(parent) = path_util::parent(tgt_final) else {
            self.report()
                .critical(&format!("Replace target has no parent directory: {tgt_final}"));
            return false;
        };
        let tmp = path_util::join(&parent, &temp_copy_name());
        let src_display = self.rewriter.to_display(src_path);
        self.report()
            .action(&format!("Copy file: {tgt_final} from {src_display}"));

        let report = self.report();
        let mut throttle = ProgressThrottle::new(PROGRESS_INTERVAL);
        let copied = self.exec.attempt("copy content of", &src_display, |fs| {
            fs.copy_file_content(src_path, &tmp, &mut |p| {
                if p.copied == p.total || throttle.ready() {
                    report.debug(&format!(
                        "Copying {tgt_final}: {} / {} bytes",
                        p.copied, p.total
                    ));
                }
            })
        });
        if copied.is_none() {
            return false;
        }
        self.exec
            .attempt("replace", tgt_final, |fs| fs.rename(&tmp, tgt_final, true))
            .is_some()
    }

    fn copy_security(&self, src_path: &str, tgt_path: &str, is_dir: bool) {
        let display = self.rewriter.to_display(src_path);
        let Some(descriptor) = self
            .exec
            .attempt("read security descriptor of", &display, |fs| {
                fs.get_security_descriptor(src_path, is_dir)
            })
        else {
            return;
        };
        self.exec
            .attempt("write security descriptor on", tgt_path, |fs| {
                fs.set_security_descriptor(tgt_path, is_dir, &descriptor)
            });
    }
}

/// Monotone sampler for copy-progress reporting: the first event passes,
/// later events pass when the interval has elapsed.
struct ProgressThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl ProgressThrottle {
    fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    fn ready(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(prev) if now.duration_since(prev) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}
