//! Path utilities
//!
//! All paths in the engine are plain `String`s carrying Windows path
//! semantics: `\` and `/` are both separators, comparison is
//! case-insensitive, and the `\\?\` verbatim prefix bypasses Win32 path
//! processing (long paths allowed, trailing dots/spaces preserved). The
//! helpers here own every decomposition the engine performs, so the engine
//! behaves identically on any host — `std::path::Path` separator rules are
//! host-specific and unsuitable for that.

/// The separator used when composing paths.
pub const SEP: char = '\\';

/// Verbatim ("raw") path prefix understood by the Win32 layer.
pub const VERBATIM_PREFIX: &str = r"\\?\";

/// Device root prefix under which shadow-copy snapshots are exposed.
pub const SHADOW_COPY_DEVICE_PREFIX: &str = r"\\?\GLOBALROOT\Device\HarddiskVolumeShadowCopy";

/// True for either accepted path separator.
#[must_use]
pub fn is_sep(c: char) -> bool {
    c == '\\' || c == '/'
}

/// Ensure `p` ends with exactly one separator.
#[must_use]
pub fn with_trailing_sep(p: &str) -> String {
    let trimmed = p.trim_end_matches(is_sep);
    let mut out = String::with_capacity(trimmed.len() + 1);
    out.push_str(trimmed);
    out.push(SEP);
    out
}

/// Prefix the verbatim marker so OS path processing is bypassed.
///
/// Paths already starting with `\\?\` pass through unchanged. UNC paths
/// (`\\server\share`) become `\\?\UNC\server\share`.
#[must_use]
pub fn long_form(p: &str) -> String {
    if p.starts_with(VERBATIM_PREFIX) {
        p.to_string()
    } else if let Some(unc) = p.strip_prefix(r"\\") {
        format!(r"\\?\UNC\{unc}")
    } else {
        format!(r"{VERBATIM_PREFIX}{p}")
    }
}

fn fold(p: &str) -> String {
    p.trim_end_matches(is_sep)
        .chars()
        .map(|c| if c == '/' { '\\' } else { c })
        .flat_map(char::to_lowercase)
        .collect()
}

/// Case-insensitive, separator-normalized, trailing-separator-insensitive
/// path equality.
///
/// No canonicalization is attempted: a drive-letter path and a volume-GUID
/// path naming the same object compare unequal. Used only for the
/// ignore-path filter.
#[must_use]
pub fn paths_equal(a: &str, b: &str) -> bool {
    fold(a) == fold(b)
}

/// Join a directory path and a leaf name.
#[must_use]
pub fn join(base: &str, leaf: &str) -> String {
    if base.ends_with(is_sep) {
        format!("{base}{leaf}")
    } else {
        format!("{base}{SEP}{leaf}")
    }
}

/// Parent directory of `p`, or `None` at a root.
///
/// Drive roots keep their separator (`C:\foo` → `C:\`); the parent of a
/// root (`C:\`, `\\?\C:\`) is `None`.
#[must_use]
pub fn parent(p: &str) -> Option<String> {
    let trimmed = p.trim_end_matches(is_sep);
    // A verbatim or UNC prefix is part of the root, not a component.
    let start = if trimmed.starts_with(VERBATIM_PREFIX) { VERBATIM_PREFIX.len() } else { 0 };
    let cut = trimmed[start..].rfind(is_sep)?;
    let head = &trimmed[..start + cut];
    if head.len() <= start {
        return None;
    }
    if head.ends_with(':') {
        Some(format!("{head}{SEP}"))
    } else {
        Some(head.to_string())
    }
}

/// Leaf name of `p` (the part after the last separator).
#[must_use]
pub fn leaf(p: &str) -> &str {
    let trimmed = p.trim_end_matches(is_sep);
    match trimmed.rfind(is_sep) {
        Some(cut) => &trimmed[cut + 1..],
        None => trimmed,
    }
}

/// Append the missing separator to a bare shadow-copy device root.
///
/// Listing `\\?\GLOBALROOT\Device\HarddiskVolumeShadowCopyN` without a
/// trailing separator fails (known OS listing quirk); any other path passes
/// through unchanged.
#[must_use]
pub fn fixup_device_root(p: &str) -> String {
    let lower = p.to_lowercase();
    let prefix = SHADOW_COPY_DEVICE_PREFIX.to_lowercase();
    if let Some(rest) = lower.strip_prefix(&prefix) {
        if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()) {
            return with_trailing_sep(p);
        }
    }
    p.to_string()
}

/// Maps snapshot-space paths back to original-volume paths for display and
/// ignore-path matching.
#[derive(Debug, Clone)]
pub struct SnapshotRewriter {
    snapshot_root: String,
    original_root: String,
}

impl SnapshotRewriter {
    /// A rewriter translating paths under `snapshot_root` to the
    /// corresponding paths under `original_root`.
    #[must_use]
    pub fn new(snapshot_root: impl Into<String>, original_root: impl Into<String>) -> Self {
        Self {
            snapshot_root: snapshot_root.into(),
            original_root: original_root.into(),
        }
    }

    /// Identity rewriter (source is not snapshotted).
    #[must_use]
    pub fn identity() -> Self {
        Self::new("", "")
    }

    /// Translate `path` for display: replace the snapshot-root prefix with
    /// the original root. Paths outside the snapshot root pass through.
    #[must_use]
    pub fn to_display(&self, path: &str) -> String {
        let root = fold(&self.snapshot_root);
        if root.is_empty() {
            return path.to_string();
        }
        let folded = fold(path);
        if folded == root {
            return self.original_root.clone();
        }
        if folded.starts_with(&root) && folded[root.len()..].starts_with('\\') {
            // fold() only rewrites separators 1:1, so byte offsets line up
            // for ASCII roots; re-slice the original string to keep case.
            let tail_start = self.snapshot_root.trim_end_matches(is_sep).len();
            let tail = path[tail_start..].trim_start_matches(is_sep);
            return join(self.original_root.trim_end_matches(is_sep), tail);
        }
        path.to_string()
    }
}
