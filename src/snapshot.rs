//! Volume-snapshot seam
//!
//! The engine reads the source side through a read-only point-in-time
//! snapshot so open and locked files come out consistent. Producing that
//! snapshot (VSS on Windows) is an external collaborator; the engine only
//! needs the mapping from a source root to its snapshot-space counterpart,
//! expressed by the [`Snapshotter`] trait.

use crate::error::Result;

/// Maps source roots into snapshot space. Implementations own the snapshot
/// lifetime: it must stay readable until [`Snapshotter::dispose`].
pub trait Snapshotter {
    /// Return the snapshot-space path for `source_root`.
    ///
    /// # Errors
    ///
    /// Fails if a snapshot cannot be created for the root's volume.
    fn snapshot(&mut self, source_root: &str) -> Result<String>;

    /// Release all snapshots. Called once at end of run.
    fn dispose(&mut self) {}
}

/// Reads the live volume directly instead of a snapshot. Used when no
/// snapshot provider is wired up (and throughout the test suite, where the
/// in-memory filesystem is itself immutable-under-test).
#[derive(Debug, Default)]
pub struct PassthroughSnapshotter;

impl Snapshotter for PassthroughSnapshotter {
    fn snapshot(&mut self, source_root: &str) -> Result<String> {
        Ok(source_root.to_string())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn passthrough_returns_the_input_root() {
        let mut snap = PassthroughSnapshotter;
        assert_eq!(snap.snapshot(r"D:\data").unwrap(), r"D:\data");
        snap.dispose();
    }
}
